//! Field extraction for the signed JSON collateral documents.
//!
//! Every getter distinguishes a field that is absent from one that is present
//! but cannot be read as the requested type, so callers can report the two cases
//! with different statuses.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

pub type Object = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    Missing,
    Invalid,
}

pub type FieldResult<T> = Result<T, FieldError>;

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

fn field<'a>(object: &'a Object, name: &str) -> FieldResult<&'a Value> {
    object.get(name).ok_or(FieldError::Missing)
}

pub fn object_field<'a>(object: &'a Object, name: &str) -> FieldResult<&'a Object> {
    field(object, name)?.as_object().ok_or(FieldError::Invalid)
}

pub fn uint_field(object: &Object, name: &str) -> FieldResult<u32> {
    field(object, name)?
        .as_u64()
        .and_then(|value| u32::try_from(value).ok())
        .ok_or(FieldError::Invalid)
}

pub fn int_field(object: &Object, name: &str) -> FieldResult<i32> {
    field(object, name)?
        .as_i64()
        .and_then(|value| i32::try_from(value).ok())
        .ok_or(FieldError::Invalid)
}

pub fn string_field<'a>(object: &'a Object, name: &str) -> FieldResult<&'a str> {
    field(object, name)?.as_str().ok_or(FieldError::Invalid)
}

/// Reads a hex string that must decode to exactly `N` bytes.
pub fn hex_field<const N: usize>(object: &Object, name: &str) -> FieldResult<[u8; N]> {
    let value = string_field(object, name)?;
    decode_hex_exact(value).ok_or(FieldError::Invalid)
}

pub fn date_field(object: &Object, name: &str) -> FieldResult<DateTime<Utc>> {
    let value = string_field(object, name)?;
    parse_date(value).ok_or(FieldError::Invalid)
}

pub fn string_array_field(object: &Object, name: &str) -> FieldResult<Vec<String>> {
    field(object, name)?
        .as_array()
        .ok_or(FieldError::Invalid)?
        .iter()
        .map(|value| value.as_str().map(str::to_string).ok_or(FieldError::Invalid))
        .collect()
}

pub fn decode_hex_exact<const N: usize>(value: &str) -> Option<[u8; N]> {
    if value.len() != N * 2 {
        return None;
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(value, &mut out).ok()?;
    Some(out)
}

/// Layout of a collateral date, `D` standing for one ASCII digit.
const DATE_SHAPE: &[u8; 20] = b"DDDD-DD-DDTDD:DD:DDZ";

/// Parses `YYYY-MM-DDTHH:MM:SSZ`. Offsets, fractional seconds, short fields,
/// signs, blanks and leap seconds are rejected.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let bytes = value.as_bytes();
    if bytes.len() != DATE_SHAPE.len() {
        return None;
    }
    let shaped = bytes.iter().zip(DATE_SHAPE).all(|(byte, shape)| match shape {
        b'D' => byte.is_ascii_digit(),
        separator => byte == separator,
    });
    // chrono folds second 60 into a leap second
    if !shaped || &bytes[17..19] == b"60" {
        return None;
    }
    NaiveDateTime::parse_from_str(value, DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Compact re-serialisation of a signed body, keeping member order.
pub fn canonical_body(value: &Value) -> Vec<u8> {
    value.to_string().into_bytes()
}
