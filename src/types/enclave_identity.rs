use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TcbStatus;
use crate::constants::{ATTRIBUTES_LEN, MISCSELECT_LEN, MRSIGNER_LEN};
use crate::status::Status;
use crate::utils::json::{
    canonical_body, date_field, hex_field, int_field, object_field, string_field, uint_field,
    FieldResult, Object,
};

pub const ENCLAVE_IDENTITY_V1: i64 = 1;
pub const ENCLAVE_IDENTITY_V2: i64 = 2;

/// Identifier of the SGX Enclave issued by Intel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnclaveId {
    #[serde(rename = "QE")]
    Qe,
    #[serde(rename = "QVE")]
    Qve,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("unsupported enclave identity format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid enclave identity: {0}")]
    Invalid(String),
    #[error("unsupported enclave identity version {0}")]
    UnsupportedVersion(i64),
}

impl IdentityError {
    pub fn status(&self) -> Status {
        match self {
            IdentityError::UnsupportedFormat(_) => Status::SgxEnclaveIdentityUnsupportedFormat,
            IdentityError::Invalid(_) => Status::SgxEnclaveIdentityInvalid,
            IdentityError::UnsupportedVersion(_) => Status::SgxEnclaveIdentityUnsupportedVersion,
        }
    }
}

fn required<T>(result: FieldResult<T>, name: &str) -> Result<T, IdentityError> {
    result.map_err(|_| IdentityError::Invalid(format!("missing or malformed [{}]", name)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclaveIdentityTcbLevel {
    pub isvsvn: u32,
    pub tcb_date: DateTime<Utc>,
    pub tcb_status: TcbStatus,
}

/// Version specific part of an identity: how an isvsvn maps to a TCB status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnclaveIdentityTcb {
    /// A single threshold, anything below it is out of date.
    V1 { isvsvn: u32 },
    /// Levels in document order, the first one at or below the isvsvn decides.
    V2 {
        id: EnclaveId,
        tcb_evaluation_data_number: u32,
        tcb_levels: Vec<EnclaveIdentityTcbLevel>,
    },
}

/// Signed baseline for a QE or QvE enclave report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclaveIdentity {
    version: u32,
    issue_date: DateTime<Utc>,
    next_update: DateTime<Utc>,
    miscselect: u32,
    miscselect_mask: u32,
    attributes: [u8; ATTRIBUTES_LEN],
    attributes_mask: [u8; ATTRIBUTES_LEN],
    mrsigner: [u8; MRSIGNER_LEN],
    isvprodid: u32,
    tcb: EnclaveIdentityTcb,
    body: Vec<u8>,
    signature: [u8; 64],
}

impl EnclaveIdentity {
    /// Parses `{"enclaveIdentity": {..}, "signature": ".."}`. The older
    /// `qeIdentity` wrapper key is accepted as well.
    pub fn parse(json: &str) -> Result<Self, IdentityError> {
        let document: Value = serde_json::from_str(json)
            .map_err(|e| IdentityError::UnsupportedFormat(format!("not json: {}", e)))?;
        let document = document
            .as_object()
            .ok_or_else(|| IdentityError::UnsupportedFormat("document should be an object".into()))?;

        let body_value = document
            .get("enclaveIdentity")
            .or_else(|| document.get("qeIdentity"))
            .ok_or_else(|| IdentityError::UnsupportedFormat("missing [enclaveIdentity]".into()))?;
        let body = body_value
            .as_object()
            .ok_or_else(|| IdentityError::UnsupportedFormat("identity body should be an object".into()))?;

        let version = int_field(body, "version")
            .map_err(|_| IdentityError::Invalid("missing or malformed [version]".into()))?;
        let version = i64::from(version);
        if version != ENCLAVE_IDENTITY_V1 && version != ENCLAVE_IDENTITY_V2 {
            return Err(IdentityError::UnsupportedVersion(version));
        }

        let issue_date = required(date_field(body, "issueDate"), "issueDate")?;
        let next_update = required(date_field(body, "nextUpdate"), "nextUpdate")?;
        let miscselect = required(hex_field::<MISCSELECT_LEN>(body, "miscselect"), "miscselect")?;
        let miscselect_mask =
            required(hex_field::<MISCSELECT_LEN>(body, "miscselectMask"), "miscselectMask")?;
        let attributes = required(hex_field::<ATTRIBUTES_LEN>(body, "attributes"), "attributes")?;
        let attributes_mask =
            required(hex_field::<ATTRIBUTES_LEN>(body, "attributesMask"), "attributesMask")?;
        let mrsigner = required(hex_field::<MRSIGNER_LEN>(body, "mrsigner"), "mrsigner")?;
        let isvprodid = required(uint_field(body, "isvprodid"), "isvprodid")?;

        let tcb = if version == ENCLAVE_IDENTITY_V1 {
            EnclaveIdentityTcb::V1 {
                isvsvn: required(uint_field(body, "isvsvn"), "isvsvn")?,
            }
        } else {
            Self::parse_v2(body)?
        };

        let signature = hex_field::<64>(document, "signature")
            .map_err(|_| IdentityError::Invalid("missing or malformed [signature]".into()))?;

        Ok(EnclaveIdentity {
            version: version as u32,
            issue_date,
            next_update,
            // masks and values are written most significant byte first
            miscselect: u32::from_be_bytes(miscselect),
            miscselect_mask: u32::from_be_bytes(miscselect_mask),
            attributes,
            attributes_mask,
            mrsigner,
            isvprodid,
            tcb,
            body: canonical_body(body_value),
            signature,
        })
    }

    fn parse_v2(body: &Object) -> Result<EnclaveIdentityTcb, IdentityError> {
        let id = match required(string_field(body, "id"), "id")? {
            "QE" => EnclaveId::Qe,
            "QVE" => EnclaveId::Qve,
            other => return Err(IdentityError::Invalid(format!("unknown id [{}]", other))),
        };
        let tcb_evaluation_data_number =
            required(uint_field(body, "tcbEvaluationDataNumber"), "tcbEvaluationDataNumber")?;

        let levels = body
            .get("tcbLevels")
            .and_then(Value::as_array)
            .filter(|levels| !levels.is_empty())
            .ok_or_else(|| IdentityError::Invalid("[tcbLevels] should be a non empty array".into()))?;

        let tcb_levels = levels
            .iter()
            .map(|level| {
                let level = level
                    .as_object()
                    .ok_or_else(|| IdentityError::Invalid("tcb level should be an object".into()))?;
                let tcb_date = required(date_field(level, "tcbDate"), "tcbDate")?;
                let status = required(string_field(level, "tcbStatus"), "tcbStatus")?;
                let tcb = required(object_field(level, "tcb"), "tcb")?;
                let isvsvn = required(uint_field(tcb, "isvsvn"), "isvsvn")?;
                let tcb_status = TcbStatus::parse(status)
                    .ok_or_else(|| IdentityError::Invalid(format!("unknown tcbStatus [{}]", status)))?;
                Ok(EnclaveIdentityTcbLevel { isvsvn, tcb_date, tcb_status })
            })
            .collect::<Result<Vec<_>, IdentityError>>()?;

        Ok(EnclaveIdentityTcb::V2 { id, tcb_evaluation_data_number, tcb_levels })
    }

    /// TCB status of an enclave running at `isvsvn`.
    pub fn get_tcb_status(&self, isvsvn: u32) -> TcbStatus {
        match &self.tcb {
            EnclaveIdentityTcb::V1 { isvsvn: threshold } => {
                if *threshold <= isvsvn {
                    TcbStatus::UpToDate
                } else {
                    TcbStatus::OutOfDate
                }
            }
            EnclaveIdentityTcb::V2 { tcb_levels, .. } => tcb_levels
                .iter()
                .find(|level| level.isvsvn <= isvsvn)
                .map(|level| level.tcb_status)
                .unwrap_or(TcbStatus::Revoked),
        }
    }

    /// Whether `expiration` falls in `(issueDate, nextUpdate]`.
    pub fn check_date_correctness(&self, expiration: DateTime<Utc>) -> bool {
        expiration <= self.next_update && expiration > self.issue_date
    }

    pub fn id(&self) -> EnclaveId {
        match &self.tcb {
            EnclaveIdentityTcb::V1 { .. } => EnclaveId::Qe,
            EnclaveIdentityTcb::V2 { id, .. } => *id,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn issue_date(&self) -> DateTime<Utc> {
        self.issue_date
    }

    pub fn next_update(&self) -> DateTime<Utc> {
        self.next_update
    }

    pub fn miscselect(&self) -> u32 {
        self.miscselect
    }

    pub fn miscselect_mask(&self) -> u32 {
        self.miscselect_mask
    }

    pub fn attributes(&self) -> &[u8; ATTRIBUTES_LEN] {
        &self.attributes
    }

    pub fn attributes_mask(&self) -> &[u8; ATTRIBUTES_LEN] {
        &self.attributes_mask
    }

    pub fn mrsigner(&self) -> &[u8; MRSIGNER_LEN] {
        &self.mrsigner
    }

    pub fn isvprodid(&self) -> u32 {
        self.isvprodid
    }

    pub fn tcb(&self) -> &EnclaveIdentityTcb {
        &self.tcb
    }

    /// Compact serialisation of the identity object, the bytes the signature covers.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn signature(&self) -> &[u8; 64] {
        &self.signature
    }
}
