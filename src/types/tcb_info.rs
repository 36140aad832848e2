use chrono::{DateTime, Utc};
use serde_json::Value;

use super::TcbStatus;
use crate::constants::{FMSPC_LEN, PCEID_LEN};
use crate::status::Status;
use crate::utils::json::{
    self, canonical_body, date_field, hex_field, int_field, string_array_field,
    uint_field, FieldError, FieldResult, Object,
};

pub const TCB_INFO_V1: u32 = 1;
pub const TCB_INFO_V2: u32 = 2;

const TCB_COMPONENT_NAMES: [&str; 16] = [
    "sgxtcbcomp01svn",
    "sgxtcbcomp02svn",
    "sgxtcbcomp03svn",
    "sgxtcbcomp04svn",
    "sgxtcbcomp05svn",
    "sgxtcbcomp06svn",
    "sgxtcbcomp07svn",
    "sgxtcbcomp08svn",
    "sgxtcbcomp09svn",
    "sgxtcbcomp10svn",
    "sgxtcbcomp11svn",
    "sgxtcbcomp12svn",
    "sgxtcbcomp13svn",
    "sgxtcbcomp14svn",
    "sgxtcbcomp15svn",
    "sgxtcbcomp16svn",
];

/// Why a TCB Info document was rejected.
///
/// `Format` covers documents that do not follow the schema at all (absent fields,
/// wrong JSON shapes), `Invalid` covers fields that are present but carry an
/// unusable value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollateralError {
    #[error("malformed tcb info: {0}")]
    Format(String),
    #[error("invalid tcb info: {0}")]
    Invalid(String),
}

impl CollateralError {
    pub fn status(&self) -> Status {
        match self {
            CollateralError::Format(_) => Status::SgxTcbInfoUnsupportedFormat,
            CollateralError::Invalid(_) => Status::SgxTcbInfoInvalid,
        }
    }
}

fn required<T>(result: FieldResult<T>, name: &str) -> Result<T, CollateralError> {
    result.map_err(|e| match e {
        FieldError::Missing => CollateralError::Format(format!("missing [{}]", name)),
        FieldError::Invalid => CollateralError::Invalid(format!("could not parse [{}]", name)),
    })
}

/// One entry of the TCB Info level table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcbLevel {
    /// sgxtcbcomp01svn ..= sgxtcbcomp16svn
    pub cpu_svn: [u32; 16],
    pub pce_svn: u32,
    /// Kept as the document spells it, the verdict mapping depends on the TCB Info version.
    pub status: String,
    /// V2 only.
    pub tcb_date: Option<DateTime<Utc>>,
    pub advisory_ids: Vec<String>,
}

impl TcbLevel {
    fn parse(value: &Value, version: u32) -> Result<Self, CollateralError> {
        let level = value
            .as_object()
            .ok_or_else(|| CollateralError::Format("tcb level should be an object".into()))?;

        let (status, tcb_date, advisory_ids) = if version == TCB_INFO_V1 {
            if level.len() != 2 {
                return Err(CollateralError::Format("tcb level should have 2 members".into()));
            }
            (Self::parse_status(level, "status", &TcbStatus::V1_TCB_INFO)?, None, Vec::new())
        } else {
            let tcb_date = required(date_field(level, "tcbDate"), "tcbDate")?;
            let advisory_ids = match string_array_field(level, "advisoryIDs") {
                Ok(ids) => ids,
                Err(FieldError::Missing) => Vec::new(),
                Err(FieldError::Invalid) => {
                    return Err(CollateralError::Invalid("could not parse [advisoryIDs]".into()))
                }
            };
            let status = Self::parse_status(level, "tcbStatus", &TcbStatus::ALL)?;
            (status, Some(tcb_date), advisory_ids)
        };

        let tcb = level
            .get("tcb")
            .ok_or_else(|| CollateralError::Format("missing [tcb]".into()))?
            .as_object()
            .ok_or_else(|| CollateralError::Format("[tcb] should be an object".into()))?;

        let mut cpu_svn = [0u32; 16];
        for (component, name) in cpu_svn.iter_mut().zip(TCB_COMPONENT_NAMES) {
            *component = required(uint_field(tcb, name), name)?;
        }
        let pce_svn = uint_field(tcb, "pcesvn")
            .map_err(|_| CollateralError::Format("could not parse [pcesvn]".into()))?;

        Ok(TcbLevel { cpu_svn, pce_svn, status, tcb_date, advisory_ids })
    }

    fn parse_status(level: &Object, name: &str, allowed: &[TcbStatus]) -> Result<String, CollateralError> {
        let status = json::string_field(level, name)
            .map_err(|_| CollateralError::Format(format!("[{}] should be a string", name)))?;
        match TcbStatus::parse(status) {
            Some(parsed) if allowed.contains(&parsed) => Ok(status.to_string()),
            _ => Err(CollateralError::Invalid(format!("[{}] has invalid value [{}]", name, status))),
        }
    }

    /// Ordering key, compared descending.
    fn key(&self) -> ([u32; 16], u32) {
        (self.cpu_svn, self.pce_svn)
    }
}

/// Signed TCB Info collateral for one FMSPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcbInfo {
    version: u32,
    issue_date: DateTime<Utc>,
    next_update: DateTime<Utc>,
    fmspc: [u8; FMSPC_LEN],
    pce_id: [u8; PCEID_LEN],
    tcb_type: Option<i32>,
    tcb_evaluation_data_number: Option<u32>,
    /// Sorted by descending (cpu svn, pce svn), no two levels share a key.
    tcb_levels: Vec<TcbLevel>,
    body: Vec<u8>,
    signature: [u8; 64],
}

impl TcbInfo {
    /// Parses the `{"tcbInfo": {..}, "signature": ".."}` document.
    pub fn parse(json: &str) -> Result<Self, CollateralError> {
        let document: Value = serde_json::from_str(json)
            .map_err(|e| CollateralError::Format(format!("not json: {}", e)))?;
        let document = document
            .as_object()
            .ok_or_else(|| CollateralError::Format("document should be an object".into()))?;

        let body_value = document
            .get("tcbInfo")
            .ok_or_else(|| CollateralError::Format("missing [tcbInfo]".into()))?;
        let info = body_value
            .as_object()
            .ok_or_else(|| CollateralError::Format("[tcbInfo] should be an object".into()))?;

        if !document.contains_key("signature") {
            return Err(CollateralError::Invalid("missing [signature]".into()));
        }

        let version = required(uint_field(info, "version"), "version")?;
        if version != TCB_INFO_V1 && version != TCB_INFO_V2 {
            return Err(CollateralError::Invalid(format!("unsupported version {}", version)));
        }

        let issue_date = required(date_field(info, "issueDate"), "issueDate")?;
        let next_update = required(date_field(info, "nextUpdate"), "nextUpdate")?;
        let fmspc = required(hex_field::<FMSPC_LEN>(info, "fmspc"), "fmspc")?;
        let pce_id = required(hex_field::<PCEID_LEN>(info, "pceId"), "pceId")?;

        let signature = hex_field::<64>(document, "signature")
            .map_err(|_| CollateralError::Invalid("could not parse [signature]".into()))?;

        let levels = info
            .get("tcbLevels")
            .ok_or_else(|| CollateralError::Invalid("missing [tcbLevels]".into()))?;

        let (tcb_type, tcb_evaluation_data_number) = if version == TCB_INFO_V2 {
            (
                Some(required(int_field(info, "tcbType"), "tcbType")?),
                Some(required(uint_field(info, "tcbEvaluationDataNumber"), "tcbEvaluationDataNumber")?),
            )
        } else {
            (None, None)
        };

        let levels = levels
            .as_array()
            .ok_or_else(|| CollateralError::Invalid("[tcbLevels] should be an array".into()))?;

        let mut tcb_levels: Vec<TcbLevel> = Vec::with_capacity(levels.len());
        for level in levels {
            let level = TcbLevel::parse(level, version)?;
            let key = level.key();
            match tcb_levels.binary_search_by(|probe| key.cmp(&probe.key())) {
                Ok(_) => return Err(CollateralError::Invalid("duplicated tcb levels".into())),
                Err(position) => tcb_levels.insert(position, level),
            }
        }

        if tcb_levels.is_empty() {
            return Err(CollateralError::Invalid("[tcbLevels] should not be empty".into()));
        }

        Ok(TcbInfo {
            version,
            issue_date,
            next_update,
            fmspc,
            pce_id,
            tcb_type,
            tcb_evaluation_data_number,
            tcb_levels,
            body: canonical_body(body_value),
            signature,
        })
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

    pub fn fmspc(&self) -> &[u8; FMSPC_LEN] {
        &self.fmspc
    }

    pub fn pce_id(&self) -> &[u8; PCEID_LEN] {
        &self.pce_id
    }

    pub fn tcb_levels(&self) -> &[TcbLevel] {
        &self.tcb_levels
    }

    /// Not defined for version 1 documents.
    pub fn tcb_type(&self) -> Result<i32, CollateralError> {
        self.tcb_type
            .ok_or_else(|| CollateralError::Format("tcbType is not a field of tcb info v1".into()))
    }

    /// Not defined for version 1 documents.
    pub fn tcb_evaluation_data_number(&self) -> Result<u32, CollateralError> {
        self.tcb_evaluation_data_number.ok_or_else(|| {
            CollateralError::Format("tcbEvaluationDataNumber is not a field of tcb info v1".into())
        })
    }

    /// Compact serialisation of the `tcbInfo` object, the bytes the signature covers.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn signature(&self) -> &[u8; 64] {
        &self.signature
    }
}
