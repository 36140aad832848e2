use serde::{Deserialize, Serialize};

pub mod cert;
pub mod enclave_identity;
pub mod quote;
pub mod sgx_x509;
pub mod tcb_info;

/// TCB status strings used by TCB Info levels and Enclave Identity V2 levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TcbStatus {
    UpToDate,
    #[serde(rename = "SWHardeningNeeded")]
    SwHardeningNeeded,
    #[serde(rename = "ConfigurationAndSWHardeningNeeded")]
    ConfigurationAndSwHardeningNeeded,
    ConfigurationNeeded,
    OutOfDate,
    OutOfDateConfigurationNeeded,
    Revoked,
}

impl TcbStatus {
    pub const ALL: [TcbStatus; 7] = [
        TcbStatus::UpToDate,
        TcbStatus::SwHardeningNeeded,
        TcbStatus::ConfigurationAndSwHardeningNeeded,
        TcbStatus::ConfigurationNeeded,
        TcbStatus::OutOfDate,
        TcbStatus::OutOfDateConfigurationNeeded,
        TcbStatus::Revoked,
    ];

    /// Statuses a version 1 TCB Info level may carry.
    pub const V1_TCB_INFO: [TcbStatus; 4] = [
        TcbStatus::UpToDate,
        TcbStatus::OutOfDate,
        TcbStatus::ConfigurationNeeded,
        TcbStatus::Revoked,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UpToDate" => Some(TcbStatus::UpToDate),
            "SWHardeningNeeded" => Some(TcbStatus::SwHardeningNeeded),
            "ConfigurationAndSWHardeningNeeded" => Some(TcbStatus::ConfigurationAndSwHardeningNeeded),
            "ConfigurationNeeded" => Some(TcbStatus::ConfigurationNeeded),
            "OutOfDate" => Some(TcbStatus::OutOfDate),
            "OutOfDateConfigurationNeeded" => Some(TcbStatus::OutOfDateConfigurationNeeded),
            "Revoked" => Some(TcbStatus::Revoked),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TcbStatus::UpToDate => "UpToDate",
            TcbStatus::SwHardeningNeeded => "SWHardeningNeeded",
            TcbStatus::ConfigurationAndSwHardeningNeeded => "ConfigurationAndSWHardeningNeeded",
            TcbStatus::ConfigurationNeeded => "ConfigurationNeeded",
            TcbStatus::OutOfDate => "OutOfDate",
            TcbStatus::OutOfDateConfigurationNeeded => "OutOfDateConfigurationNeeded",
            TcbStatus::Revoked => "Revoked",
        }
    }
}
