use crate::status::Status;
use crate::types::cert::PckCertificate;
use crate::types::sgx_x509::SgxExtensionTcbLevel;
use crate::types::tcb_info::{TcbInfo, TcbLevel, TCB_INFO_V1};
use crate::types::TcbStatus;

/// True when every one of the 16 component SVNs in the certificate is at least
/// the level's component. A single lower component disqualifies the level.
pub fn is_cpu_svn_higher_or_equal(pck_tcb: &SgxExtensionTcbLevel, level: &TcbLevel) -> bool {
    pck_tcb
        .sgxtcbcompsvn
        .iter()
        .zip(level.cpu_svn.iter())
        .all(|(cert, level)| cert >= level)
}

/// First level, in descending order, that the certificate's TCB reaches.
pub fn get_matching_tcb_level<'a>(tcb_info: &'a TcbInfo, pck_tcb: &SgxExtensionTcbLevel) -> Option<&'a TcbLevel> {
    tcb_info
        .tcb_levels()
        .iter()
        .find(|level| is_cpu_svn_higher_or_equal(pck_tcb, level) && pck_tcb.pcesvn >= level.pce_svn)
}

/// Maps the status string of the level matching `pck` to a quote verdict.
///
/// `Err` carries the hard failures, `TcbNotSupported` when no level matches and
/// `TcbUnrecognizedStatus` for a status string this version does not define.
/// They are final and never converged with the QE identity status.
pub fn check_tcb_level(tcb_info: &TcbInfo, pck: &PckCertificate) -> Result<Status, Status> {
    let Some(level) = get_matching_tcb_level(tcb_info, pck.tcb()) else {
        log::debug!("no tcb level matches the pck certificate tcb");
        return Err(Status::TcbNotSupported);
    };

    match TcbStatus::parse(&level.status) {
        Some(TcbStatus::UpToDate) => Ok(Status::Ok),
        Some(TcbStatus::OutOfDate) => Ok(Status::TcbOutOfDate),
        Some(TcbStatus::Revoked) => Ok(Status::TcbRevoked),
        Some(TcbStatus::ConfigurationNeeded) => Ok(Status::TcbConfigurationNeeded),
        Some(TcbStatus::ConfigurationAndSwHardeningNeeded) => Ok(Status::TcbConfigurationAndSwHardeningNeeded),
        Some(TcbStatus::SwHardeningNeeded) => Ok(Status::TcbSwHardeningNeeded),
        Some(TcbStatus::OutOfDateConfigurationNeeded) if tcb_info.version() > TCB_INFO_V1 => {
            Ok(Status::TcbOutOfDateConfigurationNeeded)
        }
        _ => {
            log::debug!("unrecognized tcb level status [{}]", level.status);
            Err(Status::TcbUnrecognizedStatus)
        }
    }
}

/// Folds the QE identity freshness into the TCB level verdict.
pub fn converge_tcb_status(tcb_status: Status, qe_identity_status: Status) -> Status {
    match qe_identity_status {
        Status::SgxEnclaveReportIsvsvnOutOfDate => match tcb_status {
            Status::Ok | Status::TcbSwHardeningNeeded => return Status::TcbOutOfDate,
            Status::TcbConfigurationNeeded | Status::TcbConfigurationAndSwHardeningNeeded => {
                return Status::TcbOutOfDateConfigurationNeeded
            }
            _ => {}
        },
        Status::SgxEnclaveReportIsvsvnRevoked => return Status::TcbRevoked,
        _ => {}
    }

    match tcb_status {
        Status::Ok
        | Status::TcbOutOfDate
        | Status::TcbRevoked
        | Status::TcbConfigurationNeeded
        | Status::TcbOutOfDateConfigurationNeeded
        | Status::TcbSwHardeningNeeded
        | Status::TcbConfigurationAndSwHardeningNeeded => tcb_status,
        _ => Status::TcbUnrecognizedStatus,
    }
}
