use crate::status::Status;
use crate::types::enclave_identity::EnclaveIdentity;
use crate::types::quote::EnclaveReport;
use crate::types::TcbStatus;

/// Checks an enclave report against a signed enclave identity.
pub trait ReportVerifier {
    fn verify(&self, identity: &EnclaveIdentity, report: &EnclaveReport) -> Status;
}

/// Compares the report's miscselect, attributes, mrsigner and isvprodid with the
/// identity, then resolves the report's isvsvn against the identity's TCB levels.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnclaveReportVerifier;

impl ReportVerifier for EnclaveReportVerifier {
    fn verify(&self, identity: &EnclaveIdentity, report: &EnclaveReport) -> Status {
        if (identity.miscselect() ^ report.misc_select.get()) & identity.miscselect_mask() != 0 {
            return Status::SgxEnclaveReportMiscselectMismatch;
        }

        let attributes_match = identity
            .attributes()
            .iter()
            .zip(identity.attributes_mask())
            .zip(report.attributes.iter())
            .all(|((expected, mask), actual)| (expected ^ actual) & mask == 0);
        if !attributes_match {
            return Status::SgxEnclaveReportAttributesMismatch;
        }

        if identity.mrsigner() != &report.mr_signer {
            return Status::SgxEnclaveReportMrsignerMismatch;
        }

        if identity.isvprodid() != u32::from(report.isv_prod_id.get()) {
            return Status::SgxEnclaveReportIsvprodidMismatch;
        }

        match identity.get_tcb_status(u32::from(report.isv_svn.get())) {
            TcbStatus::UpToDate => Status::Ok,
            TcbStatus::OutOfDate => Status::SgxEnclaveReportIsvsvnOutOfDate,
            TcbStatus::Revoked => Status::SgxEnclaveReportIsvsvnRevoked,
            _ => Status::SgxEnclaveReportUnsupportedFormat,
        }
    }
}
