use crate::constants::SGX_PCK_CN_PHRASE;
use crate::status::Status;
use crate::types::cert::{PckCertificate, PckCrl};
use crate::types::enclave_identity::{EnclaveId, EnclaveIdentity};
use crate::types::quote::{QeCertData, Quote, QuoteAuthData};
use crate::types::tcb_info::TcbInfo;
use crate::utils::crypto::{p256_key_from_raw, verify_p256_signature_bytes};
use crate::utils::enclave_identity::ReportVerifier;
use crate::utils::hash::sha256sum_concat;
use crate::utils::tcbinfo::{check_tcb_level, converge_tcb_status};

/// Logs why a gate failed and returns its status.
macro_rules! fail {
    ($status:expr, $($arg:tt)+) => {{
        log::debug!($($arg)+);
        return $status;
    }};
}

/// Decides the verdict for an SGX quote against already parsed collateral.
///
/// Gates run in a fixed order and the first failing one decides the status:
/// PCK certificate and CRL consistency, TCB Info binding, QE report signature
/// and report data, the optional QE identity, the quote signature and finally
/// the TCB level, converged with the QE identity freshness.
pub fn verify_quote_dcap(
    quote: &Quote,
    pck: &PckCertificate,
    crl: &PckCrl,
    tcb_info: &TcbInfo,
    qe_identity: Option<&EnclaveIdentity>,
    report_verifier: &impl ReportVerifier,
) -> Status {
    let auth_data = quote.auth_data();

    let is_pck = pck
        .subject_common_name()
        .map(|cn| cn.contains(SGX_PCK_CN_PHRASE))
        .unwrap_or(false);
    if !is_pck {
        fail!(Status::InvalidPckCert, "pck certificate subject is not an sgx pck certificate");
    }

    let same_issuer = match (crl.issuer_raw(), pck.issuer_raw()) {
        (Some(crl_issuer), Some(pck_issuer)) => crl_issuer == pck_issuer,
        _ => false,
    };
    if !crl.check_issuer() || !same_issuer {
        fail!(Status::InvalidPckCrl, "crl is not issued by the pck certificate issuer");
    }

    if crl.is_revoked(pck) {
        fail!(Status::PckRevoked, "pck certificate is listed in the crl");
    }

    if pck.fmspc() != tcb_info.fmspc() || pck.pce_id() != tcb_info.pce_id() {
        fail!(
            Status::TcbInfoMismatch,
            "pck fmspc/pceid {}/{} do not match tcb info {}/{}",
            hex::encode(pck.fmspc()),
            hex::encode(pck.pce_id()),
            hex::encode(tcb_info.fmspc()),
            hex::encode(tcb_info.pce_id())
        );
    }

    if let Err(status) = verify_qe_cert_data(&auth_data.qe_cert_data) {
        fail!(status, "qe certification data size does not match its payload");
    }

    let pck_key = match pck.public_key() {
        Ok(key) => key,
        Err(e) => fail!(Status::InvalidPckCert, "pck public key is not a p256 key: {:#}", e),
    };

    if !verify_p256_signature_bytes(&auth_data.qe_report.to_bytes(), &auth_data.qe_report_signature, &pck_key) {
        fail!(Status::InvalidQeReportSignature, "qe report signature does not verify under the pck key");
    }

    if !verify_qe_report_data(auth_data) {
        fail!(Status::InvalidQeReportData, "qe report data does not bind the attestation key");
    }

    let mut qe_identity_status = Status::QeIdentityMismatch;
    if let Some(identity) = qe_identity {
        if !quote.is_sgx() || identity.id() != EnclaveId::Qe {
            fail!(Status::QeIdentityMismatch, "identity {:?} is not a qe identity for an sgx quote", identity.id());
        }

        qe_identity_status = report_verifier.verify(identity, &auth_data.qe_report);
        match qe_identity_status {
            Status::SgxEnclaveReportUnsupportedFormat => {
                fail!(Status::UnsupportedQuoteFormat, "qe report tcb status is not supported")
            }
            Status::SgxEnclaveIdentityUnsupportedFormat
            | Status::SgxEnclaveIdentityInvalid
            | Status::SgxEnclaveIdentityUnsupportedVersion => {
                fail!(Status::UnsupportedQeIdentityFormat, "qe identity rejected: {}", qe_identity_status)
            }
            Status::SgxEnclaveReportMiscselectMismatch
            | Status::SgxEnclaveReportAttributesMismatch
            | Status::SgxEnclaveReportMrsignerMismatch
            | Status::SgxEnclaveReportIsvprodidMismatch => {
                fail!(Status::QeIdentityMismatch, "qe report does not match the identity: {}", qe_identity_status)
            }
            _ => {}
        }
    }

    let attestation_key = match p256_key_from_raw(&auth_data.ecdsa_attestation_key) {
        Ok(key) => key,
        Err(e) => fail!(Status::UnsupportedQuoteFormat, "attestation key: {:#}", e),
    };

    if !verify_p256_signature_bytes(quote.signed_data(), &auth_data.ecdsa_signature, &attestation_key) {
        fail!(Status::InvalidQuoteSignature, "quote signature does not verify under the attestation key");
    }

    let tcb_level_status = match check_tcb_level(tcb_info, pck) {
        Ok(status) => status,
        Err(status) => return status,
    };

    if qe_identity.is_some() {
        return converge_tcb_status(tcb_level_status, qe_identity_status);
    }

    tcb_level_status
}

fn verify_qe_cert_data(qe_cert_data: &QeCertData) -> Result<(), Status> {
    if qe_cert_data.parsed_data_size as usize != qe_cert_data.data.len() {
        return Err(Status::UnsupportedQuoteFormat);
    }
    Ok(())
}

/// The first half of the QE report data must be SHA-256(attestation key || QE auth data).
fn verify_qe_report_data(auth_data: &QuoteAuthData) -> bool {
    let expected = sha256sum_concat(&[&auth_data.ecdsa_attestation_key, &auth_data.qe_auth_data.data]);
    auth_data.qe_report.report_data[..32] == expected
}
