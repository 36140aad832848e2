pub mod constants;
pub mod status;
pub mod trust_store;
pub mod types;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use status::Status;
use types::cert::{PckCertificate, PckCrl};
use types::enclave_identity::EnclaveIdentity;
use types::quote::Quote;
use types::tcb_info::TcbInfo;
use utils::cert::{verify_enclave_identity, verify_pck_certificate, verify_tcb_info};
use utils::enclave_identity::EnclaveReportVerifier;
use utils::quotes::verify_quote_dcap;

/// Verifies an SGX quote against its PCK certificate, the CRL of the PCK
/// issuer, a TCB Info document and optionally the QE identity.
///
/// The collateral is parsed here and handed to [`verify_quote_dcap`]. Its
/// trust chain is not checked, see [`Verification`] for the full flow.
pub fn verify_quote(
    quote: Option<&[u8]>,
    pck_cert_pem: Option<&str>,
    pck_crl: Option<&[u8]>,
    tcb_info_json: Option<&str>,
    qe_identity_json: Option<&str>,
) -> Status {
    let (Some(quote), Some(pck_cert_pem), Some(pck_crl), Some(tcb_info_json)) =
        (quote, pck_cert_pem, pck_crl, tcb_info_json)
    else {
        log::debug!("quote verification is missing a mandatory parameter");
        return Status::MissingParameters;
    };

    let quote = match Quote::parse(quote) {
        Ok(quote) => quote,
        Err(e) => {
            log::warn!("failed to parse quote: {}", e);
            return Status::UnsupportedQuoteFormat;
        }
    };
    if !quote.validate() || !quote.is_sgx() {
        log::debug!(
            "quote header version {} tee type {:#x} is not supported",
            quote.header().version.get(),
            quote.header().tee_type.get()
        );
        return Status::UnsupportedQuoteFormat;
    }

    let pck = match PckCertificate::from_pem(pck_cert_pem.as_bytes()) {
        Ok(pck) => pck,
        Err(e) => {
            log::warn!("failed to parse pck certificate: {:#}", e);
            return Status::UnsupportedPckCertFormat;
        }
    };

    let crl = match PckCrl::from_pem_or_der(pck_crl) {
        Ok(crl) => crl,
        Err(e) => {
            log::warn!("failed to parse pck crl: {:#}", e);
            return Status::UnsupportedPckRlFormat;
        }
    };

    let tcb_info = match TcbInfo::parse(tcb_info_json) {
        Ok(tcb_info) => tcb_info,
        Err(e) => {
            log::warn!("failed to parse tcb info: {}", e);
            return Status::UnsupportedTcbInfoFormat;
        }
    };

    let qe_identity = match qe_identity_json.map(EnclaveIdentity::parse).transpose() {
        Ok(identity) => identity,
        Err(e) => {
            log::warn!("failed to parse qe identity: {}", e);
            return Status::UnsupportedQeIdentityFormat;
        }
    };

    verify_quote_dcap(&quote, &pck, &crl, &tcb_info, qe_identity.as_ref(), &EnclaveReportVerifier)
}

/// Everything needed to verify a quote end to end: the quote, the PCK
/// certificate with its signing chain, the collateral documents with their
/// signing chain, both CRLs and the trusted root CA.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub pck_certificate: String,
    /// Intermediate and root CA certificates of the PCK certificate.
    pub pck_signing_chain: String,
    pub root_ca_crl: String,
    pub intermediate_ca_crl: String,
    pub trusted_root_ca_certificate: String,
    pub tcb_info: String,
    /// TCB signing certificate and root CA, signer of the TCB Info and identities.
    pub tcb_signing_chain: String,
    #[serde(with = "hex::serde")]
    pub quote: Vec<u8>,
    #[serde(default)]
    pub qe_identity: Option<String>,
    #[serde(default)]
    pub qve_identity: Option<String>,
    /// Point in time the collateral has to be valid at, now when absent.
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
}

/// Outcome of [`Verification::verify`]. `ok` holds only when every status is OK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStatus {
    pub ok: bool,
    pub pck_certificate_status: Status,
    pub tcb_info_status: Status,
    pub qe_identity_status: Status,
    pub qve_identity_status: Status,
    pub quote_status: Status,
    #[serde(with = "hex::serde")]
    pub report_data: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub mr_enclave: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub attributes: Vec<u8>,
    pub misc_select: u32,
}

impl Default for VerificationStatus {
    fn default() -> Self {
        VerificationStatus {
            ok: false,
            pck_certificate_status: Status::InvalidPckCert,
            tcb_info_status: Status::TcbUnrecognizedStatus,
            qe_identity_status: Status::InvalidQeReportData,
            qve_identity_status: Status::InvalidQeReportData,
            quote_status: Status::InvalidQuoteSignature,
            report_data: Vec::new(),
            mr_enclave: Vec::new(),
            attributes: Vec::new(),
            misc_select: 0,
        }
    }
}

impl Verification {
    pub fn verify(&self) -> VerificationStatus {
        let expiration = self.expiration_date.unwrap_or_else(Utc::now);
        let root_ca_crl = self.root_ca_crl.as_bytes();
        let trusted_root = self.trusted_root_ca_certificate.as_str();

        let pck_chain = [self.pck_certificate.as_str(), &self.pck_signing_chain].concat();
        let pck_certificate_status = verify_pck_certificate(
            &pck_chain,
            root_ca_crl,
            self.intermediate_ca_crl.as_bytes(),
            trusted_root,
            expiration,
        );

        let tcb_info_status =
            verify_tcb_info(&self.tcb_info, &self.tcb_signing_chain, root_ca_crl, trusted_root, expiration);

        let identity_status = |identity: &Option<String>| match identity {
            Some(identity) => {
                verify_enclave_identity(identity, &self.tcb_signing_chain, root_ca_crl, trusted_root, expiration)
            }
            None => Status::Ok,
        };
        let qe_identity_status = identity_status(&self.qe_identity);
        let qve_identity_status = identity_status(&self.qve_identity);

        let quote_status = verify_quote(
            Some(self.quote.as_slice()),
            Some(self.pck_certificate.as_str()),
            Some(self.intermediate_ca_crl.as_bytes()),
            Some(self.tcb_info.as_str()),
            self.qe_identity.as_deref(),
        );

        let mut status = VerificationStatus {
            ok: [
                pck_certificate_status,
                tcb_info_status,
                qe_identity_status,
                qve_identity_status,
                quote_status,
            ]
            .iter()
            .all(Status::is_ok),
            pck_certificate_status,
            tcb_info_status,
            qe_identity_status,
            qve_identity_status,
            quote_status,
            ..Default::default()
        };

        if let Ok(quote) = Quote::parse(&self.quote) {
            if quote.validate() {
                let report = quote.enclave_report();
                status.report_data = report.report_data.to_vec();
                status.mr_enclave = report.mr_enclave.to_vec();
                status.attributes = report.attributes.to_vec();
                status.misc_select = report.misc_select.get();
            }
        }

        status
    }
}
