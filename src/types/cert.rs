use anyhow::{anyhow, Context, Result};
use p256::ecdsa::VerifyingKey;
use x509_cert::crl::CertificateList;
use x509_cert::der::asn1::ObjectIdentifier;
use x509_cert::der::{Decode, DecodePem, Encode};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::Certificate;

use super::sgx_x509::{SgxExtensionTcbLevel, SgxPckExtension, SGX_EXTENSIONS_OID};
use crate::constants::PCK_CRL_ISSUERS;
use crate::utils::crypto::p256_key_from_sec1;

const COMMON_NAME_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// First common name attribute of an X.509 name.
pub fn common_name(name: &Name) -> Option<String> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| atv.oid == COMMON_NAME_OID)
        .and_then(|atv| std::str::from_utf8(atv.value.value()).ok())
        .map(str::to_string)
}

/// A PCK leaf certificate together with its decoded SGX extension.
#[derive(Debug, Clone)]
pub struct PckCertificate {
    cert: Certificate,
    sgx_extension: SgxPckExtension,
}

impl PckCertificate {
    /// Parses a single PEM certificate. Fails when it carries no readable SGX extension.
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let cert = Certificate::from_pem(pem).map_err(|e| anyhow!("invalid pck certificate pem: {}", e))?;
        Self::from_certificate(cert)
    }

    pub fn from_certificate(cert: Certificate) -> Result<Self> {
        let extension = cert
            .tbs_certificate
            .extensions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|ext| ext.extn_id.to_string() == SGX_EXTENSIONS_OID)
            .context("certificate has no sgx extension")?;
        let sgx_extension = SgxPckExtension::from_der(extension.extn_value.as_bytes())
            .context("malformed sgx extension")?;

        Ok(PckCertificate { cert, sgx_extension })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.cert
    }

    pub fn sgx_extension(&self) -> &SgxPckExtension {
        &self.sgx_extension
    }

    pub fn fmspc(&self) -> &[u8; 6] {
        &self.sgx_extension.fmspc
    }

    pub fn pce_id(&self) -> &[u8; 2] {
        &self.sgx_extension.pceid
    }

    pub fn tcb(&self) -> &SgxExtensionTcbLevel {
        &self.sgx_extension.tcb
    }

    pub fn subject(&self) -> &Name {
        &self.cert.tbs_certificate.subject
    }

    pub fn issuer(&self) -> &Name {
        &self.cert.tbs_certificate.issuer
    }

    pub fn subject_common_name(&self) -> Option<String> {
        common_name(&self.cert.tbs_certificate.subject)
    }

    pub fn serial_number(&self) -> &SerialNumber {
        &self.cert.tbs_certificate.serial_number
    }

    /// DER encoding of the issuer name, `None` when it cannot be encoded.
    pub fn issuer_raw(&self) -> Option<Vec<u8>> {
        self.cert.tbs_certificate.issuer.to_der().ok()
    }

    /// P-256 subject public key, used to check the QE report signature.
    pub fn public_key(&self) -> Result<VerifyingKey> {
        let spki = &self.cert.tbs_certificate.subject_public_key_info;
        p256_key_from_sec1(spki.subject_public_key.raw_bytes())
    }
}

/// A PCK certificate revocation list, accepted as PEM or raw DER.
#[derive(Debug, Clone)]
pub struct PckCrl {
    crl: CertificateList,
}

impl PckCrl {
    pub fn from_pem_or_der(data: &[u8]) -> Result<Self> {
        let crl = if data.starts_with(b"-----BEGIN") {
            let pem = pem::parse(data).map_err(|e| anyhow!("invalid crl pem: {}", e))?;
            CertificateList::from_der(pem.contents())
        } else {
            CertificateList::from_der(data)
        }
        .map_err(|e| anyhow!("invalid crl: {}", e))?;

        Ok(PckCrl { crl })
    }

    pub fn crl(&self) -> &CertificateList {
        &self.crl
    }

    pub fn into_inner(self) -> CertificateList {
        self.crl
    }

    /// True when the CRL was issued by one of the PCK processor or platform CAs.
    pub fn check_issuer(&self) -> bool {
        common_name(&self.crl.tbs_cert_list.issuer)
            .map(|cn| PCK_CRL_ISSUERS.contains(&cn.as_str()))
            .unwrap_or(false)
    }

    /// DER encoding of the issuer name, `None` when it cannot be encoded.
    pub fn issuer_raw(&self) -> Option<Vec<u8>> {
        self.crl.tbs_cert_list.issuer.to_der().ok()
    }

    pub fn is_revoked(&self, pck: &PckCertificate) -> bool {
        let serial_number = pck.serial_number();
        self.crl
            .tbs_cert_list
            .revoked_certificates
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|revoked| &revoked.serial_number == serial_number)
    }
}
