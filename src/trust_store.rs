use std::{collections::{BTreeMap, BTreeSet}, time::SystemTime};

use x509_cert::{certificate::CertificateInner, crl::CertificateList};
use x509_verify::VerifyingKey;

use crate::utils::Expireable;

/// Why a certificate, chain or CRL was not accepted by the [`TrustStore`].
///
/// Variants that concern a single certificate carry its subject, so callers can
/// tell which link of the chain failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrustError {
    #[error("certificate chain is empty")]
    EmptyChain,
    #[error("certificate chain is expired")]
    Expired,
    #[error("certificate [{subject}] is revoked")]
    Revoked { subject: String },
    #[error("failed to find trusted issuer [{issuer}] for [{subject}]")]
    UnknownIssuer { subject: String, issuer: String },
    #[error("failed to verify issuer signature on [{subject}]: {reason}")]
    InvalidSignature { subject: String, reason: String },
    #[error("failed to decode key from certificate [{subject}]: {reason}")]
    InvalidKey { subject: String, reason: String },
}

/// Anchors certificate chains and CRLs at a set of trusted CA certificates,
/// keyed by subject name, and remembers every serial number revoked by a CRL
/// it accepted.
pub struct TrustStore {
    pub trusted: BTreeMap<String, TrustedIdentity>,
    /// Serial numbers revoked by the CRLs pushed so far.
    pub crl: BTreeSet<String>,
    /// Validity periods are checked against this instant.
    pub current_time: SystemTime,
}

/// A certificate whose signature has been checked, with its decoded key.
pub struct TrustedIdentity {
    pub cert: CertificateInner,
    pub pk: VerifyingKey,
}

fn subject_of(cert: &CertificateInner) -> String {
    cert.tbs_certificate.subject.to_string()
}

fn identity_of(cert: &CertificateInner) -> Result<TrustedIdentity, TrustError> {
    let pk = cert.try_into().map_err(|e| TrustError::InvalidKey {
        subject: subject_of(cert),
        reason: format!("{}", e),
    })?;
    Ok(TrustedIdentity { cert: cert.clone(), pk })
}

impl TrustStore {
    /// Fails when the key of one of `trusted_certs` cannot be decoded.
    pub fn new(current_time: SystemTime, trusted_certs: Vec<CertificateInner>) -> Result<Self, TrustError> {
        let mut trusted = BTreeMap::new();

        for cert in trusted_certs {
            let identity = identity_of(&cert)?;
            trusted.insert(subject_of(&cert), identity);
        }

        Ok(Self {
            trusted,
            crl: BTreeSet::default(),
            current_time,
        })
    }

    /// Records the revoked serials of a CRL whose signature was checked elsewhere.
    pub fn push_trusted_crl(&mut self, crl: CertificateList) {
        if let Some(revoked_certs) = crl.tbs_cert_list.revoked_certificates {
            for cert in revoked_certs {
                self.crl.insert(cert.serial_number.to_string());
            }
        }
    }

    /// Checks the CRL signature against its issuer, looked up among the trusted
    /// CAs and then `intermediary`, and records its revoked serials.
    pub fn push_unverified_crl(
        &mut self,
        crl: CertificateList,
        intermediary: Option<&BTreeMap<String, TrustedIdentity>>,
    ) -> Result<(), TrustError> {
        let issuer = crl.tbs_cert_list.issuer.to_string();
        let signer = self.find_issuer(&issuer, &issuer, intermediary)?;

        signer.pk.verify_strict(&crl).map_err(|e| TrustError::InvalidSignature {
            subject: issuer.clone(),
            reason: format!("{}", e),
        })?;

        self.push_trusted_crl(crl);
        Ok(())
    }

    /// Verifies a leaf first `chain` up to a trusted CA, then the validity period
    /// of every member against `current_time`.
    pub fn verify_chain_leaf(&self, chain: &[CertificateInner]) -> Result<TrustedIdentity, TrustError> {
        let leaf = self.verify_chain_signatures(chain)?;

        if !chain.valid_at(self.current_time) {
            return Err(TrustError::Expired);
        }

        Ok(leaf)
    }

    /// Signature and revocation part of [`TrustStore::verify_chain_leaf`].
    pub fn verify_chain_signatures(&self, chain: &[CertificateInner]) -> Result<TrustedIdentity, TrustError> {
        // root is last, issuers are seen before the certificates they signed
        let mut chain = chain.iter().rev().peekable();
        let mut intermediary = BTreeMap::new();

        while let Some(cert) = chain.next() {
            let issuer = cert.tbs_certificate.issuer.to_string();
            let subject = subject_of(cert);

            if self.is_revoked(cert) {
                return Err(TrustError::Revoked { subject });
            }
            let signer = self.find_issuer(&subject, &issuer, Some(&intermediary))?;

            signer.pk.verify_strict(cert).map_err(|e| TrustError::InvalidSignature {
                subject: subject.clone(),
                reason: format!("{}", e),
            })?;

            let identity = identity_of(cert)?;

            if chain.peek().is_none() {
                return Ok(identity);
            }
            intermediary.insert(subject, identity);
        }

        Err(TrustError::EmptyChain)
    }

    /// Whether a CRL pushed to the store lists the certificate's serial number.
    pub fn is_revoked(&self, cert: &CertificateInner) -> bool {
        self.crl.contains(&cert.tbs_certificate.serial_number.to_string())
    }

    fn find_issuer<'a>(
        &'a self,
        subject: &str,
        issuer: &str,
        intermediary: Option<&'a BTreeMap<String, TrustedIdentity>>,
    ) -> Result<&'a TrustedIdentity, TrustError> {
        if let Some(signer) = self.trusted.get(issuer) {
            return Ok(signer);
        }
        if let Some(signer) = intermediary.and_then(|intermediary| intermediary.get(issuer)) {
            return Ok(signer);
        }
        Err(TrustError::UnknownIssuer {
            subject: subject.to_string(),
            issuer: issuer.to_string(),
        })
    }
}
