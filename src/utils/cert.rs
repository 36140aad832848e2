use std::collections::BTreeMap;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use x509_cert::crl::CertificateList;
use x509_cert::der::DecodePem;
use x509_cert::Certificate;

use crate::constants::{
    SGX_INTERMEDIATE_CN_PHRASES, SGX_PCK_CN_PHRASE, SGX_ROOT_CA_CN_PHRASE, SGX_TCB_SIGNING_CN_PHRASE,
};
use crate::status::Status;
use crate::trust_store::{TrustError, TrustStore, TrustedIdentity};
use crate::types::cert::{common_name, PckCrl};
use crate::types::enclave_identity::EnclaveIdentity;
use crate::types::tcb_info::TcbInfo;
use crate::utils::crypto::{p256_key_from_sec1, verify_p256_signature_bytes};
use crate::utils::Expireable;

fn has_cn_phrase(cert: &Certificate, phrases: &[&str]) -> bool {
    common_name(&cert.tbs_certificate.subject)
        .map(|cn| phrases.iter().any(|phrase| cn.contains(phrase)))
        .unwrap_or(false)
}

fn is_self_issued(cert: &Certificate) -> bool {
    cert.tbs_certificate.subject == cert.tbs_certificate.issuer
}

fn find_root(chain: &[Certificate]) -> Option<&Certificate> {
    chain
        .iter()
        .find(|cert| is_self_issued(cert) && has_cn_phrase(cert, &[SGX_ROOT_CA_CN_PHRASE]))
}

fn find_role<'a>(chain: &'a [Certificate], phrases: &[&str]) -> Option<&'a Certificate> {
    chain.iter().find(|cert| has_cn_phrase(cert, phrases))
}

fn missing(status: Status, role: &str) -> Status {
    log::debug!("{} is missing from the certificate chain", role);
    status
}

fn parse_chain(pem: &str) -> Result<Vec<Certificate>, Status> {
    match Certificate::load_pem_chain(pem.as_bytes()) {
        Ok(chain) if !chain.is_empty() => Ok(chain),
        Ok(_) => {
            log::warn!("certificate chain holds no certificate");
            Err(Status::UnsupportedCertFormat)
        }
        Err(e) => {
            log::warn!("failed to parse certificate chain: {}", e);
            Err(Status::UnsupportedCertFormat)
        }
    }
}

fn parse_crl(data: &[u8]) -> Result<CertificateList, Status> {
    PckCrl::from_pem_or_der(data).map(PckCrl::into_inner).map_err(|e| {
        log::warn!("failed to parse crl: {:#}", e);
        Status::SgxCrlUnsupportedFormat
    })
}

fn parse_trusted_root(pem: &str) -> Result<Certificate, Status> {
    Certificate::from_pem(pem.as_bytes()).map_err(|e| {
        log::warn!("failed to parse trusted root ca: {}", e);
        Status::TrustedRootCaUnsupportedFormat
    })
}

/// Trust store anchored at `trusted_root`, which has to be self-signed.
fn anchor(trusted_root: &Certificate, time: SystemTime) -> Result<TrustStore, Status> {
    if !is_self_issued(trusted_root) {
        log::debug!("trusted root ca is not self issued");
        return Err(Status::TrustedRootCaInvalid);
    }

    let store = TrustStore::new(time, vec![trusted_root.clone()]).map_err(|e| {
        log::debug!("trusted root ca rejected: {}", e);
        Status::TrustedRootCaInvalid
    })?;
    store
        .verify_chain_signatures(std::slice::from_ref(trusted_root))
        .map_err(|e| {
            log::debug!("trusted root ca is not self signed: {}", e);
            Status::TrustedRootCaInvalid
        })?;

    Ok(store)
}

fn push_crl(
    store: &mut TrustStore,
    crl: CertificateList,
    intermediary: Option<&BTreeMap<String, TrustedIdentity>>,
) -> Result<(), Status> {
    store.push_unverified_crl(crl, intermediary).map_err(|e| {
        log::debug!("crl rejected: {}", e);
        match e {
            TrustError::UnknownIssuer { .. } => Status::SgxCrlUnknownIssuer,
            _ => Status::SgxCrlInvalidSignature,
        }
    })
}

/// Checks a PCK certificate chain (leaf, PCK processor or platform CA, root CA,
/// in any order) against the trusted root and the CRLs of both CAs.
///
/// Trust is settled first, revocation and expiry against `expiration` last.
pub fn verify_pck_certificate(
    chain_pem: &str,
    root_ca_crl: &[u8],
    intermediate_ca_crl: &[u8],
    trusted_root_pem: &str,
    expiration: DateTime<Utc>,
) -> Status {
    match check_pck_certificate(chain_pem, root_ca_crl, intermediate_ca_crl, trusted_root_pem, expiration) {
        Ok(()) => Status::Ok,
        Err(status) => status,
    }
}

fn check_pck_certificate(
    chain_pem: &str,
    root_ca_crl: &[u8],
    intermediate_ca_crl: &[u8],
    trusted_root_pem: &str,
    expiration: DateTime<Utc>,
) -> Result<(), Status> {
    let chain = parse_chain(chain_pem)?;
    let root_crl = parse_crl(root_ca_crl)?;
    let intermediate_crl = parse_crl(intermediate_ca_crl)?;
    let trusted_root = parse_trusted_root(trusted_root_pem)?;

    let root = find_root(&chain).ok_or_else(|| missing(Status::SgxRootCaMissing, "root ca"))?;
    let intermediate = find_role(&chain, &SGX_INTERMEDIATE_CN_PHRASES)
        .ok_or_else(|| missing(Status::SgxIntermediateCaMissing, "pck intermediate ca"))?;
    let pck = find_role(&chain, &[SGX_PCK_CN_PHRASE])
        .ok_or_else(|| missing(Status::SgxPckMissing, "pck certificate"))?;

    let time = SystemTime::from(expiration);
    let mut store = anchor(&trusted_root, time)?;
    if *root != trusted_root {
        log::debug!("pck chain root is not the trusted root ca");
        return Err(Status::SgxPckCertChainUntrusted);
    }

    push_crl(&mut store, root_crl.clone(), None)?;

    let intermediate_identity = store
        .verify_chain_signatures(&[intermediate.clone(), root.clone()])
        .map_err(|e| {
            log::debug!("pck intermediate ca rejected: {}", e);
            match e {
                TrustError::Revoked { .. } => Status::SgxIntermediateCaRevoked,
                _ => Status::SgxIntermediateCaInvalidIssuer,
            }
        })?;

    if intermediate_crl.tbs_cert_list.issuer != intermediate.tbs_certificate.subject {
        log::debug!("intermediate crl is not issued by the pck intermediate ca");
        return Err(Status::SgxCrlUnknownIssuer);
    }
    let mut intermediary = BTreeMap::new();
    intermediary.insert(intermediate.tbs_certificate.subject.to_string(), intermediate_identity);
    push_crl(&mut store, intermediate_crl.clone(), Some(&intermediary))?;

    store
        .verify_chain_signatures(&[pck.clone(), intermediate.clone(), root.clone()])
        .map_err(|e| {
            log::debug!("pck certificate rejected: {}", e);
            match e {
                TrustError::Revoked { .. } => Status::SgxPckRevoked,
                _ => Status::SgxPckInvalidIssuer,
            }
        })?;

    if ![pck, intermediate, root].iter().all(|cert| cert.valid_at(time)) {
        log::debug!("pck certificate chain is not valid at {}", expiration);
        return Err(Status::SgxPckCertChainExpired);
    }
    if !root_crl.valid_at(time) || !intermediate_crl.valid_at(time) {
        log::debug!("pck crls are not valid at {}", expiration);
        return Err(Status::SgxCrlExpired);
    }

    Ok(())
}

/// TCB signing certificate and root CA, verified against the trusted root and
/// the root CA CRL.
struct SigningChain {
    signer: Certificate,
    root: Certificate,
    root_crl: CertificateList,
}

impl SigningChain {
    fn verify(
        signing_chain_pem: &str,
        root_ca_crl: &[u8],
        trusted_root_pem: &str,
        time: SystemTime,
    ) -> Result<Self, Status> {
        let chain = parse_chain(signing_chain_pem)?;
        let root_crl = parse_crl(root_ca_crl)?;
        let trusted_root = parse_trusted_root(trusted_root_pem)?;

        let signer = find_role(&chain, &[SGX_TCB_SIGNING_CN_PHRASE])
            .ok_or_else(|| missing(Status::SgxTcbSigningCertMissing, "tcb signing certificate"))?;
        let root = find_root(&chain).ok_or_else(|| missing(Status::SgxRootCaMissing, "root ca"))?;

        let mut store = anchor(&trusted_root, time)?;
        if *root != trusted_root {
            log::debug!("signing chain root is not the trusted root ca");
            return Err(Status::SgxTcbSigningCertChainUntrusted);
        }

        push_crl(&mut store, root_crl.clone(), None)?;

        store
            .verify_chain_signatures(&[signer.clone(), root.clone()])
            .map_err(|e| {
                log::debug!("tcb signing certificate rejected: {}", e);
                match e {
                    TrustError::Revoked { .. } => Status::SgxTcbSigningCertRevoked,
                    _ => Status::SgxTcbSigningCertInvalidIssuer,
                }
            })?;

        Ok(SigningChain { signer: signer.clone(), root: root.clone(), root_crl })
    }

    /// ECDSA-P256 signature by the signing certificate over a collateral body.
    fn signed(&self, body: &[u8], signature: &[u8]) -> bool {
        let spki = &self.signer.tbs_certificate.subject_public_key_info;
        match p256_key_from_sec1(spki.subject_public_key.raw_bytes()) {
            Ok(key) => verify_p256_signature_bytes(body, signature, &key),
            Err(e) => {
                log::debug!("tcb signing key: {:#}", e);
                false
            }
        }
    }

    fn check_expiry(&self, time: SystemTime) -> Result<(), Status> {
        if !self.signer.valid_at(time) || !self.root.valid_at(time) {
            log::debug!("signing certificate chain is expired");
            return Err(Status::SgxSigningCertChainExpired);
        }
        if !self.root_crl.valid_at(time) {
            log::debug!("root ca crl is expired");
            return Err(Status::SgxCrlExpired);
        }
        Ok(())
    }
}

/// Checks a TCB Info document: its signing chain, its signature and that it is
/// still current at `expiration`.
pub fn verify_tcb_info(
    tcb_info_json: &str,
    signing_chain_pem: &str,
    root_ca_crl: &[u8],
    trusted_root_pem: &str,
    expiration: DateTime<Utc>,
) -> Status {
    let tcb_info = match TcbInfo::parse(tcb_info_json) {
        Ok(tcb_info) => tcb_info,
        Err(e) => {
            log::warn!("failed to parse tcb info: {}", e);
            return e.status();
        }
    };

    let time = SystemTime::from(expiration);
    let chain = match SigningChain::verify(signing_chain_pem, root_ca_crl, trusted_root_pem, time) {
        Ok(chain) => chain,
        Err(status) => return status,
    };

    if !chain.signed(tcb_info.body(), tcb_info.signature()) {
        log::debug!("tcb info signature does not verify");
        return Status::TcbInfoInvalidSignature;
    }

    if let Err(status) = chain.check_expiry(time) {
        return status;
    }
    if tcb_info.next_update() < expiration {
        log::debug!("tcb info next update {} is before {}", tcb_info.next_update(), expiration);
        return Status::SgxTcbInfoExpired;
    }

    Status::Ok
}

/// Same checks as [`verify_tcb_info`] for a QE or QvE identity document.
pub fn verify_enclave_identity(
    identity_json: &str,
    signing_chain_pem: &str,
    root_ca_crl: &[u8],
    trusted_root_pem: &str,
    expiration: DateTime<Utc>,
) -> Status {
    let identity = match EnclaveIdentity::parse(identity_json) {
        Ok(identity) => identity,
        Err(e) => {
            log::warn!("failed to parse enclave identity: {}", e);
            return e.status();
        }
    };

    let time = SystemTime::from(expiration);
    let chain = match SigningChain::verify(signing_chain_pem, root_ca_crl, trusted_root_pem, time) {
        Ok(chain) => chain,
        Err(status) => return status,
    };

    if !chain.signed(identity.body(), identity.signature()) {
        log::debug!("enclave identity signature does not verify");
        return Status::SgxEnclaveIdentityInvalidSignature;
    }

    if let Err(status) = chain.check_expiry(time) {
        return status;
    }
    if !identity.check_date_correctness(expiration) {
        log::debug!(
            "enclave identity is valid from {} to {}, not at {}",
            identity.issue_date(),
            identity.next_update(),
            expiration
        );
        return Status::SgxEnclaveIdentityExpired;
    }

    Status::Ok
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use time::OffsetDateTime;

    use super::*;
    use crate::test_utils::{default_tcb_levels, qe_identity_body, tcb_info_body, SgxExtensionSpec, TestPki};

    // 2020-06-01T00:00:00Z
    const JUNE_2020: i64 = 1_590_969_600;

    fn at(date: &str) -> DateTime<Utc> {
        date.parse().expect("rfc3339 date")
    }

    fn checked_at() -> DateTime<Utc> {
        at("2020-12-01T00:00:00Z")
    }

    fn pki() -> TestPki {
        TestPki::new(&SgxExtensionSpec::up_to_date())
    }

    fn verify_pck(pki: &TestPki) -> Status {
        verify_pck_certificate(
            &pki.pck_chain_pem(),
            pki.root_crl_pem.as_bytes(),
            pki.intermediate_crl_pem.as_bytes(),
            &pki.root_pem,
            checked_at(),
        )
    }

    fn verify_tcb(pki: &TestPki, tcb_info: &str, chain: &str, expiration: DateTime<Utc>) -> Status {
        verify_tcb_info(tcb_info, chain, pki.root_crl_pem.as_bytes(), &pki.root_pem, expiration)
    }

    fn verify_identity(pki: &TestPki, identity: &str, expiration: DateTime<Utc>) -> Status {
        verify_enclave_identity(
            identity,
            &pki.tcb_chain_pem(),
            &pki.root_crl_der,
            &pki.root_pem,
            expiration,
        )
    }

    #[test]
    fn accepts_valid_pck_chains() {
        let pki = pki();
        assert_eq!(verify_pck(&pki), Status::Ok);

        let reversed = [pki.root_pem.as_str(), &pki.intermediate_pem, &pki.pck_pem].concat();
        let status = verify_pck_certificate(
            &reversed,
            &pki.root_crl_der,
            &pki.intermediate_crl_der,
            &pki.root_pem,
            checked_at(),
        );
        assert_eq!(status, Status::Ok);

        let platform = TestPki::builder(&SgxExtensionSpec::up_to_date()).platform_ca().build();
        assert_eq!(verify_pck(&platform), Status::Ok);
    }

    #[test]
    fn pck_chain_roles_must_be_present() {
        let pki = pki();
        let cases = [
            ([pki.pck_pem.as_str(), &pki.root_pem].concat(), Status::SgxIntermediateCaMissing),
            ([pki.intermediate_pem.as_str(), &pki.root_pem].concat(), Status::SgxPckMissing),
            ([pki.pck_pem.as_str(), &pki.intermediate_pem].concat(), Status::SgxRootCaMissing),
            ("not a chain".to_string(), Status::UnsupportedCertFormat),
        ];
        for (chain, expected) in cases {
            let status = verify_pck_certificate(
                &chain,
                pki.root_crl_pem.as_bytes(),
                pki.intermediate_crl_pem.as_bytes(),
                &pki.root_pem,
                checked_at(),
            );
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn pck_chain_must_end_at_the_trusted_root() {
        let pki = pki();
        let other = TestPki::new(&SgxExtensionSpec::up_to_date());
        let verify = |trusted_root: &str| {
            verify_pck_certificate(
                &pki.pck_chain_pem(),
                pki.root_crl_pem.as_bytes(),
                pki.intermediate_crl_pem.as_bytes(),
                trusted_root,
                checked_at(),
            )
        };

        assert_eq!(verify(&other.root_pem), Status::SgxPckCertChainUntrusted);
        assert_eq!(verify(&pki.intermediate_pem), Status::TrustedRootCaInvalid);
        assert_eq!(verify("garbage"), Status::TrustedRootCaUnsupportedFormat);
    }

    #[test]
    fn revoked_pck_chain_members() {
        let pki = TestPki::builder(&SgxExtensionSpec::up_to_date()).revoke_intermediate().build();
        assert_eq!(verify_pck(&pki), Status::SgxIntermediateCaRevoked);

        let pki = TestPki::builder(&SgxExtensionSpec::up_to_date()).revoke_pck().build();
        assert_eq!(verify_pck(&pki), Status::SgxPckRevoked);
    }

    #[test]
    fn crls_must_come_from_their_ca() {
        let pki = pki();
        let other = TestPki::new(&SgxExtensionSpec::up_to_date());
        let verify = |root_crl: &[u8], intermediate_crl: &[u8]| {
            verify_pck_certificate(&pki.pck_chain_pem(), root_crl, intermediate_crl, &pki.root_pem, checked_at())
        };

        assert_eq!(
            verify(other.root_crl_pem.as_bytes(), pki.intermediate_crl_pem.as_bytes()),
            Status::SgxCrlInvalidSignature
        );
        assert_eq!(
            verify(pki.intermediate_crl_pem.as_bytes(), pki.intermediate_crl_pem.as_bytes()),
            Status::SgxCrlUnknownIssuer
        );
        assert_eq!(
            verify(pki.root_crl_pem.as_bytes(), pki.root_crl_pem.as_bytes()),
            Status::SgxCrlUnknownIssuer
        );
        assert_eq!(
            verify(pki.root_crl_pem.as_bytes(), other.intermediate_crl_pem.as_bytes()),
            Status::SgxCrlInvalidSignature
        );
        assert_eq!(verify(b"garbage", pki.intermediate_crl_pem.as_bytes()), Status::SgxCrlUnsupportedFormat);
    }

    #[test]
    fn pck_expiry_is_checked_last() {
        let june = OffsetDateTime::from_unix_timestamp(JUNE_2020).expect("timestamp");

        let pki = TestPki::builder(&SgxExtensionSpec::up_to_date()).pck_not_after(june).build();
        assert_eq!(verify_pck(&pki), Status::SgxPckCertChainExpired);

        let pki = TestPki::builder(&SgxExtensionSpec::up_to_date()).crl_next_update(june).build();
        assert_eq!(verify_pck(&pki), Status::SgxCrlExpired);

        // revocation wins over expiry
        let pki = TestPki::builder(&SgxExtensionSpec::up_to_date()).revoke_pck().pck_not_after(june).build();
        assert_eq!(verify_pck(&pki), Status::SgxPckRevoked);
    }

    #[test]
    fn accepts_signed_tcb_info() {
        let pki = pki();
        let tcb_info = pki.signed_tcb_info(&tcb_info_body(default_tcb_levels()));
        assert_eq!(verify_tcb(&pki, &tcb_info, &pki.tcb_chain_pem(), checked_at()), Status::Ok);
    }

    #[test]
    fn tcb_info_signature_and_dates() {
        let pki = pki();
        let other = TestPki::new(&SgxExtensionSpec::up_to_date());
        let body = tcb_info_body(default_tcb_levels());

        let foreign = other.signed_tcb_info(&body);
        assert_eq!(verify_tcb(&pki, &foreign, &pki.tcb_chain_pem(), checked_at()), Status::TcbInfoInvalidSignature);

        let mut tampered: Value = serde_json::from_str(&pki.signed_tcb_info(&body)).expect("json");
        tampered["tcbInfo"]["tcbEvaluationDataNumber"] = json!(9);
        assert_eq!(
            verify_tcb(&pki, &tampered.to_string(), &pki.tcb_chain_pem(), checked_at()),
            Status::TcbInfoInvalidSignature
        );

        let tcb_info = pki.signed_tcb_info(&body);
        assert_eq!(
            verify_tcb(&pki, &tcb_info, &pki.tcb_chain_pem(), at("2021-01-01T00:00:00Z")),
            Status::SgxTcbInfoExpired
        );
        assert_eq!(
            verify_tcb(&pki, &tcb_info, &pki.tcb_chain_pem(), at("2050-06-01T00:00:00Z")),
            Status::SgxSigningCertChainExpired
        );

        assert_eq!(
            verify_tcb(&pki, "{\"tcbInfo\": []", &pki.tcb_chain_pem(), checked_at()),
            Status::SgxTcbInfoUnsupportedFormat
        );
    }

    #[test]
    fn tcb_signing_chain_trust() {
        let pki = pki();
        let other = TestPki::new(&SgxExtensionSpec::up_to_date());
        let tcb_info = pki.signed_tcb_info(&tcb_info_body(default_tcb_levels()));

        assert_eq!(verify_tcb(&pki, &tcb_info, &pki.root_pem, checked_at()), Status::SgxTcbSigningCertMissing);
        assert_eq!(verify_tcb(&pki, &tcb_info, &pki.tcb_signing_pem, checked_at()), Status::SgxRootCaMissing);

        let foreign_signer = [other.tcb_signing_pem.as_str(), &pki.root_pem].concat();
        assert_eq!(
            verify_tcb(&pki, &tcb_info, &foreign_signer, checked_at()),
            Status::SgxTcbSigningCertInvalidIssuer
        );

        let status = verify_tcb_info(
            &tcb_info,
            &pki.tcb_chain_pem(),
            other.root_crl_pem.as_bytes(),
            &other.root_pem,
            checked_at(),
        );
        assert_eq!(status, Status::SgxTcbSigningCertChainUntrusted);

        let revoked = TestPki::builder(&SgxExtensionSpec::up_to_date()).revoke_tcb_signing().build();
        let tcb_info = revoked.signed_tcb_info(&tcb_info_body(default_tcb_levels()));
        assert_eq!(
            verify_tcb(&revoked, &tcb_info, &revoked.tcb_chain_pem(), checked_at()),
            Status::SgxTcbSigningCertRevoked
        );
    }

    #[test]
    fn enclave_identity_outcomes() {
        let pki = pki();
        let identity = pki.signed_qe_identity(&qe_identity_body());
        assert_eq!(verify_identity(&pki, &identity, checked_at()), Status::Ok);

        assert_eq!(
            verify_identity(&pki, &identity, at("2021-01-01T00:00:00Z")),
            Status::SgxEnclaveIdentityExpired
        );
        // the issue date itself is outside the window
        assert_eq!(
            verify_identity(&pki, &identity, at("2020-11-18T09:46:04Z")),
            Status::SgxEnclaveIdentityExpired
        );

        let other = TestPki::new(&SgxExtensionSpec::up_to_date());
        let foreign = other.signed_qe_identity(&qe_identity_body());
        assert_eq!(verify_identity(&pki, &foreign, checked_at()), Status::SgxEnclaveIdentityInvalidSignature);

        let mut body = qe_identity_body();
        body["version"] = json!(3);
        assert_eq!(
            verify_identity(&pki, &pki.signed_qe_identity(&body), checked_at()),
            Status::SgxEnclaveIdentityUnsupportedVersion
        );
        assert_eq!(verify_identity(&pki, "[]", checked_at()), Status::SgxEnclaveIdentityUnsupportedFormat);

        let revoked = TestPki::builder(&SgxExtensionSpec::up_to_date()).revoke_tcb_signing().build();
        let identity = revoked.signed_qe_identity(&qe_identity_body());
        assert_eq!(verify_identity(&revoked, &identity, checked_at()), Status::SgxTcbSigningCertRevoked);
    }
}
