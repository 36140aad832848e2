//! Builders for test quotes, certificates, CRLs and signed collateral.

use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use p256::pkcs8::DecodePrivateKey;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateRevocationListParams,
    CustomExtension, DistinguishedName, DnType, IsCa, KeyIdMethod, KeyPair, KeyUsagePurpose,
    RevocationReason, RevokedCertParams, SerialNumber,
};
use serde_json::{json, Value};
use time::OffsetDateTime;
use yasna::models::ObjectIdentifier;
use zerocopy::{AsBytes, FromZeroes};

use crate::constants::{ECDSA_256_WITH_P256_CURVE, INTEL_QE_VENDOR_ID, QUOTE_VERSION_3, SGX_TEE_TYPE};
use crate::types::cert::PckCrl;
use crate::types::quote::{
    EnclaveReport, QeAuthData, QeCertData, QuoteAuthData, QuoteHeader, PCK_CERT_CHAIN_CERT_TYPE,
};
use crate::utils::hash::sha256sum_concat;

pub const TEST_FMSPC: [u8; 6] = [0x00, 0x90, 0x6E, 0xA1, 0x00, 0x00];
pub const UP_TO_DATE_COMPONENTS: [u32; 16] = [15, 15, 2, 4, 1, 128, 6, 0, 0, 0, 0, 0, 0, 0, 0, 0];
pub const UP_TO_DATE_PCESVN: u32 = 11;

pub const QE_IDENTITY_V2_JSON: &str = include_str!("../data/qe_identity_v2.json");

/// mrsigner of the QE in `data/qe_identity_v2.json`.
const QE_MRSIGNER: &str = "8C4F5775D796503E96137F77C68A829A0056AC8DED70140B081B094490C57BFF";

const SGX_EXTENSION_ARCS: [u64; 7] = [1, 2, 840, 113741, 1, 13, 1];

// 2020-01-01T00:00:00Z and 2030-01-01T00:00:00Z
const CRL_THIS_UPDATE: i64 = 1_577_836_800;
const CRL_NEXT_UPDATE: i64 = 1_893_456_000;

fn attestation_key() -> SigningKey {
    SigningKey::from_slice(&[0x1F; 32]).expect("valid p256 scalar")
}

/// Assembles quotes field by field. The default is a well formed version 3 SGX
/// quote whose QE report matches `data/qe_identity_v2.json` at isvsvn 6.
#[derive(Debug, Clone)]
pub struct QuoteGenerator {
    pub header: QuoteHeader,
    pub enclave_report: EnclaveReport,
    pub auth_data: QuoteAuthData,
    auth_data_size: Option<u32>,
}

impl Default for QuoteGenerator {
    fn default() -> Self {
        let mut header = QuoteHeader::new_zeroed();
        header.version.set(QUOTE_VERSION_3);
        header.attestation_key_type.set(ECDSA_256_WITH_P256_CURVE);
        header.tee_type.set(SGX_TEE_TYPE);
        header.qe_svn.set(6);
        header.pce_svn.set(UP_TO_DATE_PCESVN as u16);
        header.qe_vendor_id = INTEL_QE_VENDOR_ID;

        let mut enclave_report = EnclaveReport::new_zeroed();
        enclave_report.attributes[0] = 0x07;
        enclave_report.mr_enclave = [0x5E; 32];
        enclave_report.mr_signer = [0x51; 32];
        enclave_report.report_data = [0x42; 64];

        let mut qe_report = EnclaveReport::new_zeroed();
        qe_report.attributes[0] = 0x11;
        qe_report
            .mr_signer
            .copy_from_slice(&hex::decode(QE_MRSIGNER).expect("qe mrsigner hex"));
        qe_report.isv_prod_id.set(1);
        qe_report.isv_svn.set(6);

        let mut ecdsa_attestation_key = [0u8; 64];
        ecdsa_attestation_key
            .copy_from_slice(&attestation_key().verifying_key().to_encoded_point(false).as_bytes()[1..]);

        let qe_auth: Vec<u8> = (0u8..32).collect();
        let cert_data = b"-----BEGIN CERTIFICATE-----\npck chain placeholder\n-----END CERTIFICATE-----\n".to_vec();

        QuoteGenerator {
            header,
            enclave_report,
            auth_data: QuoteAuthData {
                ecdsa_signature: [0u8; 64],
                ecdsa_attestation_key,
                qe_report,
                qe_report_signature: [0u8; 64],
                qe_auth_data: QeAuthData { parsed_data_size: qe_auth.len() as u16, data: qe_auth },
                qe_cert_data: QeCertData {
                    cert_type: PCK_CERT_CHAIN_CERT_TYPE,
                    parsed_data_size: cert_data.len() as u32,
                    data: cert_data,
                },
            },
            auth_data_size: None,
        }
    }
}

impl QuoteGenerator {
    /// Declares `size` as the auth data size instead of the encoded length.
    pub fn with_auth_data_size(mut self, size: u32) -> Self {
        self.auth_data_size = Some(size);
        self
    }

    /// Binds the attestation key into the QE report, signs the QE report with
    /// `pck_key` and signs header || enclave report with the attestation key.
    pub fn sign(mut self, pck_key: &SigningKey) -> Self {
        let attestation_key = attestation_key();
        self.auth_data
            .ecdsa_attestation_key
            .copy_from_slice(&attestation_key.verifying_key().to_encoded_point(false).as_bytes()[1..]);

        let digest = sha256sum_concat(&[
            &self.auth_data.ecdsa_attestation_key,
            &self.auth_data.qe_auth_data.data,
        ]);
        self.auth_data.qe_report.report_data = [0u8; 64];
        self.auth_data.qe_report.report_data[..32].copy_from_slice(&digest);

        let qe_report_signature: Signature = pck_key.sign(&self.auth_data.qe_report.to_bytes());
        self.auth_data
            .qe_report_signature
            .copy_from_slice(&qe_report_signature.to_bytes());

        let mut signed = self.header.as_bytes().to_vec();
        signed.extend_from_slice(self.enclave_report.as_bytes());
        let quote_signature: Signature = attestation_key.sign(&signed);
        self.auth_data.ecdsa_signature.copy_from_slice(&quote_signature.to_bytes());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let auth_data = self.auth_data.to_bytes();
        let mut out = self.header.as_bytes().to_vec();
        if self.header.tee_type.get() == SGX_TEE_TYPE {
            out.extend_from_slice(self.enclave_report.as_bytes());
        }
        let size = self.auth_data_size.unwrap_or(auth_data.len() as u32);
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&auth_data);
        out
    }
}

/// Content of a PCK certificate's SGX extension.
#[derive(Debug, Clone, Default)]
pub struct SgxExtensionSpec {
    pub components: [u32; 16],
    pub pcesvn: u32,
    pub fmspc: [u8; 6],
    pub pceid: [u8; 2],
    /// Platform CA style extension: scalable type, instance id and configuration.
    pub platform: bool,
    pub omit_fmspc: bool,
}

impl SgxExtensionSpec {
    /// A platform at the top level of [`default_tcb_levels`].
    pub fn up_to_date() -> Self {
        SgxExtensionSpec {
            components: UP_TO_DATE_COMPONENTS,
            pcesvn: UP_TO_DATE_PCESVN,
            fmspc: TEST_FMSPC,
            pceid: [0x00, 0x00],
            ..Default::default()
        }
    }
}

fn sgx_oid(arcs: &[u64]) -> ObjectIdentifier {
    ObjectIdentifier::from_slice(&[&SGX_EXTENSION_ARCS[..], arcs].concat())
}

/// DER value of the SGX extension (1.2.840.113741.1.13.1).
pub fn sgx_extension_der(spec: &SgxExtensionSpec) -> Vec<u8> {
    yasna::construct_der(|writer| {
        writer.write_sequence(|writer| {
            writer.next().write_sequence(|writer| {
                writer.next().write_oid(&sgx_oid(&[1]));
                writer.next().write_bytes(&[0xAA; 16]);
            });
            writer.next().write_sequence(|writer| {
                writer.next().write_oid(&sgx_oid(&[2]));
                writer.next().write_sequence(|writer| {
                    for (index, svn) in spec.components.iter().enumerate() {
                        writer.next().write_sequence(|writer| {
                            writer.next().write_oid(&sgx_oid(&[2, index as u64 + 1]));
                            writer.next().write_u32(*svn);
                        });
                    }
                    writer.next().write_sequence(|writer| {
                        writer.next().write_oid(&sgx_oid(&[2, 17]));
                        writer.next().write_u32(spec.pcesvn);
                    });
                    writer.next().write_sequence(|writer| {
                        writer.next().write_oid(&sgx_oid(&[2, 18]));
                        writer.next().write_bytes(&spec.components.map(|c| c as u8));
                    });
                });
            });
            writer.next().write_sequence(|writer| {
                writer.next().write_oid(&sgx_oid(&[3]));
                writer.next().write_bytes(&spec.pceid);
            });
            if !spec.omit_fmspc {
                writer.next().write_sequence(|writer| {
                    writer.next().write_oid(&sgx_oid(&[4]));
                    writer.next().write_bytes(&spec.fmspc);
                });
            }
            writer.next().write_sequence(|writer| {
                writer.next().write_oid(&sgx_oid(&[5]));
                writer.next().write_enum(if spec.platform { 1 } else { 0 });
            });
            if spec.platform {
                writer.next().write_sequence(|writer| {
                    writer.next().write_oid(&sgx_oid(&[6]));
                    writer.next().write_bytes(&[0xBB; 16]);
                });
                writer.next().write_sequence(|writer| {
                    writer.next().write_oid(&sgx_oid(&[7]));
                    writer.next().write_sequence(|writer| {
                        for (arc, flag) in [(1, true), (2, false), (3, true)] {
                            writer.next().write_sequence(|writer| {
                                writer.next().write_oid(&sgx_oid(&[7, arc]));
                                writer.next().write_bool(flag);
                            });
                        }
                    });
                });
            }
        })
    })
}

fn cert_params(common_name: &str, serial: u8) -> CertificateParams {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, "Intel Corporation");
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params.serial_number = Some(SerialNumber::from_slice(&[serial]));
    params.not_before = rcgen::date_time_ymd(2018, 5, 21);
    params.not_after = rcgen::date_time_ymd(2049, 12, 31);
    params
}

fn ca_params(common_name: &str, serial: u8) -> CertificateParams {
    let mut params = cert_params(common_name, serial);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    params
}

const INTERMEDIATE_SERIAL: u8 = 2;
const PCK_SERIAL: u8 = 3;
const TCB_SIGNING_SERIAL: u8 = 4;

fn crl(
    issuer: &Certificate,
    issuer_key: &KeyPair,
    revoked: &[u8],
    next_update: OffsetDateTime,
) -> (String, Vec<u8>) {
    let this_update = OffsetDateTime::from_unix_timestamp(CRL_THIS_UPDATE).expect("timestamp");
    let params = CertificateRevocationListParams {
        this_update,
        next_update,
        crl_number: SerialNumber::from_slice(&[1]),
        issuing_distribution_point: None,
        revoked_certs: revoked
            .iter()
            .map(|serial| RevokedCertParams {
                serial_number: SerialNumber::from_slice(&[*serial]),
                revocation_time: this_update,
                reason_code: Some(RevocationReason::KeyCompromise),
                invalidity_date: None,
            })
            .collect(),
        key_identifier_method: KeyIdMethod::Sha256,
    };
    let crl = params.signed_by(issuer, issuer_key).expect("crl to sign");
    (crl.pem().expect("crl pem"), crl.der().to_vec())
}

/// A throwaway Intel-shaped PKI: root CA, PCK processor (or platform) CA, PCK
/// leaf and TCB signing certificate, with one CRL per CA.
pub struct TestPki {
    pub root_pem: String,
    pub intermediate_pem: String,
    pub pck_pem: String,
    pub tcb_signing_pem: String,
    pub root_crl_pem: String,
    pub root_crl_der: Vec<u8>,
    pub intermediate_crl_pem: String,
    pub intermediate_crl_der: Vec<u8>,
    pck_key: KeyPair,
    tcb_signing_key: KeyPair,
}

pub struct TestPkiBuilder<'a> {
    spec: &'a SgxExtensionSpec,
    revoke_pck: bool,
    revoke_intermediate: bool,
    revoke_tcb_signing: bool,
    intermediate_cn: &'static str,
    pck_cn: &'static str,
    pck_not_after: Option<OffsetDateTime>,
    crl_next_update: Option<OffsetDateTime>,
}

impl<'a> TestPkiBuilder<'a> {
    pub fn revoke_pck(mut self) -> Self {
        self.revoke_pck = true;
        self
    }

    pub fn revoke_intermediate(mut self) -> Self {
        self.revoke_intermediate = true;
        self
    }

    pub fn revoke_tcb_signing(mut self) -> Self {
        self.revoke_tcb_signing = true;
        self
    }

    /// Issue the PCK from "Intel SGX PCK Platform CA".
    pub fn platform_ca(mut self) -> Self {
        self.intermediate_cn = "Intel SGX PCK Platform CA";
        self
    }

    pub fn pck_common_name(mut self, cn: &'static str) -> Self {
        self.pck_cn = cn;
        self
    }

    pub fn pck_not_after(mut self, not_after: OffsetDateTime) -> Self {
        self.pck_not_after = Some(not_after);
        self
    }

    pub fn crl_next_update(mut self, next_update: OffsetDateTime) -> Self {
        self.crl_next_update = Some(next_update);
        self
    }

    pub fn build(self) -> TestPki {
        let root_key = KeyPair::generate().expect("root key");
        let root = ca_params("Intel SGX Root CA", 1).self_signed(&root_key).expect("root cert");

        let intermediate_key = KeyPair::generate().expect("intermediate key");
        let intermediate = ca_params(self.intermediate_cn, INTERMEDIATE_SERIAL)
            .signed_by(&intermediate_key, &root, &root_key)
            .expect("intermediate cert");

        let pck_key = KeyPair::generate().expect("pck key");
        let mut pck_params = cert_params(self.pck_cn, PCK_SERIAL);
        pck_params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::ContentCommitment];
        pck_params
            .custom_extensions
            .push(CustomExtension::from_oid_content(&SGX_EXTENSION_ARCS, sgx_extension_der(self.spec)));
        if let Some(not_after) = self.pck_not_after {
            pck_params.not_after = not_after;
        }
        let pck = pck_params
            .signed_by(&pck_key, &intermediate, &intermediate_key)
            .expect("pck cert");

        let tcb_signing_key = KeyPair::generate().expect("tcb signing key");
        let mut tcb_params = cert_params("Intel SGX TCB Signing", TCB_SIGNING_SERIAL);
        tcb_params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::ContentCommitment];
        let tcb_signing = tcb_params
            .signed_by(&tcb_signing_key, &root, &root_key)
            .expect("tcb signing cert");

        let next_update = self
            .crl_next_update
            .unwrap_or_else(|| OffsetDateTime::from_unix_timestamp(CRL_NEXT_UPDATE).expect("timestamp"));

        let mut root_revoked = Vec::new();
        if self.revoke_intermediate {
            root_revoked.push(INTERMEDIATE_SERIAL);
        }
        if self.revoke_tcb_signing {
            root_revoked.push(TCB_SIGNING_SERIAL);
        }
        let (root_crl_pem, root_crl_der) = crl(&root, &root_key, &root_revoked, next_update);

        let pck_revoked = if self.revoke_pck { vec![PCK_SERIAL] } else { Vec::new() };
        let (intermediate_crl_pem, intermediate_crl_der) =
            crl(&intermediate, &intermediate_key, &pck_revoked, next_update);

        TestPki {
            root_pem: root.pem(),
            intermediate_pem: intermediate.pem(),
            pck_pem: pck.pem(),
            tcb_signing_pem: tcb_signing.pem(),
            root_crl_pem,
            root_crl_der,
            intermediate_crl_pem,
            intermediate_crl_der,
            pck_key,
            tcb_signing_key,
        }
    }
}

impl TestPki {
    pub fn new(spec: &SgxExtensionSpec) -> Self {
        Self::builder(spec).build()
    }

    pub fn builder(spec: &SgxExtensionSpec) -> TestPkiBuilder<'_> {
        TestPkiBuilder {
            spec,
            revoke_pck: false,
            revoke_intermediate: false,
            revoke_tcb_signing: false,
            intermediate_cn: "Intel SGX PCK Processor CA",
            pck_cn: "Intel SGX PCK Certificate",
            pck_not_after: None,
            crl_next_update: None,
        }
    }

    pub fn pck_signing_key(&self) -> SigningKey {
        SigningKey::from_pkcs8_der(&self.pck_key.serialize_der()).expect("pck key as p256")
    }

    pub fn tcb_signing_key(&self) -> SigningKey {
        SigningKey::from_pkcs8_der(&self.tcb_signing_key.serialize_der()).expect("tcb signing key as p256")
    }

    pub fn processor_crl(&self) -> PckCrl {
        PckCrl::from_pem_or_der(&self.intermediate_crl_der).expect("intermediate crl")
    }

    /// PCK leaf, intermediate CA and root CA, leaf first.
    pub fn pck_chain_pem(&self) -> String {
        [self.pck_pem.as_str(), &self.intermediate_pem, &self.root_pem].concat()
    }

    /// Intermediate CA and root CA, as carried next to a PCK certificate.
    pub fn pck_signing_chain_pem(&self) -> String {
        [self.intermediate_pem.as_str(), &self.root_pem].concat()
    }

    /// TCB signing certificate and root CA.
    pub fn tcb_chain_pem(&self) -> String {
        [self.tcb_signing_pem.as_str(), &self.root_pem].concat()
    }

    /// `{"<wrapper>": body, "signature": hex}` signed by the TCB signing key.
    pub fn sign_collateral(&self, wrapper: &str, body: &Value) -> String {
        let signature: Signature = self.tcb_signing_key().sign(body.to_string().as_bytes());
        let mut document = serde_json::Map::new();
        document.insert(wrapper.to_string(), body.clone());
        document.insert("signature".to_string(), Value::String(hex::encode(signature.to_bytes())));
        Value::Object(document).to_string()
    }

    pub fn signed_tcb_info(&self, body: &Value) -> String {
        self.sign_collateral("tcbInfo", body)
    }

    pub fn signed_qe_identity(&self, body: &Value) -> String {
        self.sign_collateral("enclaveIdentity", body)
    }
}

pub fn tcb_level(components: [u32; 16], pcesvn: u32, status: &str) -> Value {
    let mut tcb = serde_json::Map::new();
    for (index, svn) in components.iter().enumerate() {
        tcb.insert(format!("sgxtcbcomp{:02}svn", index + 1), json!(svn));
    }
    tcb.insert("pcesvn".to_string(), json!(pcesvn));
    json!({ "tcb": tcb, "tcbDate": "2020-11-11T00:00:00Z", "tcbStatus": status })
}

/// UpToDate at [`UP_TO_DATE_COMPONENTS`], OutOfDate two CPU SVNs below.
pub fn default_tcb_levels() -> Vec<Value> {
    let mut older = UP_TO_DATE_COMPONENTS;
    older[0] = 13;
    older[1] = 13;
    vec![
        tcb_level(UP_TO_DATE_COMPONENTS, UP_TO_DATE_PCESVN, "UpToDate"),
        tcb_level(older, UP_TO_DATE_PCESVN - 1, "OutOfDate"),
    ]
}

/// Version 2 TCB Info body valid from 2020-11-18 to 2020-12-18.
pub fn tcb_info_body(levels: Vec<Value>) -> Value {
    json!({
        "version": 2,
        "issueDate": "2020-11-18T09:21:45Z",
        "nextUpdate": "2020-12-18T09:21:45Z",
        "fmspc": hex::encode_upper(TEST_FMSPC),
        "pceId": "0000",
        "tcbType": 0,
        "tcbEvaluationDataNumber": 8,
        "tcbLevels": levels,
    })
}

/// The `enclaveIdentity` object of `data/qe_identity_v2.json`.
pub fn qe_identity_body() -> Value {
    let document: Value = serde_json::from_str(QE_IDENTITY_V2_JSON).expect("qe identity fixture");
    document["enclaveIdentity"].clone()
}
