// https://github.com/intel/SGXDataCenterAttestationPrimitives/blob/master/QuoteVerification/QVL/Src/AttestationLibrary/src/QuoteVerification/QuoteConstants.h

pub const SGX_TEE_TYPE: u16 = 0x0000;
pub const TDX_TEE_TYPE: u16 = 0x0081;

pub const QUOTE_VERSION_3: u16 = 3;
pub const QUOTE_VERSION_4: u16 = 4;
pub const ALLOWED_QUOTE_VERSIONS: [u16; 2] = [QUOTE_VERSION_3, QUOTE_VERSION_4];

pub const ECDSA_256_WITH_P256_CURVE: u16 = 2;
pub const ALLOWED_ATTESTATION_KEY_TYPES: [u16; 1] = [ECDSA_256_WITH_P256_CURVE];
pub const ALLOWED_TEE_TYPES: [u16; 2] = [SGX_TEE_TYPE, TDX_TEE_TYPE];

pub const INTEL_QE_VENDOR_ID: [u8; 16] = [0x93, 0x9A, 0x72, 0x33, 0xF7, 0x9C, 0x4C, 0xA9, 0x94, 0x0A, 0x0D, 0xB3, 0x95, 0x7F, 0x06, 0x07];

pub const HEADER_LEN: usize = 48;
pub const ENCLAVE_REPORT_LEN: usize = 384;
pub const AUTH_DATA_SIZE_LEN: usize = 4;

pub const ECDSA_SIGNATURE_LEN: usize = 64;
pub const ECDSA_PUBKEY_LEN: usize = 64;
pub const QE_AUTH_DATA_SIZE_LEN: usize = 2;
pub const QE_CERT_DATA_TYPE_LEN: usize = 2;
pub const QE_CERT_DATA_SIZE_LEN: usize = 4;

pub const AUTH_DATA_MIN_LEN: usize = ECDSA_SIGNATURE_LEN
    + ECDSA_PUBKEY_LEN
    + ENCLAVE_REPORT_LEN
    + ECDSA_SIGNATURE_LEN
    + QE_AUTH_DATA_SIZE_LEN
    + QE_CERT_DATA_TYPE_LEN
    + QE_CERT_DATA_SIZE_LEN;

pub const QUOTE_MIN_LEN: usize = HEADER_LEN + ENCLAVE_REPORT_LEN + AUTH_DATA_SIZE_LEN + AUTH_DATA_MIN_LEN;

pub const CPUSVN_LEN: usize = 16;
pub const MISCSELECT_LEN: usize = 4;
pub const ATTRIBUTES_LEN: usize = 16;
pub const MRSIGNER_LEN: usize = 32;
pub const FMSPC_LEN: usize = 6;
pub const PCEID_LEN: usize = 2;

pub const SGX_PCK_CN_PHRASE: &str = "SGX PCK Certificate";
pub const SGX_ROOT_CA_CN_PHRASE: &str = "SGX Root CA";
pub const SGX_INTERMEDIATE_CN_PHRASES: [&str; 2] = ["SGX PCK Processor CA", "SGX PCK Platform CA"];
pub const PCK_CRL_ISSUERS: [&str; 2] = ["Intel SGX PCK Processor CA", "Intel SGX PCK Platform CA"];
pub const SGX_TCB_SIGNING_CN_PHRASE: &str = "SGX TCB Signing";
