use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

macro_rules! statuses {
    ($($variant:ident => $name:literal,)+) => {
        /// Outcome of a verification step.
        ///
        /// Discriminants follow the order of the `STATUS_*` codes exposed by the
        /// quote verification library, so `status as u32` is stable across releases.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u32)]
        pub enum Status {
            $($variant,)+
        }

        impl Status {
            pub const ALL: &'static [Status] = &[$(Status::$variant,)+];

            /// The `STATUS_*` name of the code.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Status::$variant => $name,)+
                }
            }
        }

        impl FromStr for Status {
            type Err = UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Status::$variant),)+
                    _ => Err(UnknownStatus(s.to_string())),
                }
            }
        }
    };
}

statuses! {
    Ok => "STATUS_OK",
    UnsupportedCertFormat => "STATUS_UNSUPPORTED_CERT_FORMAT",
    SgxRootCaMissing => "STATUS_SGX_ROOT_CA_MISSING",
    SgxRootCaInvalid => "STATUS_SGX_ROOT_CA_INVALID",
    SgxRootCaInvalidExtensions => "STATUS_SGX_ROOT_CA_INVALID_EXTENSIONS",
    SgxRootCaInvalidIssuer => "STATUS_SGX_ROOT_CA_INVALID_ISSUER",
    SgxRootCaUntrusted => "STATUS_SGX_ROOT_CA_UNTRUSTED",
    SgxIntermediateCaMissing => "STATUS_SGX_INTERMEDIATE_CA_MISSING",
    SgxIntermediateCaInvalid => "STATUS_SGX_INTERMEDIATE_CA_INVALID",
    SgxIntermediateCaInvalidExtensions => "STATUS_SGX_INTERMEDIATE_CA_INVALID_EXTENSIONS",
    SgxIntermediateCaInvalidIssuer => "STATUS_SGX_INTERMEDIATE_CA_INVALID_ISSUER",
    SgxIntermediateCaRevoked => "STATUS_SGX_INTERMEDIATE_CA_REVOKED",
    SgxPckMissing => "STATUS_SGX_PCK_MISSING",
    SgxPckInvalid => "STATUS_SGX_PCK_INVALID",
    SgxPckInvalidExtensions => "STATUS_SGX_PCK_INVALID_EXTENSIONS",
    SgxPckInvalidIssuer => "STATUS_SGX_PCK_INVALID_ISSUER",
    SgxPckRevoked => "STATUS_SGX_PCK_REVOKED",
    TrustedRootCaInvalid => "STATUS_TRUSTED_ROOT_CA_INVALID",
    SgxPckCertChainUntrusted => "STATUS_SGX_PCK_CERT_CHAIN_UNTRUSTED",
    SgxTcbInfoUnsupportedFormat => "STATUS_SGX_TCB_INFO_UNSUPPORTED_FORMAT",
    SgxTcbInfoInvalid => "STATUS_SGX_TCB_INFO_INVALID",
    TcbInfoInvalidSignature => "STATUS_TCB_INFO_INVALID_SIGNATURE",
    SgxTcbSigningCertMissing => "STATUS_SGX_TCB_SIGNING_CERT_MISSING",
    SgxTcbSigningCertInvalid => "STATUS_SGX_TCB_SIGNING_CERT_INVALID",
    SgxTcbSigningCertInvalidExtensions => "STATUS_SGX_TCB_SIGNING_CERT_INVALID_EXTENSIONS",
    SgxTcbSigningCertInvalidIssuer => "STATUS_SGX_TCB_SIGNING_CERT_INVALID_ISSUER",
    SgxTcbSigningCertChainUntrusted => "STATUS_SGX_TCB_SIGNING_CERT_CHAIN_UNTRUSTED",
    SgxTcbSigningCertRevoked => "STATUS_SGX_TCB_SIGNING_CERT_REVOKED",
    SgxCrlUnsupportedFormat => "STATUS_SGX_CRL_UNSUPPORTED_FORMAT",
    SgxCrlUnknownIssuer => "STATUS_SGX_CRL_UNKNOWN_ISSUER",
    SgxCrlInvalid => "STATUS_SGX_CRL_INVALID",
    SgxCrlInvalidExtensions => "STATUS_SGX_CRL_INVALID_EXTENSIONS",
    SgxCrlInvalidSignature => "STATUS_SGX_CRL_INVALID_SIGNATURE",
    SgxCaCertUnsupportedFormat => "STATUS_SGX_CA_CERT_UNSUPPORTED_FORMAT",
    SgxCaCertInvalid => "STATUS_SGX_CA_CERT_INVALID",
    TrustedRootCaUnsupportedFormat => "STATUS_TRUSTED_ROOT_CA_UNSUPPORTED_FORMAT",
    MissingParameters => "STATUS_MISSING_PARAMETERS",
    UnsupportedQuoteFormat => "STATUS_UNSUPPORTED_QUOTE_FORMAT",
    UnsupportedPckCertFormat => "STATUS_UNSUPPORTED_PCK_CERT_FORMAT",
    InvalidPckCert => "STATUS_INVALID_PCK_CERT",
    UnsupportedPckRlFormat => "STATUS_UNSUPPORTED_PCK_RL_FORMAT",
    InvalidPckCrl => "STATUS_INVALID_PCK_CRL",
    UnsupportedTcbInfoFormat => "STATUS_UNSUPPORTED_TCB_INFO_FORMAT",
    PckRevoked => "STATUS_PCK_REVOKED",
    TcbInfoMismatch => "STATUS_TCB_INFO_MISMATCH",
    TcbOutOfDate => "STATUS_TCB_OUT_OF_DATE",
    TcbRevoked => "STATUS_TCB_REVOKED",
    TcbConfigurationNeeded => "STATUS_TCB_CONFIGURATION_NEEDED",
    TcbOutOfDateConfigurationNeeded => "STATUS_TCB_OUT_OF_DATE_CONFIGURATION_NEEDED",
    TcbNotSupported => "STATUS_TCB_NOT_SUPPORTED",
    TcbUnrecognizedStatus => "STATUS_TCB_UNRECOGNIZED_STATUS",
    UnsupportedQeCertification => "STATUS_UNSUPPORTED_QE_CERTIFICATION",
    InvalidQeCertificationDataSize => "STATUS_INVALID_QE_CERTIFICATION_DATA_SIZE",
    UnsupportedQeCertificationDataType => "STATUS_UNSUPPORTED_QE_CERTIFICATION_DATA_TYPE",
    PckCertMismatch => "STATUS_PCK_CERT_MISMATCH",
    InvalidQeReportSignature => "STATUS_INVALID_QE_REPORT_SIGNATURE",
    InvalidQeReportData => "STATUS_INVALID_QE_REPORT_DATA",
    InvalidQuoteSignature => "STATUS_INVALID_QUOTE_SIGNATURE",
    SgxQeIdentityUnsupportedFormat => "STATUS_SGX_QE_IDENTITY_UNSUPPORTED_FORMAT",
    SgxQeIdentityInvalid => "STATUS_SGX_QE_IDENTITY_INVALID",
    SgxQeIdentityInvalidSignature => "STATUS_SGX_QE_IDENTITY_INVALID_SIGNATURE",
    SgxEnclaveReportUnsupportedFormat => "STATUS_SGX_ENCLAVE_REPORT_UNSUPPORTED_FORMAT",
    SgxEnclaveIdentityUnsupportedFormat => "STATUS_SGX_ENCLAVE_IDENTITY_UNSUPPORTED_FORMAT",
    SgxEnclaveIdentityInvalid => "STATUS_SGX_ENCLAVE_IDENTITY_INVALID",
    SgxEnclaveIdentityUnsupportedVersion => "STATUS_SGX_ENCLAVE_IDENTITY_UNSUPPORTED_VERSION",
    SgxEnclaveIdentityOutOfDate => "STATUS_SGX_ENCLAVE_IDENTITY_OUT_OF_DATE",
    SgxEnclaveReportMiscselectMismatch => "STATUS_SGX_ENCLAVE_REPORT_MISCSELECT_MISMATCH",
    SgxEnclaveReportAttributesMismatch => "STATUS_SGX_ENCLAVE_REPORT_ATTRIBUTES_MISMATCH",
    SgxEnclaveReportMrenclaveMismatch => "STATUS_SGX_ENCLAVE_REPORT_MRENCLAVE_MISMATCH",
    SgxEnclaveReportMrsignerMismatch => "STATUS_SGX_ENCLAVE_REPORT_MRSIGNER_MISMATCH",
    SgxEnclaveReportIsvprodidMismatch => "STATUS_SGX_ENCLAVE_REPORT_ISVPRODID_MISMATCH",
    SgxEnclaveReportIsvsvnOutOfDate => "STATUS_SGX_ENCLAVE_REPORT_ISVSVN_OUT_OF_DATE",
    UnsupportedQeIdentityFormat => "STATUS_UNSUPPORTED_QE_IDENTITY_FORMAT",
    QeIdentityOutOfDate => "STATUS_QE_IDENTITY_OUT_OF_DATE",
    QeIdentityMismatch => "STATUS_QE_IDENTITY_MISMATCH",
    SgxTcbInfoExpired => "STATUS_SGX_TCB_INFO_EXPIRED",
    SgxEnclaveIdentityInvalidSignature => "STATUS_SGX_ENCLAVE_IDENTITY_INVALID_SIGNATURE",
    InvalidParameter => "STATUS_INVALID_PARAMETER",
    SgxPckCertChainExpired => "STATUS_SGX_PCK_CERT_CHAIN_EXPIRED",
    SgxCrlExpired => "STATUS_SGX_CRL_EXPIRED",
    SgxSigningCertChainExpired => "STATUS_SGX_SIGNING_CERT_CHAIN_EXPIRED",
    SgxEnclaveIdentityExpired => "STATUS_SGX_ENCLAVE_IDENTITY_EXPIRED",
    TcbSwHardeningNeeded => "STATUS_TCB_SW_HARDENING_NEEDED",
    TcbConfigurationAndSwHardeningNeeded => "STATUS_TCB_CONFIGURATION_AND_SW_HARDENING_NEEDED",
    SgxEnclaveReportIsvsvnRevoked => "STATUS_SGX_ENCLAVE_REPORT_ISVSVN_REVOKED",
}

impl Status {
    pub fn is_ok(&self) -> bool {
        *self == Status::Ok
    }

    pub fn code(&self) -> u32 {
        *self as u32
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status name [{0}]")]
pub struct UnknownStatus(pub String);

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String>::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
