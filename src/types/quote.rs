use zerocopy::{little_endian, AsBytes, FromZeroes};

use crate::constants::{
    ALLOWED_ATTESTATION_KEY_TYPES, ALLOWED_QUOTE_VERSIONS, ALLOWED_TEE_TYPES, ECDSA_PUBKEY_LEN,
    ECDSA_SIGNATURE_LEN, ENCLAVE_REPORT_LEN, HEADER_LEN, INTEL_QE_VENDOR_ID, QE_AUTH_DATA_SIZE_LEN,
    QE_CERT_DATA_SIZE_LEN, QE_CERT_DATA_TYPE_LEN, QUOTE_MIN_LEN, QUOTE_VERSION_3, SGX_TEE_TYPE,
};
use crate::utils::Cursor;

/// Certification data type carrying a PEM encoded PCK certificate chain.
pub const PCK_CERT_CHAIN_CERT_TYPE: u16 = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuoteError {
    #[error("quote is {len} bytes, shorter than the minimum of {min}")]
    TooShort { len: usize, min: usize },
    #[error("unexpected end of quote reading {field} at offset {offset}")]
    UnexpectedEnd { field: &'static str, offset: usize },
    #[error("declared auth data size {declared} does not match the {remaining} remaining bytes")]
    AuthDataSizeMismatch { declared: u32, remaining: usize },
    #[error("declared QE auth data size {declared} at offset {offset} exceeds the {available} available bytes")]
    QeAuthDataSizeMismatch { offset: usize, declared: u16, available: usize },
    #[error("declared QE certification data size {declared} at offset {offset} does not match the {available} remaining bytes")]
    QeCertDataSizeMismatch { offset: usize, declared: u32, available: usize },
}

/// Header of the SGX Quote data structure.
///
/// We use zerocopy for zero-copy parsing of the quote header from raw bytes.
/// All fields have an alignment of one, so the in-memory layout is exactly the
/// 48 byte wire layout and `as_bytes` gives back the signed header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, zerocopy::FromBytes, zerocopy::FromZeroes, zerocopy::AsBytes)]
#[repr(C)]
pub struct QuoteHeader {
    /// Version of the quote data structure.
    /// [2 bytes]
    pub version: little_endian::U16,

    /// Type of attestation key used by the quoting enclave.
    /// 2 (ECDSA-256-with-P-256 curve)
    /// [2 bytes]
    pub attestation_key_type: little_endian::U16,

    /// TEE for this Attestation
    /// 0x0000: SGX
    /// 0x0081: TDX
    /// [2 bytes]
    pub tee_type: little_endian::U16,

    /// [2 bytes]
    pub reserved: little_endian::U16,

    /// Security Version of the Quoting Enclave
    /// [2 bytes]
    pub qe_svn: little_endian::U16,

    /// Security Version of the PCE
    /// [2 bytes]
    pub pce_svn: little_endian::U16,

    /// Unique identifier of the QE Vendor.
    /// Value: 939A7233F79C4CA9940A0DB3957F0607 (Intel® SGX QE Vendor)
    /// [16 bytes]
    pub qe_vendor_id: [u8; 16],

    /// Custom user-defined data. For the Intel® SGX DCAP Quote Generation Libraries,
    /// the first 16 bytes contain a Platform Identifier that is used to link a PCK Certificate to an Enc(PPID).
    /// [20 bytes]
    pub user_data: [u8; 20],
}

/// SGX enclave report, 384 bytes. Used both for the quoted (ISV) enclave and for
/// the quoting enclave's own report inside the auth data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, zerocopy::FromBytes, zerocopy::FromZeroes, zerocopy::AsBytes)]
#[repr(C)]
pub struct EnclaveReport {
    pub cpu_svn: [u8; 16],
    pub misc_select: little_endian::U32,
    pub reserved1: [u8; 28],
    pub attributes: [u8; 16],
    pub mr_enclave: [u8; 32],
    pub reserved2: [u8; 32],
    pub mr_signer: [u8; 32],
    pub reserved3: [u8; 96],
    pub isv_prod_id: little_endian::U16,
    pub isv_svn: little_endian::U16,
    pub reserved4: [u8; 60],
    pub report_data: [u8; 64],
}

impl EnclaveReport {
    /// Raw 384 byte blob, as covered by the QE report signature.
    pub fn to_bytes(&self) -> [u8; ENCLAVE_REPORT_LEN] {
        let mut raw = [0u8; ENCLAVE_REPORT_LEN];
        raw.copy_from_slice(self.as_bytes());
        raw
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QeAuthData {
    pub parsed_data_size: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QeCertData {
    pub cert_type: u16,
    pub parsed_data_size: u32,
    pub data: Vec<u8>,
}

/// ECDSA 256-bit quote signature data structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteAuthData {
    /// Signature over header || enclave report by the attestation key.
    pub ecdsa_signature: [u8; 64],
    /// Attestation public key, raw `x || y`.
    pub ecdsa_attestation_key: [u8; 64],
    pub qe_report: EnclaveReport,
    /// Signature of the QE report by the PCK key.
    pub qe_report_signature: [u8; 64],
    pub qe_auth_data: QeAuthData,
    pub qe_cert_data: QeCertData,
}

/// A parsed SGX ECDSA quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    header: QuoteHeader,
    enclave_report: EnclaveReport,
    auth_data_size: u32,
    auth_data: QuoteAuthData,
    signed_data: Vec<u8>,
}

fn underflow(field: &'static str, cursor: &Cursor) -> QuoteError {
    QuoteError::UnexpectedEnd { field, offset: cursor.position() }
}

impl Quote {
    pub fn parse(bytes: &[u8]) -> Result<Self, QuoteError> {
        if bytes.len() < QUOTE_MIN_LEN {
            return Err(QuoteError::TooShort { len: bytes.len(), min: QUOTE_MIN_LEN });
        }

        let mut cursor = Cursor::new(bytes);
        let header = cursor
            .read::<QuoteHeader>()
            .ok_or_else(|| underflow("header", &cursor))?;

        let is_sgx = header.tee_type.get() == SGX_TEE_TYPE;
        let enclave_report = if is_sgx {
            cursor
                .read::<EnclaveReport>()
                .ok_or_else(|| underflow("enclave report", &cursor))?
        } else {
            EnclaveReport::new_zeroed()
        };

        let auth_data_size = cursor
            .read_u32()
            .ok_or_else(|| underflow("auth data size", &cursor))?;
        if auth_data_size as usize != cursor.remaining() {
            return Err(QuoteError::AuthDataSizeMismatch {
                declared: auth_data_size,
                remaining: cursor.remaining(),
            });
        }

        let auth_data = QuoteAuthData::read(&mut cursor)?;

        // The signed range is only defined for a header followed by an SGX report.
        let signed_data = if is_sgx {
            bytes[..HEADER_LEN + ENCLAVE_REPORT_LEN].to_vec()
        } else {
            Vec::new()
        };

        Ok(Quote {
            header,
            enclave_report,
            auth_data_size,
            auth_data,
            signed_data,
        })
    }

    /// Checks the header against the supported versions, key types, TEE types and QE vendor.
    pub fn validate(&self) -> bool {
        let version = self.header.version.get();
        let tee_type = self.header.tee_type.get();

        ALLOWED_QUOTE_VERSIONS.contains(&version)
            && ALLOWED_ATTESTATION_KEY_TYPES.contains(&self.header.attestation_key_type.get())
            && ALLOWED_TEE_TYPES.contains(&tee_type)
            && self.header.qe_vendor_id == INTEL_QE_VENDOR_ID
            && !(version == QUOTE_VERSION_3 && tee_type != SGX_TEE_TYPE)
    }

    pub fn header(&self) -> &QuoteHeader {
        &self.header
    }

    /// Report of the quoted enclave. All zero for non-SGX quotes.
    pub fn enclave_report(&self) -> &EnclaveReport {
        &self.enclave_report
    }

    pub fn auth_data_size(&self) -> u32 {
        self.auth_data_size
    }

    pub fn auth_data(&self) -> &QuoteAuthData {
        &self.auth_data
    }

    /// Bytes covered by the quote signature: header || enclave report. Empty for non-SGX quotes.
    pub fn signed_data(&self) -> &[u8] {
        &self.signed_data
    }

    pub fn is_sgx(&self) -> bool {
        self.header.tee_type.get() == SGX_TEE_TYPE
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(QUOTE_MIN_LEN + self.auth_data_size as usize);
        out.extend_from_slice(self.header.as_bytes());
        if self.is_sgx() {
            out.extend_from_slice(self.enclave_report.as_bytes());
        }
        out.extend_from_slice(&self.auth_data_size.to_le_bytes());
        out.extend_from_slice(&self.auth_data.to_bytes());
        out
    }
}

impl QuoteAuthData {
    fn read(cursor: &mut Cursor) -> Result<Self, QuoteError> {
        let ecdsa_signature = cursor
            .take_array::<ECDSA_SIGNATURE_LEN>()
            .ok_or_else(|| underflow("quote signature", cursor))?;
        let ecdsa_attestation_key = cursor
            .take_array::<ECDSA_PUBKEY_LEN>()
            .ok_or_else(|| underflow("attestation key", cursor))?;
        let qe_report = cursor
            .read::<EnclaveReport>()
            .ok_or_else(|| underflow("qe report", cursor))?;
        let qe_report_signature = cursor
            .take_array::<ECDSA_SIGNATURE_LEN>()
            .ok_or_else(|| underflow("qe report signature", cursor))?;
        let qe_auth_data = QeAuthData::read(cursor)?;
        let qe_cert_data = QeCertData::read(cursor)?;

        Ok(QuoteAuthData {
            ecdsa_signature,
            ecdsa_attestation_key,
            qe_report,
            qe_report_signature,
            qe_auth_data,
            qe_cert_data,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.ecdsa_signature);
        out.extend_from_slice(&self.ecdsa_attestation_key);
        out.extend_from_slice(self.qe_report.as_bytes());
        out.extend_from_slice(&self.qe_report_signature);
        out.extend_from_slice(&self.qe_auth_data.parsed_data_size.to_le_bytes());
        out.extend_from_slice(&self.qe_auth_data.data);
        out.extend_from_slice(&self.qe_cert_data.cert_type.to_le_bytes());
        out.extend_from_slice(&self.qe_cert_data.parsed_data_size.to_le_bytes());
        out.extend_from_slice(&self.qe_cert_data.data);
        out
    }
}

impl QeAuthData {
    /// On a size mismatch the cursor is left on the size field.
    fn read(cursor: &mut Cursor) -> Result<Self, QuoteError> {
        let offset = cursor.position();
        let declared = cursor
            .peek_u16()
            .ok_or_else(|| underflow("qe auth data size", cursor))?;
        let available = cursor.remaining() - QE_AUTH_DATA_SIZE_LEN;
        if declared as usize > available {
            return Err(QuoteError::QeAuthDataSizeMismatch { offset, declared, available });
        }

        cursor
            .take(QE_AUTH_DATA_SIZE_LEN)
            .ok_or_else(|| underflow("qe auth data size", cursor))?;
        let data = cursor
            .take(declared as usize)
            .ok_or_else(|| underflow("qe auth data", cursor))?;

        Ok(QeAuthData { parsed_data_size: declared, data: data.to_vec() })
    }
}

impl QeCertData {
    /// Certification data closes the quote, so its declared size must match the rest exactly.
    /// On a mismatch the cursor is left on the type field.
    fn read(cursor: &mut Cursor) -> Result<Self, QuoteError> {
        let offset = cursor.position();
        let mut lookahead = cursor.clone();
        let cert_type = lookahead
            .read_u16()
            .ok_or_else(|| underflow("qe cert data type", cursor))?;
        let declared = lookahead
            .read_u32()
            .ok_or_else(|| underflow("qe cert data size", cursor))?;
        let available = lookahead.remaining();
        if declared as usize != available {
            return Err(QuoteError::QeCertDataSizeMismatch { offset, declared, available });
        }

        cursor
            .take(QE_CERT_DATA_TYPE_LEN + QE_CERT_DATA_SIZE_LEN)
            .ok_or_else(|| underflow("qe cert data header", cursor))?;
        let data = cursor
            .take(declared as usize)
            .ok_or_else(|| underflow("qe cert data", cursor))?;

        Ok(QeCertData { cert_type, parsed_data_size: declared, data: data.to_vec() })
    }
}
