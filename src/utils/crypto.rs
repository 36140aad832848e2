use anyhow::{anyhow, Context};
use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};

/// Parses a P-256 public key given as raw `x || y` coordinates (64 bytes), the way
/// attestation keys are carried inside a quote.
pub fn p256_key_from_raw(raw: &[u8]) -> anyhow::Result<VerifyingKey> {
    if raw.len() != 64 {
        return Err(anyhow!("raw p256 key should be 64 bytes, got {}", raw.len()));
    }
    let mut sec1 = [0u8; 65];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(raw);
    VerifyingKey::from_sec1_bytes(&sec1).context("raw bytes are not a p256 point")
}

/// Parses a SEC1 encoded P-256 public key (uncompressed `04 || x || y` or compressed).
pub fn p256_key_from_sec1(sec1: &[u8]) -> anyhow::Result<VerifyingKey> {
    VerifyingKey::from_sec1_bytes(sec1).context("invalid sec1 p256 key")
}

// verify_p256_signature_bytes verifies a P256 ECDSA signature
// using the provided data, signature, and public key.
// The data is the message that was signed as a byte slice.
// The signature is the signature (in raw form [r][s]) of the data as a byte slice. (64 bytes)
// Returns false for a malformed signature as well as for a mismatching one.
pub fn verify_p256_signature_bytes(data: &[u8], signature: &[u8], public_key: &VerifyingKey) -> bool {
    match Signature::from_slice(signature) {
        Ok(signature) => public_key.verify(data, &signature).is_ok(),
        Err(_) => false,
    }
}
