use std::time::SystemTime;

use x509_cert::{crl::CertificateList, Certificate};

pub mod cert;
pub mod crypto;
pub mod enclave_identity;
pub mod hash;
pub mod json;
pub mod quotes;
pub mod tcbinfo;

pub trait Expireable {
    fn valid_at(&self, timestamp: SystemTime) -> bool;
}

impl Expireable for CertificateList {
    /// Validate CRL creation/expiration
    fn valid_at(&self, timestamp: SystemTime) -> bool {
        if let Some(na) = self.tbs_cert_list.next_update.map(|t| t.to_system_time()) {
            if na <= timestamp {
                return false;
            }
        }

        // return false if the crl is for the future
        let nb = self.tbs_cert_list.this_update.to_system_time();
        if nb >= timestamp {
            return false;
        }

        true
    }
}

impl Expireable for Certificate {
    /// Validate a single certificate not_before/not_after
    fn valid_at(&self, timestamp: SystemTime) -> bool {
        let nb = self.tbs_certificate.validity.not_before.to_system_time();
        let na = self.tbs_certificate.validity.not_after.to_system_time();
        !(timestamp <= nb || na <= timestamp)
    }
}

impl Expireable for &[Certificate] {
    fn valid_at(&self, timestamp: SystemTime) -> bool {
        self.iter().all(|cert| cert.valid_at(timestamp))
    }
}

impl Expireable for Vec<Certificate> {
    fn valid_at(&self, timestamp: SystemTime) -> bool {
        self.as_slice().valid_at(timestamp)
    }
}

/// Checked reader over a byte slice.
///
/// Every read either takes exactly the requested number of bytes and advances,
/// or returns `None` and leaves the position unchanged.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Removes `len` bytes from the front of the cursor and returns them.
    pub fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.position.checked_add(len)?;
        let front = self.bytes.get(self.position..end)?;
        self.position = end;
        Some(front)
    }

    /// Removes `N` bytes from the front of the cursor and copies them into an owned `[u8; N]`.
    pub fn take_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let mut res = [0u8; N];
        res.copy_from_slice(self.take(N)?);
        Some(res)
    }

    /// Removes `std::mem::size_of<T>()` bytes from the front of the cursor and returns it as a `T`.
    pub fn read<T: zerocopy::FromBytes>(&mut self) -> Option<T> {
        let front = T::read_from_prefix(&self.bytes[self.position..])?;
        self.position += std::mem::size_of::<T>();
        Some(front)
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        self.take_array::<2>().map(u16::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        self.take_array::<4>().map(u32::from_le_bytes)
    }

    /// Reads a little-endian `u16` without advancing.
    pub fn peek_u16(&self) -> Option<u16> {
        self.clone().read_u16()
    }
}
