// Basic types for the ledger

use crate::error::{LedgerError, Result};
use std::fmt;

/// 256-bit digest (32 bytes)
/// Used for block hashes and transaction IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create a Hash256 from a slice, rejecting any other length
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| {
            LedgerError::Corruption(format!(
                "Invalid hash length: expected 32, got {}",
                slice.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str).map_err(LedgerError::corruption)?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash256_from_slice() {
        let hash = Hash256::from_slice(&[7u8; 32]).unwrap();
        assert_eq!(hash.as_bytes(), &[7u8; 32]);

        assert!(Hash256::from_slice(&[7u8; 31]).is_err());
        assert!(Hash256::from_slice(&[]).is_err());
    }

    #[test]
    fn test_hash256_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        bytes[31] = 0x01;
        let hash = Hash256::new(bytes);

        let hex = hash.to_hex();
        assert!(hex.starts_with("ab"));
        assert!(hex.ends_with("01"));
        assert_eq!(Hash256::from_hex(&hex).unwrap(), hash);
    }
}
