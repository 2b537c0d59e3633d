// Hashing utilities

use crate::core::Hash256;
use sha2::{Digest, Sha256};

/// Length of an address checksum
pub const CHECKSUM_LENGTH: usize = 4;

/// Single SHA256 hash
pub fn sha256(data: &[u8]) -> Hash256 {
    let digest = Sha256::digest(data);
    let mut result = [0u8; 32];
    result.copy_from_slice(&digest);
    Hash256::new(result)
}

/// RIPEMD160(SHA256(data)) - the key-hash that locks outputs
pub fn hash160(data: &[u8]) -> [u8; 20] {
    use ripemd::{Digest as RipemdDigest, Ripemd160};
    let sha = Sha256::digest(data);
    let ripemd = Ripemd160::digest(sha);
    let mut result = [0u8; 20];
    result.copy_from_slice(&ripemd);
    result
}

/// First bytes of SHA256(SHA256(payload)), appended to addresses
pub fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LENGTH] {
    let first = Sha256::digest(payload);
    let second = Sha256::digest(first);
    let mut result = [0u8; CHECKSUM_LENGTH];
    result.copy_from_slice(&second[..CHECKSUM_LENGTH]);
    result
}
