// Key management

use crate::core::{CHECKSUM_LENGTH, checksum, encode_public_key, hash160};
use crate::error::{LedgerError, Result};
use rand::rngs::OsRng;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Version byte prefixed to the key hash before base58check encoding
pub const ADDRESS_VERSION: u8 = 0x00;

const KEY_HASH_LENGTH: usize = 20;

/// Base58check address: version || key hash || checksum
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Encode a key hash as an address
    pub fn from_key_hash(key_hash: &[u8; KEY_HASH_LENGTH]) -> Self {
        let mut payload = Vec::with_capacity(1 + KEY_HASH_LENGTH + CHECKSUM_LENGTH);
        payload.push(ADDRESS_VERSION);
        payload.extend_from_slice(key_hash);
        let check = checksum(&payload);
        payload.extend_from_slice(&check);
        Self(bs58::encode(payload).into_string())
    }

    /// Parse and validate an address string
    pub fn parse(address: &str) -> Result<Self> {
        let address = Self(address.to_string());
        address.key_hash()?;
        Ok(address)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the key hash, checking the version byte and checksum
    pub fn key_hash(&self) -> Result<[u8; KEY_HASH_LENGTH]> {
        let invalid = |reason: &str| LedgerError::InvalidAddress(format!("{}: {}", self.0, reason));

        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|_| invalid("not base58"))?;
        if bytes.len() != 1 + KEY_HASH_LENGTH + CHECKSUM_LENGTH {
            return Err(invalid("wrong length"));
        }

        let (payload, check) = bytes.split_at(1 + KEY_HASH_LENGTH);
        if checksum(payload).as_slice() != check {
            return Err(invalid("checksum mismatch"));
        }
        if payload[0] != ADDRESS_VERSION {
            return Err(invalid("unknown version"));
        }

        let mut key_hash = [0u8; KEY_HASH_LENGTH];
        key_hash.copy_from_slice(&payload[1..]);
        Ok(key_hash)
    }

    pub fn is_valid(address: &str) -> bool {
        Self::parse(address).is_ok()
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key pair
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
    pub address: Address,
}

impl KeyPair {
    /// Generate a new key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self::from_keys(secret_key, public_key)
    }

    fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let secp = Secp256k1::new();
        let secret_key = SecretKey::from_slice(bytes)?;
        let public_key = secret_key.public_key(&secp);
        Ok(Self::from_keys(secret_key, public_key))
    }

    fn from_keys(secret_key: SecretKey, public_key: PublicKey) -> Self {
        let key_hash = hash160(&encode_public_key(&public_key));
        Self {
            secret_key,
            public_key,
            address: Address::from_key_hash(&key_hash),
        }
    }

    /// Public key as stored in transaction inputs (`x || y`)
    pub fn public_key_bytes(&self) -> Vec<u8> {
        encode_public_key(&self.public_key)
    }

    /// RIPEMD160(SHA256(public key)), the value outputs are locked to
    pub fn key_hash(&self) -> [u8; KEY_HASH_LENGTH] {
        hash160(&self.public_key_bytes())
    }
}

/// Persisted form of a key pair
#[derive(Serialize, Deserialize)]
struct StoredKey {
    secret_key: String,
}

#[derive(Serialize, Deserialize, Default)]
struct StoredWallets {
    keys: BTreeMap<Address, StoredKey>,
}

/// Wallets - the key pairs owned by this node, persisted as JSON
#[derive(Default)]
pub struct Wallets {
    keys: BTreeMap<Address, KeyPair>,
}

impl Wallets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the wallet file, or start empty when it does not exist yet
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }

        let json = fs::read_to_string(path)?;
        let stored: StoredWallets = serde_json::from_str(&json)?;

        let mut keys = BTreeMap::new();
        for (address, stored_key) in stored.keys {
            let bytes: [u8; 32] = hex::decode(&stored_key.secret_key)
                .ok()
                .and_then(|bytes| bytes.try_into().ok())
                .ok_or_else(|| LedgerError::Corruption(format!("bad secret key for {}", address)))?;
            let keypair = KeyPair::from_secret_bytes(&bytes)?;
            if keypair.address != address {
                return Err(LedgerError::Corruption(format!(
                    "wallet entry {} does not match its key",
                    address
                )));
            }
            keys.insert(address, keypair);
        }

        log::debug!("Loaded {} wallets from {}", keys.len(), path.display());
        Ok(Self { keys })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let stored = StoredWallets {
            keys: self
                .keys
                .iter()
                .map(|(address, keypair)| {
                    let secret_key = hex::encode(keypair.secret_key.secret_bytes());
                    (address.clone(), StoredKey { secret_key })
                })
                .collect(),
        };

        fs::write(path, serde_json::to_string_pretty(&stored)?)?;
        Ok(())
    }

    /// Generate a key pair and return its address
    pub fn create_wallet(&mut self) -> Address {
        let keypair = KeyPair::generate();
        let address = keypair.address.clone();
        self.keys.insert(address.clone(), keypair);
        log::info!("Created wallet {}", address);
        address
    }

    pub fn get(&self, address: &Address) -> Result<&KeyPair> {
        self.keys
            .get(address)
            .ok_or_else(|| LedgerError::WalletNotFound(address.to_string()))
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.keys.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let kp = KeyPair::generate();

        assert_eq!(kp.public_key_bytes().len(), 64);
        assert_eq!(kp.key_hash(), hash160(&kp.public_key_bytes()));
        assert_eq!(kp.address.key_hash().unwrap(), kp.key_hash());
    }

    #[test]
    fn test_address_round_trip() {
        let hash = [0x12; 20];
        let addr = Address::from_key_hash(&hash);

        assert!(Address::is_valid(addr.as_str()));
        assert_eq!(Address::parse(addr.as_str()).unwrap().key_hash().unwrap(), hash);
    }

    #[test]
    fn test_zero_key_hash_address() {
        // The version byte and the leading zero bytes encode as '1's
        let addr = Address::from_key_hash(&[0; 20]);
        assert!(addr.as_str().starts_with("1111"));
    }

    #[test]
    fn test_invalid_addresses() {
        let addr = Address::from_key_hash(&[0x34; 20]).to_string();

        let mut tampered = addr.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '2' { '3' } else { '2' });

        assert!(!Address::is_valid(&tampered));
        assert!(!Address::is_valid("0OIl"));
        assert!(!Address::is_valid(""));
        assert!(!Address::is_valid(&addr[..addr.len() - 2]));
        assert!(matches!(Address::parse("alice"), Err(LedgerError::InvalidAddress(_))));
    }

    #[test]
    fn test_wallets_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallets.json");

        let mut wallets = Wallets::load_or_default(&path).unwrap();
        assert!(wallets.is_empty());

        let first = wallets.create_wallet();
        let second = wallets.create_wallet();
        wallets.save(&path).unwrap();

        let loaded = Wallets::load_or_default(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(&first).unwrap().key_hash(), wallets.get(&first).unwrap().key_hash());
        assert!(loaded.addresses().contains(&second));
    }

    #[test]
    fn test_unknown_wallet() {
        let wallets = Wallets::new();
        let addr = Address::from_key_hash(&[1; 20]);
        assert!(matches!(wallets.get(&addr), Err(LedgerError::WalletNotFound(_))));
    }
}
