// Error types for the ledger

use crate::consensus::ValidationError;
use crate::core::Hash256;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Corrupted record: {0}")]
    Corruption(String),

    #[error("Ledger store lock poisoned")]
    LockPoisoned,

    #[error("Transaction {0} not found")]
    TransactionNotFound(Hash256),

    #[error("Block {0} not found")]
    BlockNotFound(Hash256),

    #[error("No blockchain found, initialize one first")]
    ChainNotFound,

    #[error("Blockchain already exists")]
    ChainExists,

    #[error("Wallet not found for address {0}")]
    WalletNotFound(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Invalid signature in transaction {0}")]
    InvalidSignature(Hash256),

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Invalid difficulty {0}, expected 1..=256")]
    InvalidDifficulty(u32),

    #[error("Sealing cancelled")]
    SealCancelled,

    #[error("No valid nonce found below {0}")]
    NonceExhausted(u64),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(u64),

    #[error("Block validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] secp256k1::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    /// Wrap a decoding failure of persisted bytes
    pub fn corruption(err: impl std::fmt::Display) -> Self {
        LedgerError::Corruption(err.to_string())
    }
}
