// Single-node UTXO ledger with proof-of-work sealing

pub mod cli;
pub mod config;
pub mod consensus;
pub mod core;
pub mod error;
pub mod ledger;
pub mod storage;
pub mod wallet;

// Re-exports for convenience
pub use cli::{Cli, CliHandler, Commands};
pub use config::Config;
pub use consensus::{BlockValidator, ProofOfWork, StopSignal, Target, ValidationError};
pub use crate::core::{Block, Hash256, Transaction, TxInput, TxOutput};
pub use error::{LedgerError, Result};
pub use ledger::Ledger;
pub use storage::{Blockchain, LedgerStore, UtxoSet};
pub use wallet::{Address, KeyPair, TransactionBuilder, Wallets};
