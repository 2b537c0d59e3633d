// Storage layer: bucketed store, block chain and UTXO index

mod blockchain_db;
mod ledger_store;
mod utxo_set;

pub use blockchain_db::{Blockchain, BlockchainIterator, GENESIS_COINBASE_DATA};
pub use ledger_store::{Bucket, LedgerStore, ReadTransaction, WriteTransaction};
pub use utxo_set::{SpendableOutputs, UnspentOutput, UnspentOutputs, UtxoSet};
