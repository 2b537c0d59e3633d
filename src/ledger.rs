// Ledger - the chain and its UTXO index kept in step

use crate::config::Config;
use crate::core::Block;
use crate::error::Result;
use crate::storage::{Blockchain, LedgerStore, UtxoSet};
use crate::wallet::{KeyPair, TransactionBuilder};

/// Entry point for every ledger operation.
///
/// Blocks appended through a `Ledger` update the UTXO index in the same write
/// transaction, so a failed append leaves both the chain and the index untouched.
pub struct Ledger {
    chain: Blockchain,
}

impl Ledger {
    /// Create a new chain paying the genesis reward to `recipient_key_hash`
    pub fn init(store: LedgerStore, config: &Config, recipient_key_hash: &[u8]) -> Result<Self> {
        let chain = Blockchain::init_with(store, config, recipient_key_hash, UtxoSet::apply_block)?;
        Ok(Self { chain })
    }

    /// Open the chain already in `store`
    pub fn open(store: LedgerStore, config: &Config) -> Result<Self> {
        Ok(Self {
            chain: Blockchain::continue_existing(store, config)?,
        })
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    pub fn utxo_set(&self) -> UtxoSet<'_> {
        UtxoSet::new(&self.chain)
    }

    /// Transfer `amount` from `from` to `to_key_hash` in a newly sealed block
    pub fn send(&mut self, from: &KeyPair, to_key_hash: &[u8], amount: u64) -> Result<Block> {
        let tx = TransactionBuilder::new(self.utxo_set()).build(from, to_key_hash, amount)?;
        self.chain.add_block_with(vec![tx], UtxoSet::apply_block)
    }

    pub fn balance(&self, key_hash: &[u8]) -> Result<u64> {
        self.utxo_set().balance(key_hash)
    }

    /// Rebuild the UTXO index from the chain
    pub fn reindex_utxo(&self) -> Result<usize> {
        self.utxo_set().reindex()
    }

    /// Blocks from tip to genesis, each paired with its proof-of-work validity
    pub fn blocks(&self) -> Result<Vec<(Block, bool)>> {
        let pow = self.chain.proof_of_work();
        self.chain
            .iter()
            .map(|block| {
                block.map(|block| {
                    let valid = pow.validate(&block);
                    (block, valid)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;

    fn test_config() -> Config {
        Config {
            difficulty: 8,
            ..Config::default()
        }
    }

    fn total_issued(ledger: &Ledger) -> u64 {
        ledger
            .chain()
            .iter()
            .flat_map(|block| block.unwrap().transactions)
            .filter(|tx| tx.is_coinbase())
            .map(|tx| tx.total_output_value())
            .sum()
    }

    #[test]
    fn test_genesis_balance() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let ledger = Ledger::init(LedgerStore::temporary().unwrap(), &test_config(), &alice.key_hash()).unwrap();

        assert_eq!(ledger.balance(&alice.key_hash()).unwrap(), 100);
        assert_eq!(ledger.balance(&bob.key_hash()).unwrap(), 0);
    }

    #[test]
    fn test_send_moves_value() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let mut ledger = Ledger::init(LedgerStore::temporary().unwrap(), &test_config(), &alice.key_hash()).unwrap();

        let block = ledger.send(&alice, &bob.key_hash(), 30).unwrap();
        assert_eq!(ledger.chain().tip(), block.hash);

        let alice_balance = ledger.balance(&alice.key_hash()).unwrap();
        let bob_balance = ledger.balance(&bob.key_hash()).unwrap();
        assert_eq!(alice_balance, 70);
        assert_eq!(bob_balance, 30);
        assert_eq!(alice_balance + bob_balance, total_issued(&ledger));
    }

    #[test]
    fn test_insufficient_funds_leaves_ledger_unchanged() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let mut ledger = Ledger::init(LedgerStore::temporary().unwrap(), &test_config(), &alice.key_hash()).unwrap();
        ledger.send(&alice, &bob.key_hash(), 30).unwrap();

        let tip = ledger.chain().tip();
        let snapshot = ledger.utxo_set().snapshot().unwrap();

        let result = ledger.send(&alice, &bob.key_hash(), 1000);
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientFunds { required: 1000, available: 70 })
        ));
        assert_eq!(ledger.chain().tip(), tip);
        assert_eq!(ledger.utxo_set().snapshot().unwrap(), snapshot);
    }

    #[test]
    fn test_value_is_conserved_across_transfers() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let carol = KeyPair::generate();
        let mut ledger = Ledger::init(LedgerStore::temporary().unwrap(), &test_config(), &alice.key_hash()).unwrap();

        ledger.send(&alice, &bob.key_hash(), 40).unwrap();
        ledger.send(&bob, &carol.key_hash(), 15).unwrap();
        ledger.send(&alice, &carol.key_hash(), 60).unwrap();
        ledger.send(&carol, &bob.key_hash(), 75).unwrap();

        let balances: Vec<u64> = [&alice, &bob, &carol]
            .iter()
            .map(|kp| ledger.balance(&kp.key_hash()).unwrap())
            .collect();
        assert_eq!(balances, vec![0, 100, 0]);
        assert_eq!(balances.iter().sum::<u64>(), total_issued(&ledger));
        assert_eq!(ledger.chain().verify_chain().unwrap(), 5);
    }

    #[test]
    fn test_reindex_agrees_with_incremental_index() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let mut ledger = Ledger::init(LedgerStore::temporary().unwrap(), &test_config(), &alice.key_hash()).unwrap();
        ledger.send(&alice, &bob.key_hash(), 25).unwrap();
        ledger.send(&bob, &alice.key_hash(), 5).unwrap();

        let before = ledger.utxo_set().snapshot().unwrap();
        let entries = ledger.reindex_utxo().unwrap();

        assert_eq!(entries, before.len());
        assert_eq!(ledger.utxo_set().snapshot().unwrap(), before);
        assert_eq!(ledger.utxo_set().count_transactions().unwrap(), entries);
    }

    #[test]
    fn test_reopen_keeps_balances() {
        let dir = tempfile::tempdir().unwrap();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        {
            let store = LedgerStore::open(dir.path()).unwrap();
            let mut ledger = Ledger::init(store, &test_config(), &alice.key_hash()).unwrap();
            ledger.send(&alice, &bob.key_hash(), 45).unwrap();
        }

        let ledger = Ledger::open(LedgerStore::open(dir.path()).unwrap(), &test_config()).unwrap();
        assert_eq!(ledger.balance(&alice.key_hash()).unwrap(), 55);
        assert_eq!(ledger.balance(&bob.key_hash()).unwrap(), 45);
    }

    #[test]
    fn test_blocks_report_valid_seals() {
        let alice = KeyPair::generate();
        let mut ledger = Ledger::init(LedgerStore::temporary().unwrap(), &test_config(), &alice.key_hash()).unwrap();
        ledger.send(&alice, &alice.key_hash(), 10).unwrap();

        let blocks = ledger.blocks().unwrap();
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|(_, valid)| *valid));
        assert!(blocks[1].0.is_genesis());
    }
}
