// Transaction builder

use crate::core::{Transaction, TxInput, TxOutput};
use crate::error::{LedgerError, Result};
use crate::storage::UtxoSet;
use crate::wallet::KeyPair;

/// Builds signed transfers funded from the UTXO index
pub struct TransactionBuilder<'a> {
    utxo_set: UtxoSet<'a>,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(utxo_set: UtxoSet<'a>) -> Self {
        Self { utxo_set }
    }

    /// Build a transaction moving `amount` from `from` to `to_key_hash`.
    /// Spends just enough outputs to cover `amount` and returns the rest as change.
    pub fn build(&self, from: &KeyPair, to_key_hash: &[u8], amount: u64) -> Result<Transaction> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let sender_key_hash = from.key_hash();
        let (accumulated, spendable) = self
            .utxo_set
            .find_spendable_outputs(&sender_key_hash, amount)?;

        if accumulated < amount {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let public_key = from.public_key_bytes();
        let inputs: Vec<TxInput> = spendable
            .iter()
            .flat_map(|(tx_id, indices)| {
                indices
                    .iter()
                    .map(|index| TxInput::new(*tx_id, *index, public_key.clone()))
            })
            .collect();

        let mut outputs = vec![TxOutput::new(amount, to_key_hash)];
        let change = accumulated - amount;
        if change > 0 {
            outputs.push(TxOutput::new(change, sender_key_hash));
        }

        let mut tx = Transaction::new(inputs, outputs);
        self.utxo_set.chain().sign_transaction(&mut tx, &from.secret_key)?;

        log::debug!(
            "Built transaction {} spending {} inputs ({} change)",
            tx.id,
            tx.inputs.len(),
            change
        );
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::{Blockchain, LedgerStore};

    fn funded_chain(owner: &KeyPair) -> Blockchain {
        let config = Config {
            difficulty: 8,
            ..Config::default()
        };
        Blockchain::init_with(
            LedgerStore::temporary().unwrap(),
            &config,
            &owner.key_hash(),
            UtxoSet::apply_block,
        )
        .unwrap()
    }

    #[test]
    fn test_build_with_change() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let chain = funded_chain(&alice);

        let builder = TransactionBuilder::new(UtxoSet::new(&chain));
        let tx = builder.build(&alice, &bob.key_hash(), 30).unwrap();

        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].value, 30);
        assert!(tx.outputs[0].is_locked_with_key(&bob.key_hash()));
        assert_eq!(tx.outputs[1].value, 70);
        assert!(tx.outputs[1].is_locked_with_key(&alice.key_hash()));
        assert!(chain.verify_transaction(&tx).unwrap());
    }

    #[test]
    fn test_build_exact_amount_has_no_change() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let chain = funded_chain(&alice);

        let tx = TransactionBuilder::new(UtxoSet::new(&chain))
            .build(&alice, &bob.key_hash(), 100)
            .unwrap();

        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.total_output_value(), 100);
    }

    #[test]
    fn test_insufficient_funds() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let chain = funded_chain(&alice);
        let builder = TransactionBuilder::new(UtxoSet::new(&chain));

        assert!(matches!(
            builder.build(&alice, &bob.key_hash(), 101),
            Err(LedgerError::InsufficientFunds { required: 101, available: 100 })
        ));
        assert!(matches!(
            builder.build(&bob, &alice.key_hash(), 1),
            Err(LedgerError::InsufficientFunds { required: 1, available: 0 })
        ));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let alice = KeyPair::generate();
        let chain = funded_chain(&alice);

        assert!(matches!(
            TransactionBuilder::new(UtxoSet::new(&chain)).build(&alice, &alice.key_hash(), 0),
            Err(LedgerError::InvalidAmount(0))
        ));
    }
}
