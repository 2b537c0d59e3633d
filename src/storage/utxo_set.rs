// UTXO (Unspent Transaction Output) index

use crate::core::serialize::{read_array, read_count, write_varint};
use crate::core::{Block, Hash256, Serializable, Transaction, TxOutput};
use crate::error::{LedgerError, Result};
use crate::storage::{Blockchain, Bucket, WriteTransaction};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};

/// An unspent output together with its position in the creating transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
    pub index: u32,
    pub output: TxOutput,
}

/// Index entry: the still-unspent outputs of one transaction, in output order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnspentOutputs {
    pub outputs: Vec<UnspentOutput>,
}

impl UnspentOutputs {
    /// Every output of `tx`, as indexed right after its block is appended
    pub fn from_transaction(tx: &Transaction) -> Self {
        let outputs = tx
            .outputs
            .iter()
            .enumerate()
            .map(|(index, output)| UnspentOutput {
                index: index as u32,
                output: output.clone(),
            })
            .collect();
        Self { outputs }
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Remove the output at `index`, reporting whether it was present
    pub fn spend(&mut self, index: usize) -> bool {
        let before = self.outputs.len();
        self.outputs.retain(|unspent| unspent.index as usize != index);
        self.outputs.len() != before
    }
}

impl Serializable for UnspentOutputs {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_varint(writer, self.outputs.len() as u64)?;
        for unspent in &self.outputs {
            writer.write_all(&unspent.index.to_le_bytes())?;
            unspent.output.encode(writer)?;
        }
        Ok(())
    }

    fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let count = read_count(reader)?;
        let mut outputs = Vec::with_capacity(count);
        for _ in 0..count {
            let index = u32::from_le_bytes(read_array(reader)?);
            let output = TxOutput::decode(reader)?;
            outputs.push(UnspentOutput { index, output });
        }
        Ok(Self { outputs })
    }
}

/// Outputs chosen to fund a spend, keyed by the transaction holding them
pub type SpendableOutputs = BTreeMap<Hash256, Vec<u32>>;

/// Query-optimized view of the unspent outputs of a chain.
///
/// The index lives in the `utxo` bucket and is derived entirely from the
/// block bucket; `reindex` rebuilds it from scratch.
#[derive(Clone, Copy)]
pub struct UtxoSet<'a> {
    chain: &'a Blockchain,
}

impl<'a> UtxoSet<'a> {
    pub fn new(chain: &'a Blockchain) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &'a Blockchain {
        self.chain
    }

    /// Rebuild the whole index from the chain, replacing its contents atomically.
    /// Returns the number of entries written.
    pub fn reindex(&self) -> Result<usize> {
        let unspent = self.chain.find_unspent_transaction_outputs()?;

        self.chain.store().with_write_transaction(|tx| {
            tx.delete_bucket(Bucket::Utxo);
            for (id, outputs) in &unspent {
                tx.put(Bucket::Utxo, id.as_bytes(), &outputs.serialize());
            }
            Ok(())
        })?;

        log::info!("Reindexed UTXO set: {} transactions with unspent outputs", unspent.len());
        Ok(unspent.len())
    }

    /// Fold a newly appended block into the index in its own write transaction
    pub fn update(&self, block: &Block) -> Result<()> {
        self.chain
            .store()
            .with_write_transaction(|tx| Self::apply_block(tx, block))
    }

    /// Consume the block's inputs and add its outputs within `tx`.
    /// An input spending an output the index does not hold aborts the transaction.
    pub fn apply_block(tx: &mut WriteTransaction<'_>, block: &Block) -> Result<()> {
        for transaction in &block.transactions {
            if !transaction.is_coinbase() {
                for input in &transaction.inputs {
                    let (prev_id, index) = input.outpoint()?;
                    let data = tx.get(Bucket::Utxo, prev_id.as_bytes())?.ok_or_else(|| {
                        LedgerError::Consistency(format!(
                            "transaction {} has no unspent outputs, cannot spend output {}",
                            prev_id, index
                        ))
                    })?;

                    let mut outputs = UnspentOutputs::deserialize(&data)?;
                    if !outputs.spend(index) {
                        return Err(LedgerError::Consistency(format!(
                            "output {} of transaction {} is not unspent",
                            index, prev_id
                        )));
                    }

                    if outputs.is_empty() {
                        tx.delete(Bucket::Utxo, prev_id.as_bytes());
                    } else {
                        tx.put(Bucket::Utxo, prev_id.as_bytes(), &outputs.serialize());
                    }
                }
            }

            if transaction.outputs.is_empty() {
                continue;
            }
            if tx.get(Bucket::Utxo, transaction.id.as_bytes())?.is_some() {
                return Err(LedgerError::Consistency(format!(
                    "transaction {} is already indexed",
                    transaction.id
                )));
            }
            let outputs = UnspentOutputs::from_transaction(transaction);
            tx.put(Bucket::Utxo, transaction.id.as_bytes(), &outputs.serialize());
        }

        Ok(())
    }

    /// Select outputs locked to `key_hash` until `amount` is covered or the index
    /// is exhausted. The caller must treat `accumulated < amount` as insufficient funds.
    pub fn find_spendable_outputs(
        &self,
        key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, SpendableOutputs)> {
        let mut accumulated = 0u64;
        let mut spendable = SpendableOutputs::new();

        self.chain.store().with_read_transaction(|tx| {
            tx.for_each(Bucket::Utxo, |key, value| {
                if accumulated >= amount {
                    return Ok(());
                }
                let outputs = UnspentOutputs::deserialize(value)?;
                for unspent in &outputs.outputs {
                    if accumulated < amount && unspent.output.is_locked_with_key(key_hash) {
                        accumulated = accumulated.saturating_add(unspent.output.value);
                        spendable
                            .entry(Hash256::from_slice(key)?)
                            .or_default()
                            .push(unspent.index);
                    }
                }
                Ok(())
            })
        })?;

        Ok((accumulated, spendable))
    }

    /// Every unspent output locked to `key_hash`
    pub fn find_unspent_outputs(&self, key_hash: &[u8]) -> Result<Vec<TxOutput>> {
        let mut found = Vec::new();

        self.chain.store().with_read_transaction(|tx| {
            tx.for_each(Bucket::Utxo, |_, value| {
                let outputs = UnspentOutputs::deserialize(value)?;
                found.extend(
                    outputs
                        .outputs
                        .into_iter()
                        .filter(|unspent| unspent.output.is_locked_with_key(key_hash))
                        .map(|unspent| unspent.output),
                );
                Ok(())
            })
        })?;

        Ok(found)
    }

    /// Sum of the unspent outputs locked to `key_hash`
    pub fn balance(&self, key_hash: &[u8]) -> Result<u64> {
        Ok(self
            .find_unspent_outputs(key_hash)?
            .iter()
            .map(|output| output.value)
            .sum())
    }

    /// Number of transactions with at least one unspent output
    pub fn count_transactions(&self) -> Result<usize> {
        self.chain.store().len(Bucket::Utxo)
    }

    /// Raw index contents in key order
    pub fn snapshot(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut entries = Vec::new();
        self.chain.store().with_read_transaction(|tx| {
            tx.for_each(Bucket::Utxo, |key, value| {
                entries.push((key.to_vec(), value.to_vec()));
                Ok(())
            })
        })?;
        Ok(entries)
    }
}
