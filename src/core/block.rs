// Block data structures

use crate::core::serialize::{read_array, read_count, read_opt_hash, write_opt_hash, write_varint};
use crate::core::{Hash256, Serializable, Transaction, sha256};
use crate::error::Result;
use std::io::{self, Read, Write};

/// Block - an ordered list of transactions sealed by proof-of-work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Seal hash; also the block's key in the store
    pub hash: Hash256,
    pub transactions: Vec<Transaction>,
    /// Hash of the predecessor; `None` for the genesis block
    pub prev_hash: Option<Hash256>,
    pub nonce: u64,
}

impl Block {
    /// Hash committing to the ordered transaction ids
    pub fn hash_transactions(transactions: &[Transaction]) -> Hash256 {
        let mut ids = Vec::with_capacity(transactions.len() * 32);
        for tx in transactions {
            ids.extend_from_slice(tx.id.as_bytes());
        }
        sha256(&ids)
    }

    pub fn transactions_hash(&self) -> Hash256 {
        Self::hash_transactions(&self.transactions)
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_none()
    }
}

impl Serializable for Block {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.hash.as_bytes())?;

        write_varint(writer, self.transactions.len() as u64)?;
        for tx in &self.transactions {
            tx.encode(writer)?;
        }

        write_opt_hash(writer, self.prev_hash.as_ref())?;
        writer.write_all(&self.nonce.to_le_bytes())
    }

    fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let hash = Hash256::new(read_array(reader)?);

        let tx_count = read_count(reader)?;
        let mut transactions = Vec::with_capacity(tx_count);
        for _ in 0..tx_count {
            transactions.push(Transaction::decode(reader)?);
        }

        let prev_hash = read_opt_hash(reader)?;
        let nonce = u64::from_le_bytes(read_array(reader)?);

        Ok(Self {
            hash,
            transactions,
            prev_hash,
            nonce,
        })
    }
}
