// Block validation

use crate::consensus::pow::ProofOfWork;
use crate::core::{Block, Hash256, Transaction};

/// Validation error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Recomputed seal differs from the stored hash or misses the target
    InvalidProofOfWork(Hash256),
    /// Block has no transactions
    NoTransactions,
    /// Genesis block must hold exactly one coinbase transaction
    InvalidGenesis,
    /// Coinbase transaction in non-first position
    CoinbaseNotFirst,
    /// Transaction has no inputs or no outputs
    EmptyTransaction(Hash256),
    /// Stored transaction id is not the hash of its content
    TransactionIdMismatch(Hash256),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ValidationError::InvalidProofOfWork(hash) => write!(f, "Invalid proof of work for block {}", hash),
            ValidationError::NoTransactions => write!(f, "Block has no transactions"),
            ValidationError::InvalidGenesis => write!(f, "Genesis block must contain a single coinbase"),
            ValidationError::CoinbaseNotFirst => write!(f, "Coinbase not in first position"),
            ValidationError::EmptyTransaction(id) => write!(f, "Transaction {} has no inputs or outputs", id),
            ValidationError::TransactionIdMismatch(id) => write!(f, "Transaction {} does not match its content", id),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Block validator
pub struct BlockValidator<'a> {
    pow: &'a ProofOfWork,
}

impl<'a> BlockValidator<'a> {
    pub fn new(pow: &'a ProofOfWork) -> Self {
        Self { pow }
    }

    /// Validate a complete block: structure, transaction ids, then proof of work
    pub fn validate_block(&self, block: &Block) -> Result<(), ValidationError> {
        if block.transactions.is_empty() {
            return Err(ValidationError::NoTransactions);
        }

        if block.is_genesis()
            && (block.transactions.len() != 1 || !block.transactions[0].is_coinbase())
        {
            return Err(ValidationError::InvalidGenesis);
        }

        // Only the first transaction may be a coinbase
        if block.transactions.iter().skip(1).any(|tx| tx.is_coinbase()) {
            return Err(ValidationError::CoinbaseNotFirst);
        }

        for tx in &block.transactions {
            self.validate_transaction(tx)?;
        }

        if !self.pow.validate(block) {
            return Err(ValidationError::InvalidProofOfWork(block.hash));
        }

        Ok(())
    }

    /// Structural checks that need no chain lookups
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<(), ValidationError> {
        if tx.inputs.is_empty() || tx.outputs.is_empty() {
            return Err(ValidationError::EmptyTransaction(tx.id));
        }

        if tx.hash() != tx.id {
            return Err(ValidationError::TransactionIdMismatch(tx.id));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TxInput, TxOutput};

    fn seal(pow: &ProofOfWork, prev_hash: Option<Hash256>, transactions: Vec<Transaction>) -> Block {
        let seal = pow.seal(prev_hash.as_ref(), &transactions).unwrap();
        Block {
            hash: seal.hash,
            transactions,
            prev_hash,
            nonce: seal.nonce,
        }
    }

    fn spend() -> Transaction {
        Transaction::new(
            vec![TxInput::new(Hash256::new([1; 32]), 0, vec![2; 64])],
            vec![TxOutput::new(10, vec![3; 20])],
        )
    }

    #[test]
    fn test_validate_genesis_block() {
        let pow = ProofOfWork::new(8, u64::MAX).unwrap();
        let genesis = seal(&pow, None, vec![Transaction::coinbase(&[1; 20], "", 100)]);

        assert_eq!(BlockValidator::new(&pow).validate_block(&genesis), Ok(()));
    }

    #[test]
    fn test_genesis_without_coinbase() {
        let pow = ProofOfWork::new(8, u64::MAX).unwrap();
        let genesis = seal(&pow, None, vec![spend()]);

        assert_eq!(
            BlockValidator::new(&pow).validate_block(&genesis),
            Err(ValidationError::InvalidGenesis)
        );
    }

    #[test]
    fn test_no_transactions() {
        let pow = ProofOfWork::new(8, u64::MAX).unwrap();
        let block = seal(&pow, Some(Hash256::new([1; 32])), vec![]);

        assert_eq!(
            BlockValidator::new(&pow).validate_block(&block),
            Err(ValidationError::NoTransactions)
        );
    }

    #[test]
    fn test_coinbase_not_first() {
        let pow = ProofOfWork::new(8, u64::MAX).unwrap();
        let block = seal(
            &pow,
            Some(Hash256::new([1; 32])),
            vec![spend(), Transaction::coinbase(&[1; 20], "", 100)],
        );

        assert_eq!(
            BlockValidator::new(&pow).validate_block(&block),
            Err(ValidationError::CoinbaseNotFirst)
        );
    }

    #[test]
    fn test_tampered_transaction_id() {
        let pow = ProofOfWork::new(8, u64::MAX).unwrap();
        let mut block = seal(&pow, Some(Hash256::new([1; 32])), vec![spend()]);
        block.transactions[0].outputs[0].value = 11;

        let id = block.transactions[0].id;
        assert_eq!(
            BlockValidator::new(&pow).validate_block(&block),
            Err(ValidationError::TransactionIdMismatch(id))
        );
    }

    #[test]
    fn test_invalid_proof_of_work() {
        let pow = ProofOfWork::new(8, u64::MAX).unwrap();
        let mut block = seal(&pow, Some(Hash256::new([1; 32])), vec![spend()]);
        block.nonce += 1;

        assert_eq!(
            BlockValidator::new(&pow).validate_block(&block),
            Err(ValidationError::InvalidProofOfWork(block.hash))
        );
    }
}
