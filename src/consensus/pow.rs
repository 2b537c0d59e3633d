// Proof of Work sealing

use crate::core::{Block, Hash256, Transaction, sha256};
use crate::error::{LedgerError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Reference difficulty: the hash must have 12 leading zero bits
pub const DEFAULT_DIFFICULTY: u32 = 12;

/// Nonces tried between two looks at the stop signal
const STOP_CHECK_INTERVAL: u64 = 1024;

/// Difficulty target: `1 << (256 - difficulty)` as a big-endian 256-bit integer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    difficulty: u32,
    threshold: [u8; 32],
}

impl Target {
    /// Build the target for `difficulty` leading zero bits (1..=256)
    pub fn from_difficulty(difficulty: u32) -> Result<Self> {
        if difficulty == 0 || difficulty > 256 {
            return Err(LedgerError::InvalidDifficulty(difficulty));
        }

        let bit = (256 - difficulty) as usize;
        let mut threshold = [0u8; 32];
        threshold[31 - bit / 8] = 1 << (bit % 8);

        Ok(Self {
            difficulty,
            threshold,
        })
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn to_hash256(&self) -> Hash256 {
        Hash256::new(self.threshold)
    }

    /// Check if a hash meets this target (hash < target)
    #[inline]
    pub fn is_met_by(&self, hash: &Hash256) -> bool {
        // Byte arrays compare lexicographically, i.e. as big-endian integers
        hash.as_bytes() < &self.threshold
    }
}

/// Cooperative cancellation flag shared between the sealer and its caller
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Result of a successful seal
#[derive(Debug, Clone)]
pub struct Seal {
    pub nonce: u64,
    pub hash: Hash256,
    pub attempts: u64,
    pub duration: Duration,
}

impl Seal {
    /// Hashes per second
    pub fn hash_rate(&self) -> f64 {
        self.attempts as f64 / self.duration.as_secs_f64().max(f64::EPSILON)
    }
}

/// Proof-of-work sealer
#[derive(Debug, Clone)]
pub struct ProofOfWork {
    target: Target,
    /// Highest nonce tried before giving up
    max_nonce: u64,
    stop: StopSignal,
}

impl ProofOfWork {
    pub fn new(difficulty: u32, max_nonce: u64) -> Result<Self> {
        Ok(Self {
            target: Target::from_difficulty(difficulty)?,
            max_nonce,
            stop: StopSignal::new(),
        })
    }

    /// Share an externally owned stop signal with this sealer
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn difficulty(&self) -> u32 {
        self.target.difficulty()
    }

    /// prev_hash || transactions hash || nonce (BE u64) || difficulty (BE u64)
    pub fn pre_image(&self, prev_hash: Option<&Hash256>, tx_hash: &Hash256, nonce: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(32 + 32 + 8 + 8);
        if let Some(prev_hash) = prev_hash {
            data.extend_from_slice(prev_hash.as_bytes());
        }
        data.extend_from_slice(tx_hash.as_bytes());
        data.extend_from_slice(&nonce.to_be_bytes());
        data.extend_from_slice(&u64::from(self.target.difficulty()).to_be_bytes());
        data
    }

    pub fn seal_hash(&self, prev_hash: Option<&Hash256>, tx_hash: &Hash256, nonce: u64) -> Hash256 {
        sha256(&self.pre_image(prev_hash, tx_hash, nonce))
    }

    /// Search nonces from 0 upward until the seal hash is below target.
    /// Fails with `NonceExhausted` past `max_nonce` and `SealCancelled` once stopped.
    pub fn seal(&self, prev_hash: Option<&Hash256>, transactions: &[Transaction]) -> Result<Seal> {
        let start_time = Instant::now();
        let tx_hash = Block::hash_transactions(transactions);

        for nonce in 0..=self.max_nonce {
            if nonce % STOP_CHECK_INTERVAL == 0 && self.stop.is_stopped() {
                log::debug!("Sealing stopped after {} attempts", nonce);
                return Err(LedgerError::SealCancelled);
            }

            let hash = self.seal_hash(prev_hash, &tx_hash, nonce);
            if self.target.is_met_by(&hash) {
                return Ok(Seal {
                    nonce,
                    hash,
                    attempts: nonce + 1,
                    duration: start_time.elapsed(),
                });
            }

            if nonce > 0 && nonce % 100_000 == 0 {
                let elapsed = start_time.elapsed();
                log::debug!(
                    "Sealing attempts: {} ({:.1} KH/s)",
                    nonce,
                    nonce as f64 / elapsed.as_secs_f64() / 1000.0
                );
            }
        }

        Err(LedgerError::NonceExhausted(self.max_nonce))
    }

    /// Recompute the seal from the block's own nonce and transactions.
    /// Valid when it matches the stored hash and is below target.
    pub fn validate(&self, block: &Block) -> bool {
        let hash = self.seal_hash(block.prev_hash.as_ref(), &block.transactions_hash(), block.nonce);
        hash == block.hash && self.target.is_met_by(&hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed_block(pow: &ProofOfWork) -> Block {
        let transactions = vec![Transaction::coinbase(&[7u8; 20], "", 100)];
        let prev_hash = Some(Hash256::new([3; 32]));
        let seal = pow.seal(prev_hash.as_ref(), &transactions).unwrap();
        Block {
            hash: seal.hash,
            transactions,
            prev_hash,
            nonce: seal.nonce,
        }
    }

    #[test]
    fn test_target_threshold() {
        let target = Target::from_difficulty(12).unwrap();
        let threshold = target.to_hash256();
        assert_eq!(threshold.as_bytes()[0], 0x00);
        assert_eq!(threshold.as_bytes()[1], 0x10);
        assert!(threshold.as_bytes()[2..].iter().all(|b| *b == 0));

        let one = Target::from_difficulty(1).unwrap();
        assert_eq!(one.to_hash256().as_bytes()[0], 0x80);

        let max = Target::from_difficulty(256).unwrap();
        assert_eq!(max.to_hash256().as_bytes()[31], 0x01);
    }

    #[test]
    fn test_target_rejects_out_of_range() {
        assert!(matches!(Target::from_difficulty(0), Err(LedgerError::InvalidDifficulty(0))));
        assert!(matches!(Target::from_difficulty(257), Err(LedgerError::InvalidDifficulty(257))));
    }

    #[test]
    fn test_target_comparison_is_strict() {
        let target = Target::from_difficulty(8).unwrap();
        assert!(target.is_met_by(&Hash256::default()));
        assert!(!target.is_met_by(&target.to_hash256()));

        let mut just_below = [0xffu8; 32];
        just_below[0] = 0x00;
        assert!(target.is_met_by(&Hash256::new(just_below)));

        let mut above = [0u8; 32];
        above[0] = 0x01;
        assert!(!target.is_met_by(&Hash256::new(above)));
    }

    #[test]
    fn test_seal_and_validate() {
        let pow = ProofOfWork::new(8, u64::MAX).unwrap();
        let block = sealed_block(&pow);

        assert!(pow.validate(&block));
        assert!(pow.target().is_met_by(&block.hash));
    }

    #[test]
    fn test_seal_is_deterministic() {
        let pow = ProofOfWork::new(8, u64::MAX).unwrap();
        let first = sealed_block(&pow);
        let second = sealed_block(&pow);

        assert_eq!(first.nonce, second.nonce);
        assert_eq!(first.hash, second.hash);
    }

    #[test]
    fn test_perturbed_nonce_fails_validation() {
        let pow = ProofOfWork::new(8, u64::MAX).unwrap();
        let mut block = sealed_block(&pow);
        block.nonce += 1;
        assert!(!pow.validate(&block));
    }

    #[test]
    fn test_perturbed_transactions_fail_validation() {
        let pow = ProofOfWork::new(8, u64::MAX).unwrap();
        let mut block = sealed_block(&pow);
        block.transactions[0].outputs[0].value += 1;
        block.transactions[0].id = block.transactions[0].hash();
        assert!(!pow.validate(&block));
    }

    #[test]
    fn test_difficulty_is_part_of_pre_image() {
        let easy = ProofOfWork::new(8, u64::MAX).unwrap();
        let hard = ProofOfWork::new(9, u64::MAX).unwrap();
        let tx_hash = Hash256::new([1; 32]);

        assert_ne!(easy.seal_hash(None, &tx_hash, 0), hard.seal_hash(None, &tx_hash, 0));
        assert_eq!(easy.pre_image(None, &tx_hash, 0).len(), 48);
        assert_eq!(easy.pre_image(Some(&tx_hash), &tx_hash, 0).len(), 80);
    }

    #[test]
    fn test_nonce_cap() {
        let pow = ProofOfWork::new(256, 10).unwrap();
        let result = pow.seal(None, &[]);
        assert!(matches!(result, Err(LedgerError::NonceExhausted(10))));
    }

    #[test]
    fn test_stop_signal_cancels_sealing() {
        let stop = StopSignal::new();
        let pow = ProofOfWork::new(256, u64::MAX).unwrap().with_stop_signal(stop.clone());
        stop.stop();

        assert!(matches!(pow.seal(None, &[]), Err(LedgerError::SealCancelled)));

        stop.reset();
        assert!(!pow.stop_signal().is_stopped());
    }
}
