// Append-only chain of sealed blocks on top of the ledger store

use crate::config::Config;
use crate::consensus::{BlockValidator, ProofOfWork, StopSignal, ValidationError};
use crate::core::{Block, Hash256, PrevTransactions, Serializable, Transaction};
use crate::error::{LedgerError, Result};
use crate::storage::utxo_set::UnspentOutputs;
use crate::storage::{Bucket, LedgerStore, WriteTransaction};
use secp256k1::SecretKey;
use std::collections::{HashMap, HashSet};

/// Key in the blocks bucket holding the tip hash
const LAST_HASH_KEY: &[u8] = b"last hash";

/// Key in the blocks bucket holding the difficulty every block was sealed with
const DIFFICULTY_KEY: &[u8] = b"difficulty";

/// Coinbase data of the genesis transaction
pub const GENESIS_COINBASE_DATA: &str = "First Transaction from Genesis";

fn read_tip(stored: Option<Vec<u8>>) -> Result<Option<Hash256>> {
    stored.map(|bytes| Hash256::from_slice(&bytes)).transpose()
}

fn read_difficulty(stored: Option<Vec<u8>>) -> Result<Option<u32>> {
    stored
        .map(|bytes| {
            <[u8; 4]>::try_from(bytes.as_slice())
                .map(u32::from_be_bytes)
                .map_err(LedgerError::corruption)
        })
        .transpose()
}

/// Blockchain - the sealed blocks and a pointer to the newest one
pub struct Blockchain {
    store: LedgerStore,
    tip: Hash256,
    pow: ProofOfWork,
}

impl Blockchain {
    /// Create a chain whose genesis pays the coinbase reward to `coinbase_key_hash`
    pub fn init(store: LedgerStore, config: &Config, coinbase_key_hash: &[u8]) -> Result<Self> {
        Self::init_with(store, config, coinbase_key_hash, |_, _| Ok(()))
    }

    /// Like `init`, running `on_commit` inside the transaction that persists genesis
    pub fn init_with<F>(
        store: LedgerStore,
        config: &Config,
        coinbase_key_hash: &[u8],
        on_commit: F,
    ) -> Result<Self>
    where
        F: FnOnce(&mut WriteTransaction<'_>, &Block) -> Result<()>,
    {
        let existing = store.with_read_transaction(|tx| tx.get(Bucket::Blocks, LAST_HASH_KEY))?;
        if existing.is_some() {
            return Err(LedgerError::ChainExists);
        }

        let pow = config.proof_of_work()?;
        let coinbase = Transaction::coinbase(
            coinbase_key_hash,
            GENESIS_COINBASE_DATA,
            config.coinbase_reward,
        );
        let genesis = Self::seal_block(&pow, None, vec![coinbase])?;

        store.with_write_transaction(|tx| {
            if tx.get(Bucket::Blocks, LAST_HASH_KEY)?.is_some() {
                return Err(LedgerError::ChainExists);
            }
            tx.put(Bucket::Blocks, DIFFICULTY_KEY, &pow.difficulty().to_be_bytes());
            Self::persist_block(tx, &genesis);
            on_commit(tx, &genesis)
        })?;

        log::info!("Created genesis block {}", genesis.hash);

        Ok(Self {
            store,
            tip: genesis.hash,
            pow,
        })
    }

    /// Open the chain already persisted in `store`.
    /// Blocks are validated and sealed at the difficulty recorded by `init`,
    /// whatever `config` asks for.
    pub fn continue_existing(store: LedgerStore, config: &Config) -> Result<Self> {
        let (tip, stored_difficulty) = store.with_read_transaction(|tx| {
            let tip = read_tip(tx.get(Bucket::Blocks, LAST_HASH_KEY)?)?;
            let difficulty = read_difficulty(tx.get(Bucket::Blocks, DIFFICULTY_KEY)?)?;
            Ok((tip, difficulty))
        })?;
        let tip = tip.ok_or(LedgerError::ChainNotFound)?;

        let difficulty = match stored_difficulty {
            Some(stored) if stored != config.difficulty => {
                log::warn!(
                    "Configured difficulty {} ignored, chain was sealed at {}",
                    config.difficulty,
                    stored
                );
                stored
            }
            Some(stored) => stored,
            None => config.difficulty,
        };

        log::info!("Loaded blockchain with tip {} (difficulty {})", tip, difficulty);

        Ok(Self {
            store,
            tip,
            pow: ProofOfWork::new(difficulty, config.max_nonce)?,
        })
    }

    pub fn tip(&self) -> Hash256 {
        self.tip
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn proof_of_work(&self) -> &ProofOfWork {
        &self.pow
    }

    /// Signal that aborts a seal in progress
    pub fn stop_signal(&self) -> StopSignal {
        self.pow.stop_signal()
    }

    fn seal_block(
        pow: &ProofOfWork,
        prev_hash: Option<Hash256>,
        transactions: Vec<Transaction>,
    ) -> Result<Block> {
        let seal = pow.seal(prev_hash.as_ref(), &transactions)?;
        log::debug!(
            "Sealed block {} after {} attempts ({:.1} KH/s)",
            seal.hash,
            seal.attempts,
            seal.hash_rate() / 1000.0
        );

        Ok(Block {
            hash: seal.hash,
            transactions,
            prev_hash,
            nonce: seal.nonce,
        })
    }

    fn persist_block(tx: &mut WriteTransaction<'_>, block: &Block) {
        tx.put(Bucket::Blocks, block.hash.as_bytes(), &block.serialize());
        tx.put(Bucket::Blocks, LAST_HASH_KEY, block.hash.as_bytes());
    }

    /// Verify, seal and append a block holding `transactions`
    pub fn add_block(&mut self, transactions: Vec<Transaction>) -> Result<Block> {
        self.add_block_with(transactions, |_, _| Ok(()))
    }

    /// Like `add_block`, running `on_commit` inside the transaction that appends the block.
    /// Nothing is persisted when either the append or `on_commit` fails.
    pub fn add_block_with<F>(&mut self, transactions: Vec<Transaction>, on_commit: F) -> Result<Block>
    where
        F: FnOnce(&mut WriteTransaction<'_>, &Block) -> Result<()>,
    {
        if transactions.is_empty() {
            return Err(ValidationError::NoTransactions.into());
        }
        if transactions.iter().skip(1).any(|tx| tx.is_coinbase()) {
            return Err(ValidationError::CoinbaseNotFirst.into());
        }

        let validator = BlockValidator::new(&self.pow);
        for tx in &transactions {
            validator.validate_transaction(tx)?;
            if !self.verify_transaction(tx)? {
                log::warn!("Rejected transaction {} with an invalid signature", tx.id);
                return Err(LedgerError::InvalidSignature(tx.id));
            }
        }

        let block = Self::seal_block(&self.pow, Some(self.tip), transactions)?;
        let expected_tip = self.tip;

        self.store.with_write_transaction(|tx| {
            let stored_tip = read_tip(tx.get(Bucket::Blocks, LAST_HASH_KEY)?)?;
            if stored_tip != Some(expected_tip) {
                return Err(LedgerError::Consistency(format!(
                    "stored tip moved away from {} while sealing",
                    expected_tip
                )));
            }
            Self::persist_block(tx, &block);
            on_commit(tx, &block)
        })?;

        self.tip = block.hash;
        log::info!(
            "Appended block {} with {} transactions",
            block.hash,
            block.transactions.len()
        );

        Ok(block)
    }

    /// Walk the chain from the tip back to genesis
    pub fn iter(&self) -> BlockchainIterator<'_> {
        BlockchainIterator {
            store: &self.store,
            next_hash: Some(self.tip),
        }
    }

    pub fn get_block(&self, hash: &Hash256) -> Result<Block> {
        load_block(&self.store, hash)
    }

    /// Find a transaction anywhere in the chain by id
    pub fn find_transaction(&self, id: &Hash256) -> Result<Transaction> {
        for block in self.iter() {
            if let Some(tx) = block?.transactions.into_iter().find(|tx| tx.id == *id) {
                return Ok(tx);
            }
        }
        Err(LedgerError::TransactionNotFound(*id))
    }

    /// Every output not referenced by any input in the chain, grouped by transaction
    pub fn find_unspent_transaction_outputs(&self) -> Result<HashMap<Hash256, UnspentOutputs>> {
        let mut created: HashMap<Hash256, UnspentOutputs> = HashMap::new();
        let mut spent: HashSet<(Hash256, usize)> = HashSet::new();

        for block in self.iter() {
            for tx in block?.transactions {
                if !tx.is_coinbase() {
                    for input in &tx.inputs {
                        spent.insert(input.outpoint()?);
                    }
                }
                created.insert(tx.id, UnspentOutputs::from_transaction(&tx));
            }
        }

        created.retain(|id, outputs| {
            outputs
                .outputs
                .retain(|unspent| !spent.contains(&(*id, unspent.index as usize)));
            !outputs.is_empty()
        });

        Ok(created)
    }

    fn prev_transactions(&self, tx: &Transaction) -> Result<PrevTransactions> {
        let mut prev_txs = PrevTransactions::new();
        if tx.is_coinbase() {
            return Ok(prev_txs);
        }

        for input in &tx.inputs {
            let (prev_id, _) = input.outpoint()?;
            if !prev_txs.contains_key(&prev_id) {
                prev_txs.insert(prev_id, self.find_transaction(&prev_id)?);
            }
        }
        Ok(prev_txs)
    }

    /// Sign `tx` with the outputs it spends resolved from the chain
    pub fn sign_transaction(&self, tx: &mut Transaction, secret_key: &SecretKey) -> Result<()> {
        let prev_txs = self.prev_transactions(tx)?;
        tx.sign(secret_key, &prev_txs)
    }

    /// Check every input signature of `tx` against the chain. Coinbase is always valid.
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        let prev_txs = self.prev_transactions(tx)?;
        tx.verify(&prev_txs)
    }

    /// Validate every block from tip to genesis: seal, structure, links and signatures.
    /// Returns the number of blocks checked.
    pub fn verify_chain(&self) -> Result<usize> {
        let validator = BlockValidator::new(&self.pow);
        let mut checked = 0;

        for block in self.iter() {
            let block = block?;
            validator.validate_block(&block)?;

            for tx in block.transactions.iter().filter(|tx| !tx.is_coinbase()) {
                if !self.verify_transaction(tx)? {
                    return Err(LedgerError::InvalidSignature(tx.id));
                }
            }
            checked += 1;
        }

        log::debug!("Verified {} blocks", checked);
        Ok(checked)
    }
}

fn load_block(store: &LedgerStore, hash: &Hash256) -> Result<Block> {
    let data = store
        .with_read_transaction(|tx| tx.get(Bucket::Blocks, hash.as_bytes()))?
        .ok_or(LedgerError::BlockNotFound(*hash))?;
    let block = Block::deserialize(&data)?;

    if block.hash != *hash {
        return Err(LedgerError::Corruption(format!(
            "block stored under {} claims hash {}",
            hash, block.hash
        )));
    }
    Ok(block)
}

/// Reverse iterator: tip first, genesis last.
/// Stops after genesis or after yielding the first error.
pub struct BlockchainIterator<'a> {
    store: &'a LedgerStore,
    next_hash: Option<Hash256>,
}

impl Iterator for BlockchainIterator<'_> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.next_hash.take()?;
        match load_block(self.store, &hash) {
            Ok(block) => {
                self.next_hash = block.prev_hash;
                Some(Ok(block))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
