// Transactional key-value adapter over sled

use crate::error::{LedgerError, Result};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Db, Transactional, Tree};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Logical buckets of the ledger, each backed by its own sled tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    /// Block hash -> serialized block, plus the tip sentinel
    Blocks,
    /// Transaction id -> serialized unspent outputs
    Utxo,
}

impl Bucket {
    pub fn name(&self) -> &'static str {
        match self {
            Bucket::Blocks => "blocks",
            Bucket::Utxo => "utxo",
        }
    }
}

/// Handle to the ledger database.
///
/// Every `Bucket` is created when the store is opened, so transactions never
/// create buckets themselves; `WriteTransaction::delete_bucket` empties one.
///
/// Writers are serialized against each other and against readers through a
/// single-writer/multiple-reader lock; a write transaction stages its changes
/// and applies them across all buckets in one atomic sled transaction.
#[derive(Clone)]
pub struct LedgerStore {
    db: Db,
    blocks: Tree,
    utxo: Tree,
    lock: Arc<RwLock<()>>,
}

impl LedgerStore {
    /// Open (or create) the store at `path`; both buckets are created on open
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create an in-memory store (for testing)
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        let blocks = db.open_tree(Bucket::Blocks.name())?;
        let utxo = db.open_tree(Bucket::Utxo.name())?;
        Ok(Self {
            db,
            blocks,
            utxo,
            lock: Arc::new(RwLock::new(())),
        })
    }

    fn tree(&self, bucket: Bucket) -> &Tree {
        match bucket {
            Bucket::Blocks => &self.blocks,
            Bucket::Utxo => &self.utxo,
        }
    }

    /// Run `f` inside a read-only transaction
    pub fn with_read_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&ReadTransaction<'_>) -> Result<T>,
    {
        let guard = self.lock.read().map_err(|_| LedgerError::LockPoisoned)?;
        let tx = ReadTransaction {
            store: self,
            _guard: guard,
        };
        f(&tx)
    }

    /// Run `f` inside a write transaction: committed when `f` returns `Ok`,
    /// discarded when it returns an error
    pub fn with_write_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut WriteTransaction<'_>) -> Result<T>,
    {
        let guard = self.lock.write().map_err(|_| LedgerError::LockPoisoned)?;
        let mut tx = WriteTransaction {
            store: self,
            staged: BTreeMap::new(),
            cleared: BTreeSet::new(),
            _guard: guard,
        };

        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                log::warn!("Write transaction rolled back: {}", e);
                Err(e)
            }
        }
    }

    /// Number of keys in a bucket
    pub fn len(&self, bucket: Bucket) -> Result<usize> {
        let _guard = self.lock.read().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(self.tree(bucket).len())
    }
}

fn pick_tree<'t>(
    bucket: Bucket,
    blocks: &'t TransactionalTree,
    utxo: &'t TransactionalTree,
) -> &'t TransactionalTree {
    match bucket {
        Bucket::Blocks => blocks,
        Bucket::Utxo => utxo,
    }
}

fn get_from(tree: &Tree, key: &[u8]) -> Result<Option<Vec<u8>>> {
    Ok(tree.get(key)?.map(|value| value.to_vec()))
}

fn for_each_in<F>(tree: &Tree, mut f: F) -> Result<()>
where
    F: FnMut(&[u8], &[u8]) -> Result<()>,
{
    for item in tree.iter() {
        let (key, value) = item?;
        f(&key, &value)?;
    }
    Ok(())
}

/// Read-only view of the store; holds the shared lock until dropped
pub struct ReadTransaction<'a> {
    store: &'a LedgerStore,
    _guard: RwLockReadGuard<'a, ()>,
}

impl ReadTransaction<'_> {
    pub fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>> {
        get_from(self.store.tree(bucket), key)
    }

    /// Visit every entry of `bucket` in key order
    pub fn for_each<F>(&self, bucket: Bucket, f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        for_each_in(self.store.tree(bucket), f)
    }
}

/// Staged writes; reads see the staged state layered over the committed one
pub struct WriteTransaction<'a> {
    store: &'a LedgerStore,
    /// `None` marks a deletion
    staged: BTreeMap<Bucket, BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
    /// Buckets whose committed contents are dropped on commit
    cleared: BTreeSet<Bucket>,
    _guard: RwLockWriteGuard<'a, ()>,
}

impl WriteTransaction<'_> {
    pub fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(staged) = self.staged.get(&bucket).and_then(|entries| entries.get(key)) {
            return Ok(staged.clone());
        }
        if self.cleared.contains(&bucket) {
            return Ok(None);
        }
        get_from(self.store.tree(bucket), key)
    }

    pub fn put(&mut self, bucket: Bucket, key: &[u8], value: &[u8]) {
        self.staged
            .entry(bucket)
            .or_default()
            .insert(key.to_vec(), Some(value.to_vec()));
    }

    pub fn delete(&mut self, bucket: Bucket, key: &[u8]) {
        self.staged
            .entry(bucket)
            .or_default()
            .insert(key.to_vec(), None);
    }

    /// Visit every entry of `bucket` as it would be after commit, in key order
    pub fn for_each<F>(&self, bucket: Bucket, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        let mut merged = BTreeMap::new();
        if !self.cleared.contains(&bucket) {
            for_each_in(self.store.tree(bucket), |key, value| {
                merged.insert(key.to_vec(), value.to_vec());
                Ok(())
            })?;
        }
        if let Some(entries) = self.staged.get(&bucket) {
            for (key, value) in entries {
                match value {
                    Some(value) => merged.insert(key.clone(), value.clone()),
                    None => merged.remove(key),
                };
            }
        }

        for (key, value) in &merged {
            f(key, value)?;
        }
        Ok(())
    }

    /// Drop every entry of `bucket`, staged ones included
    pub fn delete_bucket(&mut self, bucket: Bucket) {
        self.staged.remove(&bucket);
        self.cleared.insert(bucket);
    }

    /// Apply all staged changes in a single sled transaction over both trees
    fn commit(self) -> Result<()> {
        if self.staged.is_empty() && self.cleared.is_empty() {
            return Ok(());
        }

        let mut removals: Vec<(Bucket, Vec<u8>)> = Vec::new();
        for bucket in &self.cleared {
            for item in self.store.tree(*bucket).iter().keys() {
                removals.push((*bucket, item?.to_vec()));
            }
        }

        let result: std::result::Result<(), TransactionError<LedgerError>> =
            (&self.store.blocks, &self.store.utxo).transaction(|(blocks, utxo)| {
                let tree = |bucket: Bucket| pick_tree(bucket, blocks, utxo);

                for (bucket, key) in &removals {
                    tree(*bucket).remove(key.as_slice())?;
                }
                for (bucket, entries) in &self.staged {
                    for (key, value) in entries {
                        match value {
                            Some(value) => {
                                tree(*bucket).insert(key.as_slice(), value.as_slice())?;
                            }
                            None => {
                                tree(*bucket).remove(key.as_slice())?;
                            }
                        }
                    }
                }
                Ok::<(), ConflictableTransactionError<LedgerError>>(())
            });

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(e.into()),
        }

        self.store.db.flush()?;
        log::debug!(
            "Committed write transaction ({} buckets staged, {} cleared)",
            self.staged.len(),
            self.cleared.len()
        );
        Ok(())
    }
}
