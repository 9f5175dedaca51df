//! Abstract transactional key-value store.
//!
//! Persistence is kept pluggable behind a small trait: `KvStore` is the
//! seam, `SledKvStore` is the concrete implementation (named trees +
//! `execute_batch` over a `sled::Transaction`).
//!
//! All keys here are addressed by a logical `tree` name plus a byte key;
//! `SledKvStore` multiplexes them onto one physical `sled::Tree` so that a
//! `WriteBatch` spanning several logical trees (e.g. an index delete plus a
//! tip update) still commits as a single sled transaction.

use std::path::Path;

use super::error::StoreError;

#[derive(Debug, Clone)]
enum BatchOp {
    Insert { tree: String, key: Vec<u8>, value: Vec<u8> },
    Remove { tree: String, key: Vec<u8> },
}

/// A set of writes that must land atomically or not at all.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tree: &str, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Insert {
            tree: tree.to_string(),
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn remove(&mut self, tree: &str, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Remove {
            tree: tree.to_string(),
            key: key.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn extend(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
    }
}

/// Transactional key-value store abstraction the chain core is written
/// against. Readers never block writers and vice versa (sled's MVCC gives
/// us this for free); every write that must be atomic goes through
/// `apply_batch`, which is the only write primitive exposed.
pub trait KvStore: Send + Sync {
    fn get(&self, tree: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn scan_prefix(&self, tree: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    fn apply_batch(&self, batch: WriteBatch) -> Result<(), StoreError>;

    fn flush(&self) -> Result<(), StoreError>;
}

fn namespaced_key(tree: &str, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(tree.len() + 1 + key.len());
    out.extend_from_slice(tree.as_bytes());
    out.push(0u8);
    out.extend_from_slice(key);
    out
}

pub struct SledKvStore {
    db: sled::Db,
    main: sled::Tree,
}

impl SledKvStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let main = db.open_tree("main")?;
        Ok(Self { db, main })
    }

    /// In-memory store for tests — same transactional semantics, no disk I/O.
    pub fn open_temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        let main = db.open_tree("main")?;
        Ok(Self { db, main })
    }
}

impl KvStore for SledKvStore {
    fn get(&self, tree: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let key = namespaced_key(tree, key);
        Ok(self.main.get(key)?.map(|ivec| ivec.to_vec()))
    }

    fn scan_prefix(&self, tree: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut full_prefix = tree.as_bytes().to_vec();
        full_prefix.push(0u8);
        full_prefix.extend_from_slice(prefix);
        let tree_prefix_len = tree.len() + 1;

        let mut out = Vec::new();
        for item in self.main.scan_prefix(&full_prefix) {
            let (k, v) = item?;
            out.push((k[tree_prefix_len..].to_vec(), v.to_vec()));
        }
        Ok(out)
    }

    fn apply_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let result: sled::transaction::TransactionResult<(), ()> =
            self.main.transaction(|tx| {
                for op in &batch.ops {
                    match op {
                        BatchOp::Insert { tree, key, value } => {
                            tx.insert(namespaced_key(tree, key), value.as_slice())?;
                        }
                        BatchOp::Remove { tree, key } => {
                            tx.remove(namespaced_key(tree, key))?;
                        }
                    }
                }
                Ok(())
            });
        result.map_err(|e| StoreError::TransactionAborted(e.to_string()))?;
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}
