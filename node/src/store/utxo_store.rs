//! UTXO set persistence: `utxo:set:{hex(tx)}:{out_idx}` records plus the
//! order-independent state-root derivation (`strataforge_core::storage`)
//! that gets committed into `state:chain:root`.
//!
//! Every spend is also recorded into `indices:utxo:history:{height BE 8}‖
//! {outpoint_key}`, an undo log that lets `SnapshotManager` reconstruct the
//! live set as of any earlier height without needing a full snapshot per
//! height: take the current live set, drop anything created after the
//! target height, and restore anything this log shows was spent after it.

use std::sync::Arc;

use strataforge_core::crypto::HashService;
use strataforge_core::storage::{compute_state_root, Utxo};

use super::error::StoreError;
use super::kv::{KvStore, WriteBatch};

const TREE_UTXO_SET: &str = "utxo:set";
const TREE_UTXO_HISTORY: &str = "indices:utxo:history";

pub struct UtxoStore {
    db: Arc<dyn KvStore>,
}

impl UtxoStore {
    pub fn new(db: Arc<dyn KvStore>) -> Self {
        Self { db }
    }

    pub fn get(&self, outpoint_key: &[u8]) -> Result<Option<Utxo>, StoreError> {
        match self.db.get(TREE_UTXO_SET, outpoint_key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, outpoint_key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.db.get(TREE_UTXO_SET, outpoint_key)?.is_some())
    }

    /// Stages creation of a new UTXO. Caller supplies the outpoint key bytes
    /// (`OutPoint::to_key_bytes`) so this store never has to know about the
    /// transaction type that produced it.
    pub fn stage_create(&self, batch: &mut WriteBatch, outpoint_key: Vec<u8>, utxo: &Utxo) -> Result<(), StoreError> {
        batch.insert(TREE_UTXO_SET, outpoint_key, bincode::serialize(utxo)?);
        Ok(())
    }

    /// Stages a normal, block-processing spend: removes the live record and
    /// appends it to the undo log at `spent_height`. This is what
    /// `BlockProcessor` calls for every transaction input.
    pub fn stage_spend(
        &self,
        batch: &mut WriteBatch,
        outpoint_key: Vec<u8>,
        spent_height: u64,
        spent_utxo: &Utxo,
    ) -> Result<(), StoreError> {
        batch.remove(TREE_UTXO_SET, outpoint_key.clone());
        let mut history_key = Vec::with_capacity(8 + outpoint_key.len());
        history_key.extend_from_slice(&spent_height.to_be_bytes());
        history_key.extend_from_slice(&outpoint_key);
        batch.insert(TREE_UTXO_HISTORY, history_key, bincode::serialize(spent_utxo)?);
        Ok(())
    }

    /// Removes a live record without touching the undo log. Used internally
    /// by `SnapshotManager::rollback` to clear the set before restoring a
    /// reconstructed one — that clearing is bookkeeping, not a chain event.
    pub fn stage_remove_raw(&self, batch: &mut WriteBatch, outpoint_key: Vec<u8>) {
        batch.remove(TREE_UTXO_SET, outpoint_key);
    }

    pub fn stage_prune_history_after(&self, batch: &mut WriteBatch, outpoint_key: &[u8], spent_height: u64) {
        let mut history_key = Vec::with_capacity(8 + outpoint_key.len());
        history_key.extend_from_slice(&spent_height.to_be_bytes());
        history_key.extend_from_slice(outpoint_key);
        batch.remove(TREE_UTXO_HISTORY, history_key);
    }

    /// Full scan of the live UTXO set. Used by `compute_current_state_root`
    /// and by the self-rebuild-from-genesis recovery path; not on any
    /// per-block hot path.
    pub fn scan_all(&self) -> Result<Vec<Utxo>, StoreError> {
        self.db
            .scan_prefix(TREE_UTXO_SET, b"")?
            .into_iter()
            .map(|(_, value)| bincode::deserialize(&value).map_err(StoreError::from))
            .collect()
    }

    pub fn compute_current_state_root(&self, hasher: &dyn HashService) -> Result<[u8; 32], StoreError> {
        let utxos = self.scan_all()?;
        Ok(compute_state_root(hasher, &utxos))
    }

    /// Like `scan_all` but keeps the raw key bytes alongside each record.
    pub fn scan_all_with_keys(&self) -> Result<Vec<(Vec<u8>, Utxo)>, StoreError> {
        self.db
            .scan_prefix(TREE_UTXO_SET, b"")?
            .into_iter()
            .map(|(key, value)| Ok((key, bincode::deserialize(&value)?)))
            .collect()
    }

    /// Undo-log entries for spends that happened strictly after
    /// `height_exclusive`, i.e. exactly the spends a rollback to that height
    /// must reverse. Returns `(outpoint_key, spent_height, utxo_before_spend)`.
    pub fn scan_history_after(&self, height_exclusive: u64) -> Result<Vec<(Vec<u8>, u64, Utxo)>, StoreError> {
        let mut out = Vec::new();
        for (key, value) in self.db.scan_prefix(TREE_UTXO_HISTORY, b"")? {
            if key.len() < 8 {
                continue;
            }
            let mut height_bytes = [0u8; 8];
            height_bytes.copy_from_slice(&key[0..8]);
            let spent_height = u64::from_be_bytes(height_bytes);
            if spent_height <= height_exclusive {
                continue;
            }
            let outpoint_key = key[8..].to_vec();
            let utxo: Utxo = bincode::deserialize(&value)?;
            out.push((outpoint_key, spent_height, utxo));
        }
        Ok(out)
    }

    /// Wipes the live set and the undo log entirely. Used only by the
    /// self-rebuild-from-genesis recovery path, never by normal rollback —
    /// rollback restores a specific earlier state, this discards all of it
    /// so replay can repopulate from scratch.
    pub fn clear_all(&self, batch_threshold: usize) -> Result<(), StoreError> {
        let chunk_size = batch_threshold.max(1);
        for tree in [TREE_UTXO_SET, TREE_UTXO_HISTORY] {
            let keys: Vec<Vec<u8>> = self.db.scan_prefix(tree, b"")?.into_iter().map(|(k, _)| k).collect();
            for chunk in keys.chunks(chunk_size) {
                let mut batch = WriteBatch::new();
                for key in chunk {
                    batch.remove(tree, key.clone());
                }
                self.db.apply_batch(batch)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::kv::SledKvStore;
    use strataforge_core::crypto::Sha256HashService;
    use strataforge_core::types::{OutPoint, OutputCategory};

    fn utxo(tx: u8, idx: u32, value: u64, height: u64) -> (Vec<u8>, Utxo) {
        let outpoint = OutPoint::new([tx; 32], idx);
        let key = outpoint.to_key_bytes();
        let utxo = Utxo {
            outpoint,
            value,
            owner: vec![tx],
            block_height: height,
            category: OutputCategory::Standard,
            locking_script: vec![],
        };
        (key, utxo)
    }

    #[test]
    fn create_then_spend_round_trip() {
        let db: Arc<dyn KvStore> = Arc::new(SledKvStore::open_temporary().unwrap());
        let store = UtxoStore::new(db.clone());
        let (key, utxo) = utxo(1, 0, 10, 1);

        let mut batch = WriteBatch::new();
        store.stage_create(&mut batch, key.clone(), &utxo).unwrap();
        db.apply_batch(batch).unwrap();

        assert!(store.contains(&key).unwrap());
        assert_eq!(store.get(&key).unwrap().unwrap().value, 10);

        let mut batch = WriteBatch::new();
        store.stage_spend(&mut batch, key.clone(), 2, &utxo).unwrap();
        db.apply_batch(batch).unwrap();

        assert!(!store.contains(&key).unwrap());
    }

    #[test]
    fn state_root_reflects_live_set_only() {
        let db: Arc<dyn KvStore> = Arc::new(SledKvStore::open_temporary().unwrap());
        let store = UtxoStore::new(db.clone());
        let hasher = Sha256HashService;

        let empty_root = store.compute_current_state_root(&hasher).unwrap();
        assert_eq!(empty_root, [0u8; 32]);

        let (key, utxo) = utxo(1, 0, 10, 1);
        let mut batch = WriteBatch::new();
        store.stage_create(&mut batch, key.clone(), &utxo).unwrap();
        db.apply_batch(batch).unwrap();

        let populated_root = store.compute_current_state_root(&hasher).unwrap();
        assert_ne!(populated_root, empty_root);

        let mut batch = WriteBatch::new();
        store.stage_spend(&mut batch, key, 2, &utxo).unwrap();
        db.apply_batch(batch).unwrap();

        let drained_root = store.compute_current_state_root(&hasher).unwrap();
        assert_eq!(drained_root, empty_root);
    }

    #[test]
    fn spend_history_only_surfaces_spends_after_the_given_height() {
        let db: Arc<dyn KvStore> = Arc::new(SledKvStore::open_temporary().unwrap());
        let store = UtxoStore::new(db.clone());
        let (key, utxo) = utxo(1, 0, 10, 1);

        let mut batch = WriteBatch::new();
        store.stage_create(&mut batch, key.clone(), &utxo).unwrap();
        db.apply_batch(batch).unwrap();

        let mut batch = WriteBatch::new();
        store.stage_spend(&mut batch, key.clone(), 5, &utxo).unwrap();
        db.apply_batch(batch).unwrap();

        assert_eq!(store.scan_history_after(4).unwrap().len(), 1);
        assert_eq!(store.scan_history_after(5).unwrap().len(), 0);
    }
}
