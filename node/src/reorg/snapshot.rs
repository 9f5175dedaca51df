//! `Reversible` over the UTXO set.
//!
//! A captured handle does not copy the whole live set (expensive and, for a
//! lower target height, insufficient on its own). Instead it fully
//! materializes, at capture time, exactly the two deltas needed to
//! reconstruct the set as of `target_height`:
//!   - every currently-live UTXO created after `target_height` (to remove)
//!   - every undo-log entry for a spend that happened after `target_height`
//!     (to restore)
//! Both are read once, in memory, before any write transaction — so later
//! mutations to the live set or the undo log (e.g. during Replay) can't
//! invalidate a handle taken during Prepare.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use strataforge_core::crypto::HashService;
use strataforge_core::storage::Utxo;
use tracing::warn;

use crate::store::{KvStore, StoreError, UtxoStore, WriteBatch};

use super::reversible::{Reversible, ReversibleError, RollbackHandle, VerificationResult};

struct CapturedSnapshot {
    /// Outpoint keys live now that must be removed to reach `target_height`.
    to_remove: Vec<Vec<u8>>,
    /// Outpoint/spent-height/UTXO triples the undo log shows were spent
    /// after `target_height`, to be re-inserted (the spent height is kept
    /// so the matching undo-log entry can be pruned afterward).
    to_restore: Vec<(Vec<u8>, u64, Utxo)>,
}

pub struct SnapshotManager {
    db: Arc<dyn KvStore>,
    utxo_store: Arc<UtxoStore>,
    hasher: Arc<dyn HashService>,
    batch_threshold: usize,
    next_id: AtomicU64,
    captured: Mutex<HashMap<u64, CapturedSnapshot>>,
}

impl SnapshotManager {
    pub fn new(db: Arc<dyn KvStore>, utxo_store: Arc<UtxoStore>, hasher: Arc<dyn HashService>, batch_threshold: usize) -> Self {
        Self {
            db,
            utxo_store,
            hasher,
            batch_threshold,
            next_id: AtomicU64::new(1),
            captured: Mutex::new(HashMap::new()),
        }
    }
}

impl Reversible for SnapshotManager {
    fn create_rollback_point(&self, height: u64) -> Result<RollbackHandle, ReversibleError> {
        let live = self
            .utxo_store
            .scan_all_with_keys()
            .map_err(|e| ReversibleError::CaptureFailed(e.to_string()))?;

        if height > 0 {
            if let Some((_, bad)) = live.iter().find(|(_, u)| u.block_height == 0) {
                return Err(ReversibleError::CaptureFailed(format!(
                    "corruption: utxo {:?} has block_height==0 past genesis",
                    bad.outpoint
                )));
            }
        }

        let to_remove: Vec<Vec<u8>> = live
            .iter()
            .filter(|(_, u)| u.block_height > height)
            .map(|(k, _)| k.clone())
            .collect();

        let to_restore: Vec<(Vec<u8>, u64, Utxo)> = self
            .utxo_store
            .scan_history_after(height)
            .map_err(|e| ReversibleError::CaptureFailed(e.to_string()))?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.captured
            .lock()
            .expect("snapshot map lock poisoned")
            .insert(id, CapturedSnapshot { to_remove, to_restore });

        Ok(RollbackHandle::new(id, height, Utc::now().timestamp(), "utxo_snapshot"))
    }

    fn rollback(&self, handle: RollbackHandle) -> Result<(), ReversibleError> {
        let snapshot = self
            .captured
            .lock()
            .expect("snapshot map lock poisoned")
            .remove(&handle.id)
            .ok_or(ReversibleError::UnknownHandle)?;

        let total_ops = snapshot.to_remove.len() + snapshot.to_restore.len();
        let chunk_size = self.batch_threshold.max(1);

        if total_ops > self.batch_threshold {
            warn!(
                total_ops,
                threshold = self.batch_threshold,
                "utxo rollback exceeds batch threshold; restoring in multiple transactions"
            );
        }

        for chunk in snapshot.to_remove.chunks(chunk_size) {
            let mut batch = WriteBatch::new();
            for key in chunk {
                self.utxo_store.stage_remove_raw(&mut batch, key.clone());
            }
            self.db
                .apply_batch(batch)
                .map_err(|e| ReversibleError::RollbackFailed(e.to_string()))?;
        }

        for chunk in snapshot.to_restore.chunks(chunk_size) {
            let mut batch = WriteBatch::new();
            for (key, spent_height, utxo) in chunk {
                self.utxo_store
                    .stage_create(&mut batch, key.clone(), utxo)
                    .map_err(|e| ReversibleError::RollbackFailed(e.to_string()))?;
                self.utxo_store.stage_prune_history_after(&mut batch, key, *spent_height);
            }
            self.db
                .apply_batch(batch)
                .map_err(|e| ReversibleError::RollbackFailed(e.to_string()))?;
        }

        handle.mark_consumed();
        Ok(())
    }

    fn discard(&self, handle: RollbackHandle) -> Result<(), ReversibleError> {
        self.captured
            .lock()
            .expect("snapshot map lock poisoned")
            .remove(&handle.id)
            .ok_or(ReversibleError::UnknownHandle)?;
        handle.mark_consumed();
        Ok(())
    }

    /// Cheap existence/shape check only — the three-level deep verification
    /// (state-root, index integrity, cross-module consistency) is performed
    /// separately by `ReorgValidator` once a REORG session reaches Verify.
    fn verify(&self, expected_height: u64) -> VerificationResult {
        match self.utxo_store.compute_current_state_root(self.hasher.as_ref()) {
            Ok(_) => VerificationResult::ok(),
            Err(e) => VerificationResult::failed(format!(
                "state-root recomputation failed at height {expected_height}: {e}"
            )),
        }
    }
}
