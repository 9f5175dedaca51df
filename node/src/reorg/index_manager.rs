//! `Reversible` over block/tx/resource indices. Rollback plans are always
//! pre-collected by plain reads before the single write transaction that
//! applies them — nested reads inside a write transaction are a correctness
//! hazard this module never takes on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use strataforge_core::crypto::HashService;

use crate::store::{BlockStore, KvStore, StoreError, WriteBatch};

use super::reversible::{Reversible, ReversibleError, RollbackHandle, VerificationResult};

const TREE_HEIGHT_INDEX: &str = "indices:height";
const TREE_HASH_INDEX: &str = "indices:hash";
const TREE_TX_INDEX: &str = "indices:tx";
const TREE_CHAIN_STATE: &str = "state:chain";
const KEY_TIP: &[u8] = b"tip";

/// Pre-collected set of deletions plus the tip value the rollback restores,
/// built outside any write transaction and applied inside exactly one.
#[derive(Debug, Clone)]
pub struct IndexRollbackPlan {
    pub target_height: u64,
    pub target_hash: [u8; 32],
    pub height_keys: Vec<Vec<u8>>,
    pub hash_keys: Vec<Vec<u8>>,
    pub tx_keys: Vec<Vec<u8>>,
    /// Resource-category cross-reference indices (`indices:resource-*`,
    /// `resource:utxo-instance:*`, …). This core does not originate those
    /// records — contract-execution semantics beyond a UTXO's category tag
    /// are out of scope — so this stays empty in practice; the field exists
    /// for persisted-key-schema completeness and so a future resource-index
    /// writer has a rollback seam to plug into.
    pub resource_keys: Vec<(String, Vec<u8>)>,
}

impl IndexRollbackPlan {
    pub fn stage(&self, batch: &mut WriteBatch) {
        for key in &self.height_keys {
            batch.remove(TREE_HEIGHT_INDEX, key.clone());
        }
        for key in &self.hash_keys {
            batch.remove(TREE_HASH_INDEX, key.clone());
        }
        for key in &self.tx_keys {
            batch.remove(TREE_TX_INDEX, key.clone());
        }
        for (tree, key) in &self.resource_keys {
            batch.remove(tree.as_str(), key.clone());
        }
        let mut tip_value = Vec::with_capacity(40);
        tip_value.extend_from_slice(&self.target_height.to_be_bytes());
        tip_value.extend_from_slice(&self.target_hash);
        batch.insert(TREE_CHAIN_STATE, KEY_TIP.to_vec(), tip_value);
    }
}

pub struct IndexManager {
    db: Arc<dyn KvStore>,
    block_store: Arc<BlockStore>,
    hasher: Arc<dyn HashService>,
    next_id: AtomicU64,
}

impl IndexManager {
    pub fn new(db: Arc<dyn KvStore>, block_store: Arc<BlockStore>, hasher: Arc<dyn HashService>) -> Self {
        Self {
            db,
            block_store,
            hasher,
            next_id: AtomicU64::new(1),
        }
    }

    fn build_plan(&self, target_height: u64) -> Result<IndexRollbackPlan, StoreError> {
        let (current_height, _) = self.block_store.tip()?.unwrap_or((0, [0u8; 32]));

        let mut height_keys = Vec::new();
        let mut hash_keys = Vec::new();
        let mut tx_keys = Vec::new();

        let mut h = target_height + 1;
        while h <= current_height {
            if let Some(block) = self.block_store.get_block_by_height(h)? {
                let block_hash = self.hasher.hash_header(&block.header);
                height_keys.push(h.to_be_bytes().to_vec());
                hash_keys.push(block_hash.to_vec());
                for tx in block.transactions() {
                    tx_keys.push(self.hasher.hash_transaction(tx).to_vec());
                }
            }
            h += 1;
        }

        let target_hash = self.block_store.height_to_hash(target_height)?.ok_or_else(|| {
            StoreError::NotFound(format!("indices:height:{target_height} missing during rollback plan"))
        })?;

        Ok(IndexRollbackPlan {
            target_height,
            target_hash,
            height_keys,
            hash_keys,
            tx_keys,
            resource_keys: Vec::new(),
        })
    }
}

impl Reversible for IndexManager {
    fn create_rollback_point(&self, height: u64) -> Result<RollbackHandle, ReversibleError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(RollbackHandle::new(id, height, Utc::now().timestamp(), "index_rollback"))
    }

    fn rollback(&self, handle: RollbackHandle) -> Result<(), ReversibleError> {
        let plan = self
            .build_plan(handle.height)
            .map_err(|e| ReversibleError::RollbackFailed(e.to_string()))?;

        let mut batch = WriteBatch::new();
        plan.stage(&mut batch);
        self.db
            .apply_batch(batch)
            .map_err(|e| ReversibleError::RollbackFailed(e.to_string()))?;

        handle.mark_consumed();
        Ok(())
    }

    fn discard(&self, handle: RollbackHandle) -> Result<(), ReversibleError> {
        handle.mark_consumed();
        Ok(())
    }

    /// Cheap shape check only; deep index-integrity verification (Level 2)
    /// is performed by `ReorgValidator`.
    fn verify(&self, expected_height: u64) -> VerificationResult {
        match self.block_store.tip() {
            Ok(Some((height, _))) if height == expected_height => VerificationResult::ok(),
            Ok(Some((height, _))) => VerificationResult::failed(format!(
                "tip height {height} does not match expected {expected_height}"
            )),
            Ok(None) => VerificationResult::failed("no chain tip recorded"),
            Err(e) => VerificationResult::failed(e.to_string()),
        }
    }
}
