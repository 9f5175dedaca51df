//! Atomic block application. `BlockProcessor` is the only producer of
//! writes to `BlockStore` + `UtxoStore` + chain tip: either every mutation a
//! block requires lands in a single write transaction, or none does.

use std::sync::Arc;

use strataforge_core::crypto::HashService;
use strataforge_core::events::{Event, EventBus, ForkKind};
use strataforge_core::storage::{compute_state_root, Utxo};
use strataforge_core::types::{Block, OutPoint};
use thiserror::Error;

use crate::consensus::{ForkDetectError, ForkDetector, ForkOutcome};
use crate::mempool::TxPool;
use crate::reorg::write_gate::{FenceToken, GateError, WriteGate};
use crate::store::{KvStore, StoreError, UtxoStore};
use crate::store::BlockStore;
use crate::validation::{BlockValidator, ValidationContext, ValidationFailure};

#[derive(Debug, Error)]
pub enum ProcessingFailure {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationFailure),
    #[error("fork check failed: {0}")]
    ForkCheck(#[from] ForkDetectError),
    #[error("store error: {0}")]
    Store(String),
    #[error("write refused: {0}")]
    Gate(#[from] GateError),
}

impl From<StoreError> for ProcessingFailure {
    fn from(e: StoreError) -> Self {
        ProcessingFailure::Store(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Applied { height: u64, hash: [u8; 32] },
    AlreadyApplied { height: u64, hash: [u8; 32] },
    ForkDetected(ForkKind),
}

pub struct BlockProcessor {
    hasher: Arc<dyn HashService>,
    validator: Arc<BlockValidator>,
    fork_detector: Arc<ForkDetector>,
    db: Arc<dyn KvStore>,
    block_store: Arc<BlockStore>,
    utxo_store: Arc<UtxoStore>,
    write_gate: Arc<WriteGate>,
    tx_pool: Arc<TxPool>,
    event_bus: Arc<dyn EventBus>,
}

impl BlockProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hasher: Arc<dyn HashService>,
        validator: Arc<BlockValidator>,
        fork_detector: Arc<ForkDetector>,
        db: Arc<dyn KvStore>,
        block_store: Arc<BlockStore>,
        utxo_store: Arc<UtxoStore>,
        write_gate: Arc<WriteGate>,
        tx_pool: Arc<TxPool>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            hasher,
            validator,
            fork_detector,
            db,
            block_store,
            utxo_store,
            write_gate,
            tx_pool,
            event_bus,
        }
    }

    /// Applies `block`, or discovers it collides with the canonical chain
    /// and hands the decision back to the caller (the REORG path, via
    /// `ReorgCoordinator`) instead of writing anything.
    pub fn process(
        &self,
        block: &Block,
        ctx: &ValidationContext,
        fence: Option<FenceToken>,
    ) -> Result<ProcessOutcome, ProcessingFailure> {
        let hash = self.hasher.hash_header(&block.header);
        let height = block.header.height;

        if self.block_store.contains_hash(&hash)? {
            return Ok(ProcessOutcome::AlreadyApplied { height, hash });
        }

        self.validator.validate(block, ctx)?;

        match self.fork_detector.detect(block)? {
            ForkOutcome::Fork(kind) => {
                self.event_bus.publish(Event::ForkDetected {
                    kind,
                    height,
                    block_hash: hash,
                });
                return Ok(ProcessOutcome::ForkDetected(kind));
            }
            ForkOutcome::CanonicalExtension => {}
        }

        self.write_gate.assert_write_allowed(fence, "process_block")?;

        let mut to_remove: Vec<(Vec<u8>, Utxo)> = Vec::new();
        let mut to_create: Vec<(Vec<u8>, Utxo)> = Vec::new();
        let mut confirmed_tx_ids: Vec<[u8; 32]> = Vec::new();

        for tx in block.transactions() {
            let tx_hash = self.hasher.hash_transaction(tx);
            if !tx.is_coinbase() {
                confirmed_tx_ids.push(tx_hash);
            }
            for input in &tx.inputs {
                let key = input.previous_output.to_key_bytes();
                let spent = self
                    .utxo_store
                    .get(&key)?
                    .ok_or_else(|| ProcessingFailure::Store(format!("utxo {:?} missing at apply time", input.previous_output)))?;
                to_remove.push((key, spent));
            }
            for (index, output) in tx.outputs.iter().enumerate() {
                let outpoint = OutPoint::new(tx_hash, index as u32);
                let utxo = Utxo {
                    outpoint,
                    value: output.value,
                    owner: output.owner.clone(),
                    block_height: height,
                    category: output.category,
                    locking_script: output.locking_script.clone(),
                };
                to_create.push((outpoint.to_key_bytes(), utxo));
            }
        }

        let prospective_root = self.prospective_state_root(&to_remove, &to_create)?;

        let mut batch = crate::store::WriteBatch::new();
        self.block_store.stage_block(&mut batch, block, hash)?;
        for (key, spent) in &to_remove {
            self.utxo_store.stage_spend(&mut batch, key.clone(), height, spent)?;
        }
        for (key, utxo) in &to_create {
            self.utxo_store.stage_create(&mut batch, key.clone(), utxo)?;
        }
        self.block_store.stage_root(&mut batch, prospective_root);
        self.block_store.stage_tip(&mut batch, height, hash);

        self.db.apply_batch(batch)?;

        self.event_bus.publish(Event::BlockProcessed { height, hash });
        self.tx_pool.confirm_transactions(&confirmed_tx_ids, height);

        Ok(ProcessOutcome::Applied { height, hash })
    }

    /// Computes what `state:chain:root` will be once this block's UTXO
    /// mutations land, without mutating the store: read the live set once,
    /// apply the in-flight delta in memory, then Merkleize. This keeps the
    /// whole block application a single `apply_batch` call — the root and
    /// the mutations it depends on are staged together, never split across
    /// two transactions.
    fn prospective_state_root(
        &self,
        to_remove: &[(Vec<u8>, Utxo)],
        to_create: &[(Vec<u8>, Utxo)],
    ) -> Result<[u8; 32], ProcessingFailure> {
        let removed_keys: Vec<&Vec<u8>> = to_remove.iter().map(|(k, _)| k).collect();
        let mut live = self.utxo_store.scan_all_with_keys()?;
        live.retain(|(key, _)| !removed_keys.contains(&key));
        live.extend(to_create.iter().cloned());

        let utxos: Vec<Utxo> = live.into_iter().map(|(_, u)| u).collect();
        Ok(compute_state_root(self.hasher.as_ref(), &utxos))
    }
}
