//! The REORG state machine: `Prepare -> Rollback -> Replay -> Verify ->
//! Commit`, with every failure routed to `Abort` and, if compensation also
//! fails, to a terminal read-only `WriteGate` state.
//!
//! Only one session may run at a time; a coarse mutex enforces the
//! single-canonical-writer scheduling model this whole module lives under.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use strataforge_core::crypto::HashService;
use strataforge_core::events::{Event, EventBus, ReorgPhase};
use strataforge_core::types::Transaction;
use thiserror::Error;

use crate::mempool::TxPool;
use crate::processor::{BlockProcessor, ProcessOutcome};
use crate::provider::BlockProvider;
use crate::store::{BlockStore, UtxoStore};
use crate::validation::ValidationContext;

use super::index_manager::IndexManager;
use super::reversible::{Reversible, ReversibleError, RollbackHandle};
use super::snapshot::SnapshotManager;
use super::validator::ReorgValidator;
use super::write_gate::WriteGate;

#[derive(Debug, Error)]
pub enum ReorgError {
    #[error("a reorg session is already in progress")]
    AlreadyInProgress,
    #[error("invalid heights: fork_height={fork_height} from_height={from_height} to_height={to_height}")]
    InvalidHeights {
        fork_height: u64,
        from_height: u64,
        to_height: u64,
    },
    #[error("prepare failed: {0}")]
    PrepareFailed(String),
    #[error("rollback failed: {0}")]
    RollbackFailed(String),
    #[error("replay failed at height {height}: {detail}")]
    ReplayFailed { height: u64, detail: String },
    #[error("verify failed: {0}")]
    VerifyFailed(String),
    #[error("commit failed: {0}")]
    CommitFailed(String),
    #[error("abort itself failed; node entered read-only mode: {0}")]
    AbortFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorgReport {
    pub session_id: String,
    pub reverted_blocks: u64,
    pub applied_blocks: u64,
    pub final_height: u64,
}

struct ActiveGuard<'a>(&'a Mutex<bool>);

impl<'a> ActiveGuard<'a> {
    fn acquire(flag: &'a Mutex<bool>) -> Result<Self, ReorgError> {
        let mut held = flag.lock().expect("reorg active flag lock poisoned");
        if *held {
            return Err(ReorgError::AlreadyInProgress);
        }
        *held = true;
        Ok(Self(flag))
    }
}

impl<'a> Drop for ActiveGuard<'a> {
    fn drop(&mut self) {
        *self.0.lock().expect("reorg active flag lock poisoned") = false;
    }
}

pub struct ReorgCoordinator {
    snapshot_manager: Arc<SnapshotManager>,
    index_manager: Arc<IndexManager>,
    reorg_validator: Arc<ReorgValidator>,
    write_gate: Arc<WriteGate>,
    processor: Arc<BlockProcessor>,
    tx_pool: Arc<TxPool>,
    block_store: Arc<BlockStore>,
    utxo_store: Arc<UtxoStore>,
    hasher: Arc<dyn HashService>,
    event_bus: Arc<dyn EventBus>,
    snapshot_batch_threshold: usize,
    active: Mutex<bool>,
    next_session_id: AtomicU64,
}

impl ReorgCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        snapshot_manager: Arc<SnapshotManager>,
        index_manager: Arc<IndexManager>,
        reorg_validator: Arc<ReorgValidator>,
        write_gate: Arc<WriteGate>,
        processor: Arc<BlockProcessor>,
        tx_pool: Arc<TxPool>,
        block_store: Arc<BlockStore>,
        utxo_store: Arc<UtxoStore>,
        hasher: Arc<dyn HashService>,
        event_bus: Arc<dyn EventBus>,
        snapshot_batch_threshold: usize,
    ) -> Self {
        Self {
            snapshot_manager,
            index_manager,
            reorg_validator,
            write_gate,
            processor,
            tx_pool,
            block_store,
            utxo_store,
            hasher,
            event_bus,
            snapshot_batch_threshold,
            active: Mutex::new(false),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Drives one full REORG session from `from_height` (current tip before
    /// the fork was noticed) through `to_height` (the heavier branch's tip),
    /// diverging at `fork_height`. Blocks `[fork_height+1 .. to_height]` are
    /// fetched from `provider`.
    pub fn execute(&self, from_height: u64, fork_height: u64, to_height: u64, provider: &dyn BlockProvider) -> Result<ReorgReport, ReorgError> {
        let _guard = ActiveGuard::acquire(&self.active)?;

        // A same-height replacement (a heavier block at the current tip
        // height beats the canonical one) has `from_height == to_height`;
        // a longer alternative branch has `from_height < to_height`. Either
        // is valid, so the upper relation is non-strict.
        if !(fork_height <= from_height && from_height <= to_height) {
            return Err(ReorgError::InvalidHeights {
                fork_height,
                from_height,
                to_height,
            });
        }

        let session_id = format!("reorg-{}", self.next_session_id.fetch_add(1, Ordering::SeqCst));
        let detached_txs = self.collect_detached_transactions(fork_height, from_height);

        let phase_start = |phase: ReorgPhase| {
            self.event_bus.publish(Event::ReorgPhaseStarted {
                session_id: session_id.clone(),
                phase,
                from_height,
                fork_height,
                to_height,
            });
            Instant::now()
        };
        let phase_done = |phase: ReorgPhase, started: Instant| {
            self.event_bus.publish(Event::ReorgPhaseCompleted {
                session_id: session_id.clone(),
                phase,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        };

        let t = phase_start(ReorgPhase::Prepare);
        let mut handles = match self.prepare(from_height, fork_height) {
            Ok(h) => h,
            Err(e) => {
                if self.looks_like_corruption(&e) {
                    if let Some(report) = self.attempt_self_rebuild(&session_id, from_height, fork_height, to_height, provider, &detached_txs) {
                        return report;
                    }
                }
                return self.abort(&session_id, ReorgPhase::Prepare, format!("prepare_failed: {e}"), None);
            }
        };
        phase_done(ReorgPhase::Prepare, t);

        let t = phase_start(ReorgPhase::Rollback);
        if let Err(e) = self.run_rollback(handles.index_rollback_handle_ref(), handles.utxo_rollback_handle_ref()) {
            return self.abort(&session_id, ReorgPhase::Rollback, format!("rollback_failed: {e}"), Some(handles.utxo_recovery));
        }
        phase_done(ReorgPhase::Rollback, t);

        let token = self
            .write_gate
            .enable_write_fence()
            .map_err(|e| ReorgError::RollbackFailed(format!("could not fence writes for replay: {e}")))?;

        let t = phase_start(ReorgPhase::Replay);
        let mut applied_blocks = 0u64;
        for h in (fork_height + 1)..=to_height {
            let Some(block) = provider.get(h) else {
                let _ = self.write_gate.disable_write_fence(token);
                return self.abort(
                    &session_id,
                    ReorgPhase::Replay,
                    format!("replay_failed: block at height {h} unavailable from provider"),
                    Some(handles.utxo_recovery),
                );
            };
            if block.header.height != h {
                let _ = self.write_gate.disable_write_fence(token);
                return self.abort(
                    &session_id,
                    ReorgPhase::Replay,
                    format!("replay_failed: provider returned height {} for requested {h}", block.header.height),
                    Some(handles.utxo_recovery),
                );
            }
            let ctx = ValidationContext { reorg_mode: true };
            match self.processor.process(&block, &ctx, Some(token)) {
                Ok(ProcessOutcome::Applied { .. }) | Ok(ProcessOutcome::AlreadyApplied { .. }) => {
                    applied_blocks += 1;
                }
                Ok(ProcessOutcome::ForkDetected(_)) => {
                    let _ = self.write_gate.disable_write_fence(token);
                    return self.abort(
                        &session_id,
                        ReorgPhase::Replay,
                        format!("replay_failed: block at height {h} itself forks against the rolled-back chain"),
                        Some(handles.utxo_recovery),
                    );
                }
                Err(e) => {
                    let _ = self.write_gate.disable_write_fence(token);
                    return self.abort(&session_id, ReorgPhase::Replay, format!("replay_failed at {h}: {e}"), Some(handles.utxo_recovery));
                }
            }
        }
        phase_done(ReorgPhase::Replay, t);

        let t = phase_start(ReorgPhase::Verify);
        if let Err(e) = self.reorg_validator.verify(to_height) {
            let _ = self.write_gate.disable_write_fence(token);
            return self.abort(&session_id, ReorgPhase::Verify, format!("verify_failed: {e}"), Some(handles.utxo_recovery));
        }
        phase_done(ReorgPhase::Verify, t);

        let t = phase_start(ReorgPhase::Commit);
        if let Err(e) = self.write_gate.disable_write_fence(token) {
            self.write_gate.enter_read_only(format!("commit_failed: could not lift write fence: {e}"));
            self.event_bus.publish(Event::ReadonlyModeEntered {
                reason: "commit_failed: could not lift write fence".to_string(),
            });
            return Err(ReorgError::CommitFailed(e.to_string()));
        }
        if let Err(e) = self.snapshot_manager.discard(handles.utxo_recovery) {
            return Err(ReorgError::CommitFailed(format!("discard utxo_recovery: {e}")));
        }
        phase_done(ReorgPhase::Commit, t);

        for tx in detached_txs {
            self.tx_pool.resubmit(tx);
        }

        crate::metrics::reorg_committed();
        self.event_bus.publish(Event::ForkCompleted {
            process_id: session_id.clone(),
            reverted_blocks: from_height.saturating_sub(fork_height),
            applied_blocks,
            final_height: to_height,
        });

        Ok(ReorgReport {
            session_id,
            reverted_blocks: from_height.saturating_sub(fork_height),
            applied_blocks,
            final_height: to_height,
        })
    }

    fn collect_detached_transactions(&self, fork_height: u64, from_height: u64) -> Vec<Transaction> {
        let mut out = Vec::new();
        for h in (fork_height + 1)..=from_height {
            if let Ok(Some(block)) = self.block_store.get_block_by_height(h) {
                for tx in block.non_coinbase_transactions() {
                    out.push(tx.clone());
                }
            }
        }
        out
    }

    fn prepare(&self, from_height: u64, fork_height: u64) -> Result<PreparedHandles, ReversibleError> {
        let utxo_recovery = self.snapshot_manager.create_rollback_point(from_height)?;
        let utxo_rollback = match self.snapshot_manager.create_rollback_point(fork_height) {
            Ok(h) => h,
            Err(e) => {
                let _ = self.snapshot_manager.discard(utxo_recovery);
                return Err(e);
            }
        };
        let index_rollback = match self.index_manager.create_rollback_point(fork_height) {
            Ok(h) => h,
            Err(e) => {
                let _ = self.snapshot_manager.discard(utxo_recovery);
                let _ = self.snapshot_manager.discard(utxo_rollback);
                return Err(e);
            }
        };
        Ok(PreparedHandles {
            utxo_recovery,
            utxo_rollback: Some(utxo_rollback),
            index_rollback: Some(index_rollback),
        })
    }

    fn run_rollback(&self, index_rollback: Option<RollbackHandle>, utxo_rollback: Option<RollbackHandle>) -> Result<(), ReversibleError> {
        if let Some(h) = index_rollback {
            self.index_manager.rollback(h)?;
        }
        if let Some(h) = utxo_rollback {
            self.snapshot_manager.rollback(h)?;
        }
        Ok(())
    }

    fn looks_like_corruption(&self, err: &ReversibleError) -> bool {
        matches!(err, ReversibleError::CaptureFailed(msg) if msg.contains("corruption"))
    }

    /// Deterministic but slow recovery: wipe everything and replay from
    /// local genesis up through `fork_height`, then from `provider` through
    /// `to_height`. Returns `None` (letting the caller fall through to the
    /// normal Abort path) if no provider coverage is actually available for
    /// the replay range, since a half-wiped chain with nowhere to replay
    /// from would be worse than the original failure.
    fn attempt_self_rebuild(
        &self,
        session_id: &str,
        _from_height: u64,
        fork_height: u64,
        to_height: u64,
        provider: &dyn BlockProvider,
        detached_txs: &[Transaction],
    ) -> Option<Result<ReorgReport, ReorgError>> {
        for h in (fork_height + 1)..=to_height {
            if provider.get(h).is_none() {
                return None;
            }
        }

        let local_blocks: Vec<_> = (0..=fork_height)
            .map(|h| self.block_store.get_block_by_height(h))
            .collect();
        if local_blocks.iter().any(|b| !matches!(b, Ok(Some(_)))) {
            return None;
        }

        let recovery_token = match self.write_gate.enter_recovery_mode() {
            Ok(t) => t,
            Err(_) => {
                self.write_gate.enter_read_only("corruption_detected: snapshot capture failed with block_height==0");
                return Some(Err(ReorgError::PrepareFailed(
                    "corruption detected and recovery mode unavailable".to_string(),
                )));
            }
        };

        self.event_bus.publish(Event::CorruptionDetected {
            component: "eutxo".to_string(),
            phase: "prepare".to_string(),
            severity: "critical".to_string(),
            height: Some(fork_height),
            err_class: "block_height_zero_past_genesis".to_string(),
        });

        if self.utxo_store.clear_all(self.snapshot_batch_threshold).is_err() || self.block_store.clear_all(self.snapshot_batch_threshold).is_err() {
            self.write_gate.enter_read_only("corruption_detected: could not clear state for self-rebuild");
            self.event_bus.publish(Event::ReadonlyModeEntered {
                reason: "self_rebuild_failed: could not clear chain state".to_string(),
            });
            return Some(Err(ReorgError::PrepareFailed("self-rebuild could not clear chain state".to_string())));
        }

        let mut applied_blocks = 0u64;
        for block in local_blocks.into_iter().flatten().flatten() {
            let ctx = ValidationContext { reorg_mode: true };
            match self.processor.process(&block, &ctx, Some(recovery_token)) {
                Ok(_) => applied_blocks += 1,
                Err(e) => {
                    self.write_gate.enter_read_only(format!("self_rebuild_failed: local replay at genesis path: {e}"));
                    self.event_bus.publish(Event::ReadonlyModeEntered {
                        reason: "self_rebuild_failed: local replay".to_string(),
                    });
                    return Some(Err(ReorgError::PrepareFailed(format!("self-rebuild local replay failed: {e}"))));
                }
            }
        }

        for h in (fork_height + 1)..=to_height {
            let block = provider.get(h).expect("checked availability above");
            let ctx = ValidationContext { reorg_mode: true };
            match self.processor.process(&block, &ctx, Some(recovery_token)) {
                Ok(_) => applied_blocks += 1,
                Err(e) => {
                    self.write_gate.enter_read_only(format!("self_rebuild_failed: provider replay at {h}: {e}"));
                    self.event_bus.publish(Event::ReadonlyModeEntered {
                        reason: "self_rebuild_failed: provider replay".to_string(),
                    });
                    return Some(Err(ReorgError::PrepareFailed(format!("self-rebuild provider replay failed at {h}: {e}"))));
                }
            }
        }

        if let Err(e) = self.reorg_validator.verify(to_height) {
            self.write_gate.enter_read_only(format!("self_rebuild_failed: {e}"));
            self.event_bus.publish(Event::ReadonlyModeEntered {
                reason: "self_rebuild_failed: post-rebuild verification".to_string(),
            });
            return Some(Err(ReorgError::VerifyFailed(e.to_string())));
        }

        if self.write_gate.complete_recovery(recovery_token).is_err() {
            self.write_gate.enter_read_only("self_rebuild_failed: could not lift recovery mode");
            return Some(Err(ReorgError::CommitFailed("could not lift recovery mode after rebuild".to_string())));
        }

        for tx in detached_txs.iter().cloned() {
            self.tx_pool.resubmit(tx);
        }

        crate::metrics::reorg_committed();
        self.event_bus.publish(Event::ForkCompleted {
            process_id: session_id.to_string(),
            reverted_blocks: fork_height,
            applied_blocks,
            final_height: to_height,
        });

        Some(Ok(ReorgReport {
            session_id: session_id.to_string(),
            reverted_blocks: fork_height,
            applied_blocks,
            final_height: to_height,
        }))
    }

    /// Attempts compensation by restoring `utxo_recovery` and a fresh
    /// `index_rollback@from_height`; on any further failure the gate goes
    /// read-only and stays there until an operator intervenes.
    fn abort(
        &self,
        session_id: &str,
        fail_phase: ReorgPhase,
        abort_reason: String,
        utxo_recovery: Option<RollbackHandle>,
    ) -> Result<ReorgReport, ReorgError> {
        crate::metrics::reorg_aborted();

        let mut utxo_restored = false;
        let mut indices_rolled_back = false;
        let mut compensation_ok = true;

        if let Some(handle) = utxo_recovery {
            let from_height = handle.height;
            match self.snapshot_manager.rollback(handle) {
                Ok(()) => utxo_restored = true,
                Err(e) => {
                    compensation_ok = false;
                    tracing::error!(session_id, error = %e, "utxo_recovery restore failed during abort");
                }
            }
            if compensation_ok {
                match self.index_manager.create_rollback_point(from_height) {
                    Ok(index_handle) => match self.index_manager.rollback(index_handle) {
                        Ok(()) => indices_rolled_back = true,
                        Err(e) => {
                            compensation_ok = false;
                            tracing::error!(session_id, error = %e, "index restore failed during abort");
                        }
                    },
                    Err(e) => {
                        compensation_ok = false;
                        tracing::error!(session_id, error = %e, "index rollback point creation failed during abort");
                    }
                }
            }
        } else {
            // Prepare itself failed before any handle existed; there is
            // nothing to compensate for.
            utxo_restored = true;
            indices_rolled_back = true;
        }

        self.event_bus.publish(Event::ReorgAborted {
            session_id: session_id.to_string(),
            abort_reason: abort_reason.clone(),
            fail_phase: fail_phase.clone(),
            recovery_mode: false,
            success: compensation_ok,
        });
        self.event_bus.publish(Event::ReorgCompensation {
            session_id: session_id.to_string(),
            utxo_restored,
            indices_rolled_back,
            success: compensation_ok,
        });

        if !compensation_ok {
            let reason = format!("abort_failed: {abort_reason}");
            self.write_gate.enter_read_only(reason.clone());
            self.event_bus.publish(Event::ReadonlyModeEntered { reason: reason.clone() });
            return Err(ReorgError::AbortFailed(reason));
        }

        self.event_bus.publish(Event::ForkFailed {
            process_id: session_id.to_string(),
            fail_phase,
            error_class: abort_reason.clone(),
            recoverable: true,
        });

        Err(match abort_reason {
            r if r.starts_with("prepare_failed") => ReorgError::PrepareFailed(r),
            r if r.starts_with("rollback_failed") => ReorgError::RollbackFailed(r),
            r if r.starts_with("replay_failed") => ReorgError::ReplayFailed { height: 0, detail: r },
            r if r.starts_with("verify_failed") => ReorgError::VerifyFailed(r),
            r => ReorgError::CommitFailed(r),
        })
    }
}

struct PreparedHandles {
    utxo_recovery: RollbackHandle,
    utxo_rollback: Option<RollbackHandle>,
    index_rollback: Option<RollbackHandle>,
}

impl PreparedHandles {
    fn utxo_rollback_handle_ref(&mut self) -> Option<RollbackHandle> {
        self.utxo_rollback.take()
    }

    fn index_rollback_handle_ref(&mut self) -> Option<RollbackHandle> {
        self.index_rollback.take()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use strataforge_core::crypto::{BinaryMerkleService, Sha256HashService};
    use strataforge_core::events::NullEventBus;
    use strataforge_core::storage::{compute_state_root, Utxo};
    use strataforge_core::types::{Block, BlockHeader, OutPoint, Transaction, TransactionInput, TransactionOutput, UnlockProof};

    use crate::config::ConsensusConfig;
    use crate::store::{KvStore, SledKvStore};
    use crate::validation::{BlockValidator, NonEmptyProofVerifier};
    use crate::consensus::ForkDetector;

    use super::*;

    struct TestProvider {
        blocks: HashMap<u64, Block>,
    }

    impl BlockProvider for TestProvider {
        fn get(&self, height: u64) -> Option<Block> {
            self.blocks.get(&height).cloned()
        }
    }

    struct Harness {
        coordinator: ReorgCoordinator,
        processor: Arc<BlockProcessor>,
        utxo_store: Arc<UtxoStore>,
        write_gate: Arc<WriteGate>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let db: Arc<dyn KvStore> = Arc::new(SledKvStore::open_temporary().unwrap());
        let dir = tempfile::tempdir().unwrap();
        let hasher: Arc<dyn HashService> = Arc::new(Sha256HashService);
        let consensus = ConsensusConfig::default();

        let block_store = Arc::new(BlockStore::new(db.clone(), dir.path()));
        let utxo_store = Arc::new(UtxoStore::new(db.clone()));
        let validator = Arc::new(BlockValidator::new(
            hasher.clone(),
            Arc::new(NonEmptyProofVerifier),
            block_store.clone(),
            utxo_store.clone(),
            consensus.clone(),
        ));
        let fork_detector = Arc::new(ForkDetector::new(hasher.clone(), block_store.clone(), consensus.max_backtrack));
        let write_gate = Arc::new(WriteGate::new());
        let tx_pool = Arc::new(TxPool::new());
        let event_bus: Arc<dyn EventBus> = Arc::new(NullEventBus);

        let processor = Arc::new(BlockProcessor::new(
            hasher.clone(),
            validator,
            fork_detector,
            db.clone(),
            block_store.clone(),
            utxo_store.clone(),
            write_gate.clone(),
            tx_pool.clone(),
            event_bus.clone(),
        ));

        let snapshot_manager = Arc::new(SnapshotManager::new(db.clone(), utxo_store.clone(), hasher.clone(), 1000));
        let index_manager = Arc::new(IndexManager::new(db.clone(), block_store.clone(), hasher.clone()));
        let reorg_validator = Arc::new(ReorgValidator::new(block_store.clone(), utxo_store.clone(), hasher.clone()));

        let coordinator = ReorgCoordinator::new(
            snapshot_manager,
            index_manager,
            reorg_validator,
            write_gate.clone(),
            processor.clone(),
            tx_pool,
            block_store,
            utxo_store.clone(),
            hasher,
            event_bus,
            1000,
        );

        Harness {
            coordinator,
            processor,
            utxo_store,
            write_gate,
            _dir: dir,
        }
    }

    fn with_merkle_root(mut block: Block, hasher: &dyn HashService) -> Block {
        let leaves: Vec<[u8; 32]> = block.transactions().iter().map(|tx| hasher.hash_transaction(tx)).collect();
        block.header.merkle_root = BinaryMerkleService.root_with(hasher, &leaves);
        block
    }

    /// Every fixture block below spends at most one input and creates
    /// exactly one output, so the live set right after it applies is always
    /// that single UTXO; this computes the root `ReorgValidator` expects to
    /// find recorded at that height.
    fn single_utxo_root(hasher: &dyn HashService, tx_hash: [u8; 32], value: u64, owner: Vec<u8>, height: u64) -> [u8; 32] {
        let utxo = Utxo {
            outpoint: OutPoint::new(tx_hash, 0),
            value,
            owner,
            block_height: height,
            category: strataforge_core::types::OutputCategory::Standard,
            locking_script: vec![],
        };
        compute_state_root(hasher, &[utxo])
    }

    fn now() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
    }

    fn coinbase(value: u64) -> Transaction {
        Transaction::new(1, vec![], vec![TransactionOutput::new(value, vec![1], vec![])], 0)
    }

    fn genesis(hasher: &dyn HashService) -> Block {
        let tx = coinbase(100);
        let tx_hash = hasher.hash_transaction(&tx);
        let state_root = single_utxo_root(hasher, tx_hash, 100, vec![1], 0);
        Block::new(
            BlockHeader {
                chain_id: 1,
                version: 1,
                previous_hash: [0u8; 32],
                merkle_root: [0u8; 32],
                state_root,
                timestamp: now() - 100,
                height: 0,
                nonce: vec![],
                difficulty: 1,
            },
            vec![tx],
        )
    }

    fn spend_tx(genesis_coinbase_hash: [u8; 32], value: u64, salt: u8) -> Transaction {
        Transaction::new(
            1,
            vec![TransactionInput::new(
                OutPoint::new(genesis_coinbase_hash, 0),
                UnlockProof { public_key: vec![salt], signature: vec![salt] },
            )],
            vec![TransactionOutput::new(value, vec![salt], vec![])],
            0,
        )
    }

    fn block_at_height1(hasher: &dyn HashService, previous_hash: [u8; 32], tx: Transaction, value: u64, owner: Vec<u8>, timestamp: u64, nonce: u8) -> Block {
        let tx_hash = hasher.hash_transaction(&tx);
        let state_root = single_utxo_root(hasher, tx_hash, value, owner, 1);
        Block::new(
            BlockHeader {
                chain_id: 1,
                version: 1,
                previous_hash,
                merkle_root: [0u8; 32],
                state_root,
                timestamp,
                height: 1,
                nonce: vec![nonce],
                difficulty: 1,
            },
            vec![tx],
        )
    }

    #[test]
    fn same_height_fork_reorg_replaces_the_canonical_block() {
        let h = harness();
        let hasher = Sha256HashService;

        let genesis = with_merkle_root(genesis(&hasher), &hasher);
        let genesis_hash = hasher.hash_header(&genesis.header);
        let genesis_coinbase_hash = hasher.hash_transaction(genesis.coinbase().unwrap());
        h.processor.process(&genesis, &ValidationContext::default(), None).unwrap();

        let canonical_tx = spend_tx(genesis_coinbase_hash, 90, 1);
        let canonical_block = with_merkle_root(
            block_at_height1(&hasher, genesis_hash, canonical_tx, 90, vec![1], now() - 50, 1),
            &hasher,
        );
        h.processor.process(&canonical_block, &ValidationContext::default(), None).unwrap();

        let alt_tx = spend_tx(genesis_coinbase_hash, 80, 2);
        let alt_block = with_merkle_root(
            block_at_height1(&hasher, genesis_hash, alt_tx.clone(), 80, vec![2], now() - 40, 2),
            &hasher,
        );
        let mut provider = HashMap::new();
        provider.insert(1, alt_block);
        let provider = TestProvider { blocks: provider };

        let report = h.coordinator.execute(1, 0, 1, &provider).unwrap();
        assert_eq!(report.final_height, 1);
        assert_eq!(report.applied_blocks, 1);

        let utxos = h.utxo_store.scan_all().unwrap();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].value, 80);

        assert_eq!(h.write_gate.state_label(), "enabled_for_writes");

        let recorded_root = h.utxo_store.compute_current_state_root(&hasher).unwrap();
        let expected_root = single_utxo_root(&hasher, hasher.hash_transaction(&alt_tx), 80, vec![2], 1);
        assert_eq!(recorded_root, expected_root);
    }

    #[test]
    fn rejects_invalid_height_ordering() {
        let h = harness();
        let provider = TestProvider { blocks: HashMap::new() };
        let err = h.coordinator.execute(5, 3, 2, &provider);
        assert!(matches!(err, Err(ReorgError::InvalidHeights { .. })));
    }

    #[test]
    fn refuses_concurrent_sessions() {
        let h = harness();
        let _guard = ActiveGuard::acquire(&h.coordinator.active).unwrap();
        let provider = TestProvider { blocks: HashMap::new() };
        let err = h.coordinator.execute(1, 0, 1, &provider);
        assert!(matches!(err, Err(ReorgError::AlreadyInProgress)));
    }
}
