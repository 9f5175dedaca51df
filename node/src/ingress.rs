//! The single entry point incoming blocks and transactions arrive through.
//! `submit_block` drives validation/processing and, on a detected fork,
//! weighs the competing segment against the canonical one before deciding
//! whether to hand off to `ReorgCoordinator`.

use std::sync::Arc;

use strataforge_core::crypto::HashService;
use strataforge_core::events::ForkKind;
use strataforge_core::types::{Block, Transaction};
use tracing::{info, warn};

use crate::consensus::{ChainWeight, ForkDetector};
use crate::mempool::TxPool;
use crate::processor::{BlockProcessor, ProcessOutcome};
use crate::provider::BlockProvider;
use crate::reorg::ReorgCoordinator;
use crate::store::BlockStore;
use crate::validation::ValidationContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitBlockOutcome {
    Accepted { height: u64 },
    Rejected(String),
    /// A fork was seen but this node cannot yet act on it: the competing
    /// segment is either not heavier than the canonical one, or the common
    /// ancestor search ran out of material. The gossip layer should keep
    /// feeding the alternative branch and retry.
    ForkPending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitTxOutcome {
    Accepted { hash: [u8; 32] },
    Rejected(String),
}

/// A `BlockProvider` that serves one known block directly and falls back to
/// an external supplier (typically the gossip layer's peer-fetch) for every
/// other height. Used so fork-weight comparison and replay can see the
/// just-submitted block without requiring the caller to have registered it
/// anywhere else first.
struct ChainedProvider<'a> {
    known: &'a Block,
    fallback: &'a dyn BlockProvider,
}

impl BlockProvider for ChainedProvider<'_> {
    fn get(&self, height: u64) -> Option<Block> {
        if self.known.header.height == height {
            Some(self.known.clone())
        } else {
            self.fallback.get(height)
        }
    }
}

pub struct Ingress {
    hasher: Arc<dyn HashService>,
    processor: Arc<BlockProcessor>,
    fork_detector: Arc<ForkDetector>,
    coordinator: Arc<ReorgCoordinator>,
    block_store: Arc<BlockStore>,
    tx_pool: Arc<TxPool>,
    provider: Arc<dyn BlockProvider>,
}

impl Ingress {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hasher: Arc<dyn HashService>,
        processor: Arc<BlockProcessor>,
        fork_detector: Arc<ForkDetector>,
        coordinator: Arc<ReorgCoordinator>,
        block_store: Arc<BlockStore>,
        tx_pool: Arc<TxPool>,
        provider: Arc<dyn BlockProvider>,
    ) -> Self {
        Self {
            hasher,
            processor,
            fork_detector,
            coordinator,
            block_store,
            tx_pool,
            provider,
        }
    }

    pub fn submit_block(&self, block: Block) -> SubmitBlockOutcome {
        let outcome = self.processor.process(&block, &ValidationContext::default(), None);

        match outcome {
            Ok(ProcessOutcome::Applied { height, .. }) | Ok(ProcessOutcome::AlreadyApplied { height, .. }) => {
                SubmitBlockOutcome::Accepted { height }
            }
            Ok(ProcessOutcome::ForkDetected(kind)) => self.handle_fork(kind, &block),
            Err(e) => {
                warn!(error = %e, "block rejected");
                SubmitBlockOutcome::Rejected(e.to_string())
            }
        }
    }

    pub fn submit_transaction(&self, tx: Transaction) -> SubmitTxOutcome {
        match self.tx_pool.submit_tx(tx) {
            Ok(hash) => SubmitTxOutcome::Accepted { hash },
            Err(e) => SubmitTxOutcome::Rejected(e.to_string()),
        }
    }

    fn handle_fork(&self, kind: ForkKind, block: &Block) -> SubmitBlockOutcome {
        let (from_height, _) = match self.block_store.tip() {
            Ok(Some(t)) => t,
            Ok(None) => (0, [0u8; 32]),
            Err(e) => return SubmitBlockOutcome::Rejected(e.to_string()),
        };

        let fork_height = match kind {
            ForkKind::SameHeight => from_height.saturating_sub(1),
            ForkKind::ChainBreak => {
                let candidate_parent_height = block.header.height.saturating_sub(1);
                match self.fork_detector.find_common_ancestor(self.provider.as_ref(), candidate_parent_height) {
                    Ok(h) => h,
                    Err(e) => {
                        info!(error = %e, "fork pending: common ancestor not yet resolvable");
                        return SubmitBlockOutcome::ForkPending;
                    }
                }
            }
        };

        let to_height = block.header.height;
        let chained = ChainedProvider {
            known: block,
            fallback: self.provider.as_ref(),
        };

        let canonical_weight = match self.segment_weight(fork_height + 1, from_height, self.block_store.as_ref()) {
            Ok(w) => w,
            Err(e) => return SubmitBlockOutcome::Rejected(e),
        };
        let alt_weight = match self.segment_weight_via(fork_height + 1, to_height, &chained) {
            Ok(w) => w,
            Err(e) => {
                info!(reason = %e, "fork pending: alt segment not fully retrievable");
                return SubmitBlockOutcome::ForkPending;
            }
        };

        if alt_weight <= canonical_weight {
            return SubmitBlockOutcome::ForkPending;
        }

        match self.coordinator.execute(from_height, fork_height, to_height, &chained) {
            Ok(report) => SubmitBlockOutcome::Accepted { height: report.final_height },
            Err(e) => SubmitBlockOutcome::Rejected(e.to_string()),
        }
    }

    fn segment_weight(&self, from: u64, to: u64, store: &BlockStore) -> Result<ChainWeight, String> {
        let mut blocks = Vec::new();
        for h in from..=to {
            match store.get_block_by_height(h) {
                Ok(Some(b)) => blocks.push(b),
                Ok(None) => return Err(format!("local block at height {h} missing")),
                Err(e) => return Err(e.to_string()),
            }
        }
        Ok(self.weight_of(&blocks))
    }

    fn segment_weight_via(&self, from: u64, to: u64, provider: &dyn BlockProvider) -> Result<ChainWeight, String> {
        let mut blocks = Vec::new();
        for h in from..=to {
            match provider.get(h) {
                Some(b) => blocks.push(b),
                None => return Err(format!("alt block at height {h} unavailable from provider")),
            }
        }
        Ok(self.weight_of(&blocks))
    }

    fn weight_of(&self, blocks: &[Block]) -> ChainWeight {
        let cumulative_difficulty: u128 = blocks.iter().map(|b| b.header.difficulty as u128).sum();
        let block_count = blocks.len() as u64;
        let tip = blocks.last();
        let tip_hash = tip.map(|b| self.hasher.hash_header(&b.header)).unwrap_or([0u8; 32]);
        let last_block_time = tip.map(|b| b.header.timestamp as i64).unwrap_or(0);
        ChainWeight::new(cumulative_difficulty, block_count, tip_hash, last_block_time)
    }
}
