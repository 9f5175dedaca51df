//! Divergence detection against the canonical chain, and common-ancestor
//! discovery once a fork is confirmed.

use std::sync::Arc;

use strataforge_core::crypto::HashService;
use strataforge_core::events::ForkKind;
use strataforge_core::types::Block;
use thiserror::Error;

use crate::provider::BlockProvider;
use crate::store::BlockStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkOutcome {
    CanonicalExtension,
    Fork(ForkKind),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForkDetectError {
    #[error("block at height {height} is beyond tip+1; sync must fill the gap")]
    Discontinuity { height: u64 },
    #[error("store error: {0}")]
    Store(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AncestorError {
    #[error("common ancestor not found within max_backtrack={max_backtrack}")]
    MaxBacktrackExceeded { max_backtrack: u64 },
    #[error("ancestor at height {height} is not locally retrievable; sync must supply it")]
    AncestorUnavailable { height: u64 },
    #[error("store error: {0}")]
    Store(String),
}

pub struct ForkDetector {
    hasher: Arc<dyn HashService>,
    block_store: Arc<BlockStore>,
    max_backtrack: u64,
}

impl ForkDetector {
    pub fn new(hasher: Arc<dyn HashService>, block_store: Arc<BlockStore>, max_backtrack: u64) -> Self {
        Self {
            hasher,
            block_store,
            max_backtrack,
        }
    }

    pub fn detect(&self, block: &Block) -> Result<ForkOutcome, ForkDetectError> {
        let (tip_height, _tip_hash) = self
            .block_store
            .tip()
            .map_err(|e| ForkDetectError::Store(e.to_string()))?
            .unwrap_or((0, [0u8; 32]));
        let h = block.header.height;

        if h == tip_height + 1 {
            let parent = self
                .block_store
                .get_block_by_height(tip_height)
                .map_err(|e| ForkDetectError::Store(e.to_string()))?;
            let canonical_hash = parent.as_ref().map(|p| self.hasher.hash_header(&p.header));
            if canonical_hash == Some(block.header.previous_hash) || (tip_height == 0 && canonical_hash.is_none()) {
                return Ok(ForkOutcome::CanonicalExtension);
            }
            return Ok(ForkOutcome::Fork(ForkKind::ChainBreak));
        }

        if h <= tip_height {
            if h == 0 {
                // Genesis never forks; a duplicate genesis submission is
                // handled by BlockProcessor's idempotent re-entry check.
                return Ok(ForkOutcome::CanonicalExtension);
            }
            let parent = self
                .block_store
                .get_block_by_height(h - 1)
                .map_err(|e| ForkDetectError::Store(e.to_string()))?;
            let canonical_parent_hash = parent.map(|p| self.hasher.hash_header(&p.header));
            if canonical_parent_hash == Some(block.header.previous_hash) {
                return Ok(ForkOutcome::Fork(ForkKind::SameHeight));
            }
            return Ok(ForkOutcome::Fork(ForkKind::ChainBreak));
        }

        Err(ForkDetectError::Discontinuity { height: h })
    }

    /// Walks the competing branch backward from `candidate_tip_height` via
    /// `provider`, comparing each ancestor's hash to our canonical chain,
    /// until the first height where they agree. Bounded by `max_backtrack`.
    pub fn find_common_ancestor(
        &self,
        provider: &dyn BlockProvider,
        candidate_tip_height: u64,
    ) -> Result<u64, AncestorError> {
        let mut height = candidate_tip_height;
        let mut steps = 0u64;

        loop {
            let candidate_block = provider
                .get(height)
                .ok_or(AncestorError::AncestorUnavailable { height })?;
            let candidate_hash = self.hasher.hash_header(&candidate_block.header);

            let canonical_hash = self
                .block_store
                .get_block_by_height(height)
                .map_err(|e| AncestorError::Store(e.to_string()))?
                .map(|b| self.hasher.hash_header(&b.header));

            if canonical_hash == Some(candidate_hash) {
                return Ok(height);
            }

            if height == 0 {
                return Err(AncestorError::AncestorUnavailable { height: 0 });
            }
            steps += 1;
            if steps > self.max_backtrack {
                return Err(AncestorError::MaxBacktrackExceeded {
                    max_backtrack: self.max_backtrack,
                });
            }
            height -= 1;
        }
    }
}
