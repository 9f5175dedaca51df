//! The block supplier seam required by REORG replay and fork-ancestor
//! discovery. Gossip/sync is an external collaborator (out of scope); this
//! is the only interface the core consumes from it.

use strataforge_core::types::Block;

/// Supplies blocks by height from whatever branch is currently being
/// considered. Implementations may block on network I/O; the single-writer
/// scheduling model tolerates that (see the concurrency notes on
/// `ReorgCoordinator::replay`).
pub trait BlockProvider: Send + Sync {
    /// Returns the block at `height` on the branch this provider represents,
    /// if available. Callers may assume `block.header.height == height` on
    /// `Some`.
    fn get(&self, height: u64) -> Option<Block>;
}
