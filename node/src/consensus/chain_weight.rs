//! Chain-segment weight and its strict total order.

use std::cmp::Ordering;

/// Weight of a chain segment `[fork_height+1 .. tip]`. `last_block_time` is
/// observation-only and used solely as the legacy tie-break of last resort;
/// it must never be a primary comparison key since miners can manipulate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainWeight {
    pub cumulative_difficulty: u128,
    pub block_count: u64,
    pub tip_hash: [u8; 32],
    pub last_block_time: i64,
}

impl ChainWeight {
    pub fn new(cumulative_difficulty: u128, block_count: u64, tip_hash: [u8; 32], last_block_time: i64) -> Self {
        Self {
            cumulative_difficulty,
            block_count,
            tip_hash,
            last_block_time,
        }
    }
}

impl PartialOrd for ChainWeight {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Strict lexicographic order: higher cumulative difficulty wins; ties break
/// on a longer segment; ties on that break on a lexicographically *smaller*
/// tip hash (deterministic, non-manipulable); only if hashes are
/// byte-identical does the legacy timestamp fallback apply (earlier wins).
impl Ord for ChainWeight {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cumulative_difficulty
            .cmp(&other.cumulative_difficulty)
            .then_with(|| self.block_count.cmp(&other.block_count))
            .then_with(|| other.tip_hash.cmp(&self.tip_hash))
            .then_with(|| other.last_block_time.cmp(&self.last_block_time))
    }
}
