//! Fire-and-forget domain event bus.
//!
//! Events are published strictly after the corresponding on-disk commit —
//! callers must never gate correctness on a subscriber receiving one of
//! these. `EventBus` is the trait node components depend on; production
//! wiring picks an mpsc-channel-backed implementation.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkKind {
    SameHeight,
    ChainBreak,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorgPhase {
    Prepare,
    Rollback,
    Replay,
    Verify,
    Commit,
}

#[derive(Debug, Clone)]
pub enum Event {
    BlockProcessed {
        height: u64,
        hash: [u8; 32],
    },
    ForkDetected {
        kind: ForkKind,
        height: u64,
        block_hash: [u8; 32],
    },
    ReorgPhaseStarted {
        session_id: String,
        phase: ReorgPhase,
        from_height: u64,
        fork_height: u64,
        to_height: u64,
    },
    ReorgPhaseCompleted {
        session_id: String,
        phase: ReorgPhase,
        duration_ms: u64,
    },
    ReorgAborted {
        session_id: String,
        abort_reason: String,
        fail_phase: ReorgPhase,
        recovery_mode: bool,
        success: bool,
    },
    ReorgCompensation {
        session_id: String,
        utxo_restored: bool,
        indices_rolled_back: bool,
        success: bool,
    },
    ForkCompleted {
        process_id: String,
        reverted_blocks: u64,
        applied_blocks: u64,
        final_height: u64,
    },
    ForkFailed {
        process_id: String,
        fail_phase: ReorgPhase,
        error_class: String,
        recoverable: bool,
    },
    CorruptionDetected {
        component: String,
        phase: String,
        severity: String,
        height: Option<u64>,
        err_class: String,
    },
    ReadonlyModeEntered {
        reason: String,
    },
}

/// Publishes events to whatever downstream subscribers exist.
///
/// Implementations must never block the writer path on delivery; an
/// in-process broadcast channel (as used by `node::events::ChannelEventBus`)
/// satisfies this by dropping events to lagging subscribers rather than
/// back-pressuring the chain-state writer.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: Event);
}

/// No-op bus useful for tests that don't care about event delivery.
#[derive(Debug, Default, Clone)]
pub struct NullEventBus;

impl EventBus for NullEventBus {
    fn publish(&self, _event: Event) {}
}
