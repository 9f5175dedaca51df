//! In-process event bus wiring `strataforge_core::EventBus` to a broadcast
//! channel, plus a `tracing` mirror of every event for operator-facing logs.

use strataforge_core::{Event, EventBus};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Broadcast-channel backed event bus. Subscribers that fall behind miss
/// events rather than ever blocking the writer path — publishing never
/// gates on a subscriber's reception.
pub struct ChannelEventBus {
    sender: broadcast::Sender<Event>,
}

impl ChannelEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    fn log(event: &Event) {
        match event {
            Event::BlockProcessed { height, hash } => {
                info!(height, hash = %hex::encode(hash), "block.processed");
            }
            Event::ForkDetected { kind, height, block_hash } => {
                warn!(?kind, height, hash = %hex::encode(block_hash), "fork.detected");
            }
            Event::ReorgPhaseStarted { session_id, phase, from_height, fork_height, to_height } => {
                info!(session_id, ?phase, from_height, fork_height, to_height, "reorg.phase.started");
            }
            Event::ReorgPhaseCompleted { session_id, phase, duration_ms } => {
                info!(session_id, ?phase, duration_ms, "reorg.phase.completed");
            }
            Event::ReorgAborted { session_id, abort_reason, fail_phase, recovery_mode, success } => {
                warn!(session_id, abort_reason, ?fail_phase, recovery_mode, success, "reorg.aborted");
            }
            Event::ReorgCompensation { session_id, utxo_restored, indices_rolled_back, success } => {
                warn!(session_id, utxo_restored, indices_rolled_back, success, "reorg.compensation");
            }
            Event::ForkCompleted { process_id, reverted_blocks, applied_blocks, final_height } => {
                info!(process_id, reverted_blocks, applied_blocks, final_height, "fork.completed");
            }
            Event::ForkFailed { process_id, fail_phase, error_class, recoverable } => {
                warn!(process_id, ?fail_phase, error_class, recoverable, "fork.failed");
            }
            Event::CorruptionDetected { component, phase, severity, height, err_class } => {
                tracing::error!(component, phase, severity, ?height, err_class, "corruption.detected");
            }
            Event::ReadonlyModeEntered { reason } => {
                tracing::error!(reason, "readonly_mode_entered");
            }
        }
    }
}

impl EventBus for ChannelEventBus {
    fn publish(&self, event: Event) {
        Self::log(&event);
        // A send error just means there are currently no subscribers; that
        // is not a delivery failure the writer path needs to know about.
        let _ = self.sender.send(event);
    }
}
