//! The `Reversible` capability shared by `SnapshotManager` and
//! `IndexManager`: create a rollback point, roll back to it, discard it, or
//! verify the state it describes.

use thiserror::Error;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub passed: bool,
    pub detail: String,
}

impl VerificationResult {
    pub fn ok() -> Self {
        Self { passed: true, detail: String::new() }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self { passed: false, detail: detail.into() }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReversibleError {
    #[error("rollback failed: {0}")]
    RollbackFailed(String),
    #[error("snapshot capture failed: {0}")]
    CaptureFailed(String),
    #[error("unknown or already-consumed handle")]
    UnknownHandle,
}

/// One handle per `Reversible` per session. Deliberately not `Clone`/`Copy`:
/// a handle represents exclusive ownership of a captured rollback point, and
/// must be explicitly consumed by `rollback` or `discard`. Dropping one
/// without consuming it is a bug — `Drop` logs it rather than silently
/// leaking, since a panic here would tear down the coordinator mid-REORG.
pub struct RollbackHandle {
    pub id: u64,
    pub height: u64,
    pub created_at: i64,
    pub kind: &'static str,
    consumed: bool,
}

impl RollbackHandle {
    pub fn new(id: u64, height: u64, created_at: i64, kind: &'static str) -> Self {
        Self {
            id,
            height,
            created_at,
            kind,
            consumed: false,
        }
    }

    pub fn mark_consumed(mut self) {
        self.consumed = true;
    }
}

impl Drop for RollbackHandle {
    fn drop(&mut self) {
        if !self.consumed {
            error!(
                handle_id = self.id,
                height = self.height,
                kind = self.kind,
                "handle_leaked: RollbackHandle dropped without rollback() or discard()"
            );
        }
    }
}

/// Capability implemented by `SnapshotManager` (over the UTXO set) and
/// `IndexManager` (over block/tx/resource indices).
pub trait Reversible {
    fn create_rollback_point(&self, height: u64) -> Result<RollbackHandle, ReversibleError>;
    fn rollback(&self, handle: RollbackHandle) -> Result<(), ReversibleError>;
    fn discard(&self, handle: RollbackHandle) -> Result<(), ReversibleError>;
    fn verify(&self, expected_height: u64) -> VerificationResult;
}
