//! Process-wide write fence. Exactly one logical writer may hold the fence
//! at a time; every write path must present its token (or the ambient
//! "no fence active" state) before touching durable storage.

use std::sync::Mutex;

use thiserror::Error;

/// Opaque, non-forgeable proof of write authorization. The inner value is
/// private: the only way to obtain one is through `WriteGate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceToken(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
enum GateState {
    EnabledForWrites,
    WriteFenced(FenceToken),
    ReadOnly(String),
}

struct GateInner {
    state: GateState,
    recovery_token: Option<FenceToken>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("write refused: fence held for another operation ({operation})")]
    Fenced { operation: String },
    #[error("write refused: node is in read-only mode ({reason})")]
    ReadOnly { reason: String },
    #[error("a write fence is already held")]
    AlreadyFenced,
    #[error("no write fence is currently held")]
    NotFenced,
    #[error("token does not match the active fence or recovery grant")]
    InvalidToken,
    #[error("recovery mode may only be entered while read-only")]
    NotReadOnly,
}

pub struct WriteGate {
    inner: Mutex<GateInner>,
}

impl Default for WriteGate {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteGate {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GateInner {
                state: GateState::EnabledForWrites,
                recovery_token: None,
            }),
        }
    }

    /// Raises the fence for a named operation (e.g. `"reorg"`), returning the
    /// token that must accompany every write while it is held.
    pub fn enable_write_fence(&self) -> Result<FenceToken, GateError> {
        let mut inner = self.inner.lock().expect("write gate lock poisoned");
        if !matches!(inner.state, GateState::EnabledForWrites) {
            return Err(GateError::AlreadyFenced);
        }
        let token = FenceToken(rand::random());
        inner.state = GateState::WriteFenced(token);
        Ok(token)
    }

    pub fn disable_write_fence(&self, token: FenceToken) -> Result<(), GateError> {
        let mut inner = self.inner.lock().expect("write gate lock poisoned");
        match &inner.state {
            GateState::WriteFenced(held) if *held == token => {
                inner.state = GateState::EnabledForWrites;
                Ok(())
            }
            GateState::WriteFenced(_) => Err(GateError::InvalidToken),
            _ => Err(GateError::NotFenced),
        }
    }

    /// Terminal: refuses all writes except through a subsequently granted
    /// recovery token. There is no path back except `complete_recovery`.
    pub fn enter_read_only(&self, reason: impl Into<String>) {
        let mut inner = self.inner.lock().expect("write gate lock poisoned");
        inner.state = GateState::ReadOnly(reason.into());
        inner.recovery_token = None;
    }

    /// Grants a narrow write allowance used only by the self-rebuild path
    /// while the gate is otherwise read-only.
    pub fn enter_recovery_mode(&self) -> Result<FenceToken, GateError> {
        let mut inner = self.inner.lock().expect("write gate lock poisoned");
        if !matches!(inner.state, GateState::ReadOnly(_)) {
            return Err(GateError::NotReadOnly);
        }
        let token = FenceToken(rand::random());
        inner.recovery_token = Some(token);
        Ok(token)
    }

    /// Called once a recovery rebuild finishes successfully: restores normal
    /// write access.
    pub fn complete_recovery(&self, token: FenceToken) -> Result<(), GateError> {
        let mut inner = self.inner.lock().expect("write gate lock poisoned");
        match inner.recovery_token {
            Some(held) if held == token => {
                inner.state = GateState::EnabledForWrites;
                inner.recovery_token = None;
                Ok(())
            }
            _ => Err(GateError::InvalidToken),
        }
    }

    pub fn assert_write_allowed(&self, presented: Option<FenceToken>, operation: &str) -> Result<(), GateError> {
        let inner = self.inner.lock().expect("write gate lock poisoned");
        match &inner.state {
            GateState::EnabledForWrites => Ok(()),
            GateState::WriteFenced(held) => {
                if presented == Some(*held) {
                    Ok(())
                } else {
                    Err(GateError::Fenced {
                        operation: operation.to_string(),
                    })
                }
            }
            GateState::ReadOnly(reason) => {
                if presented.is_some() && presented == inner.recovery_token {
                    Ok(())
                } else {
                    Err(GateError::ReadOnly { reason: reason.clone() })
                }
            }
        }
    }

    pub fn state_label(&self) -> &'static str {
        let inner = self.inner.lock().expect("write gate lock poisoned");
        match inner.state {
            GateState::EnabledForWrites => "enabled_for_writes",
            GateState::WriteFenced(_) => "write_fenced",
            GateState::ReadOnly(_) => "read_only",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.inner.lock().expect("write gate lock poisoned").state, GateState::ReadOnly(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_writes_pass_with_no_token() {
        let gate = WriteGate::new();
        assert!(gate.assert_write_allowed(None, "process_block").is_ok());
    }

    #[test]
    fn fence_blocks_writes_without_the_token() {
        let gate = WriteGate::new();
        let token = gate.enable_write_fence().unwrap();
        assert!(gate.assert_write_allowed(None, "process_block").is_err());
        assert!(gate.assert_write_allowed(Some(token), "reorg_replay").is_ok());
    }

    #[test]
    fn double_fence_is_rejected() {
        let gate = WriteGate::new();
        let _token = gate.enable_write_fence().unwrap();
        assert_eq!(gate.enable_write_fence(), Err(GateError::AlreadyFenced));
    }

    #[test]
    fn disable_requires_matching_token() {
        let gate = WriteGate::new();
        let token = gate.enable_write_fence().unwrap();
        let forged = FenceToken(token.0.wrapping_add(1));
        assert_eq!(gate.disable_write_fence(forged), Err(GateError::InvalidToken));
        assert!(gate.disable_write_fence(token).is_ok());
    }

    #[test]
    fn read_only_blocks_everything_but_recovery_token() {
        let gate = WriteGate::new();
        gate.enter_read_only("corruption detected");
        assert!(gate.assert_write_allowed(None, "process_block").is_err());

        let recovery = gate.enter_recovery_mode().unwrap();
        assert!(gate.assert_write_allowed(Some(recovery), "rebuild").is_ok());

        gate.complete_recovery(recovery).unwrap();
        assert_eq!(gate.state_label(), "enabled_for_writes");
    }

    #[test]
    fn recovery_mode_requires_read_only_state() {
        let gate = WriteGate::new();
        assert_eq!(gate.enter_recovery_mode(), Err(GateError::NotReadOnly));
    }
}
