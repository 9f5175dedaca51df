pub mod coordinator;
pub mod index_manager;
pub mod reversible;
pub mod snapshot;
pub mod validator;
pub mod write_gate;

pub use coordinator::{ReorgCoordinator, ReorgError, ReorgReport};
pub use index_manager::IndexManager;
pub use reversible::{Reversible, ReversibleError, RollbackHandle};
pub use snapshot::SnapshotManager;
pub use validator::{ReorgValidator, ReorgVerifyError};
pub use write_gate::{FenceToken, GateError, WriteGate};
