//! StrataForge core: canonical types, pluggable hashing/Merkle primitives,
//! the UTXO record type and its deterministic state-root derivation, and the
//! domain event taxonomy shared between the chain engine and its observers.

pub mod crypto;
pub mod events;
pub mod storage;
pub mod types;

pub use events::{Event, EventBus, ForkKind, NullEventBus, ReorgPhase};
