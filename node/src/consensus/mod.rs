pub mod chain_weight;
pub mod fork_detector;

pub use chain_weight::ChainWeight;
pub use fork_detector::{AncestorError, ForkDetectError, ForkDetector, ForkOutcome};
