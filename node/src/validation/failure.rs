use thiserror::Error;

/// Typed block-rejection reason. Carries the height so operators can
/// correlate a rejection with the offending submission without re-parsing
/// the block.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("structure invalid at height {height}: {detail}")]
    Structure { height: u64, detail: String },
    #[error("header invalid at height {height}: {detail}")]
    Header { height: u64, detail: String },
    #[error("chain connectivity invalid at height {height}: {detail}")]
    Chain { height: u64, detail: String },
    #[error("proof of work invalid at height {height}: {detail}")]
    Pow { height: u64, detail: String },
    #[error("merkle root invalid at height {height}: {detail}")]
    Merkle { height: u64, detail: String },
    #[error("transaction invalid at height {height}: {detail}")]
    Transaction { height: u64, detail: String },
}

impl ValidationFailure {
    pub fn height(&self) -> u64 {
        match self {
            ValidationFailure::Structure { height, .. }
            | ValidationFailure::Header { height, .. }
            | ValidationFailure::Chain { height, .. }
            | ValidationFailure::Pow { height, .. }
            | ValidationFailure::Merkle { height, .. }
            | ValidationFailure::Transaction { height, .. } => *height,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ValidationFailure::Structure { .. } => "structure",
            ValidationFailure::Header { .. } => "header",
            ValidationFailure::Chain { .. } => "chain",
            ValidationFailure::Pow { .. } => "pow",
            ValidationFailure::Merkle { .. } => "merkle",
            ValidationFailure::Transaction { .. } => "tx",
        }
    }
}
