pub mod hash;
pub mod merkle;

pub use hash::{Blake3HashService, HashService, Sha256HashService};
pub use merkle::{BinaryMerkleService, MerkleError, MerkleProof, MerkleResult, MerkleService};
