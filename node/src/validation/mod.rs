pub mod failure;
pub mod signature;
pub mod validator;

pub use failure::ValidationFailure;
pub use signature::{Ed25519SignatureVerifier, NonEmptyProofVerifier, SignatureVerifier};
pub use validator::{BlockValidator, ValidationContext};
