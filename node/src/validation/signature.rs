//! Pluggable signature verification. The exact scheme is a seam
//! (`BlockValidator` only needs *a* verifier, not a particular one,
//! mirroring how `strataforge_core::crypto::HashService` keeps the hash
//! primitive pluggable), but the production implementation must actually
//! verify a signature: an output's `owner` is the spender's Ed25519 public
//! key, and `UnlockProof` carries the key the spend claims plus a signature
//! over the outpoint being spent.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use strataforge_core::storage::Utxo;
use strataforge_core::types::TransactionInput;

pub trait SignatureVerifier: Send + Sync {
    /// Returns whether `input`'s unlock proof authorizes spending `spent`.
    fn verify(&self, input: &TransactionInput, spent: &Utxo) -> bool;
}

/// Ed25519 verifier: `spent.owner` is the 32-byte public key that must own
/// the output, `unlock.public_key` must match it exactly, and
/// `unlock.signature` must be a valid 64-byte Ed25519 signature over the
/// spent outpoint's canonical key bytes.
#[derive(Debug, Clone, Default)]
pub struct Ed25519SignatureVerifier;

impl SignatureVerifier for Ed25519SignatureVerifier {
    fn verify(&self, input: &TransactionInput, spent: &Utxo) -> bool {
        if input.unlock.public_key != spent.owner {
            return false;
        }
        let Ok(key_bytes) = <[u8; 32]>::try_from(spent.owner.as_slice()) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(input.unlock.signature.as_slice()) else {
            return false;
        };
        let signature = Signature::from_bytes(&sig_bytes);
        verifying_key
            .verify(&input.previous_output.to_key_bytes(), &signature)
            .is_ok()
    }
}

/// Structural-only verifier used by test harnesses that can't produce a real
/// Ed25519 keypair and signature inline: accepts any non-empty public key and
/// signature without checking either. Never wired into a production path.
#[derive(Debug, Clone, Default)]
pub struct NonEmptyProofVerifier;

impl SignatureVerifier for NonEmptyProofVerifier {
    fn verify(&self, input: &TransactionInput, _spent: &Utxo) -> bool {
        !input.unlock.public_key.is_empty() && !input.unlock.signature.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use strataforge_core::types::{OutPoint, OutputCategory, UnlockProof};

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn spent_for(owner: Vec<u8>) -> Utxo {
        Utxo {
            outpoint: OutPoint::new([1u8; 32], 0),
            value: 10,
            owner,
            block_height: 1,
            category: OutputCategory::Standard,
            locking_script: vec![],
        }
    }

    #[test]
    fn rejects_empty_signature_under_non_empty_proof_verifier() {
        let verifier = NonEmptyProofVerifier;
        let input = TransactionInput::new(
            OutPoint::new([1u8; 32], 0),
            UnlockProof { public_key: vec![1], signature: vec![] },
        );
        assert!(!verifier.verify(&input, &spent_for(vec![1])));
    }

    #[test]
    fn accepts_populated_proof_under_non_empty_proof_verifier() {
        let verifier = NonEmptyProofVerifier;
        let input = TransactionInput::new(
            OutPoint::new([1u8; 32], 0),
            UnlockProof { public_key: vec![1], signature: vec![2] },
        );
        assert!(verifier.verify(&input, &spent_for(vec![1])));
    }

    #[test]
    fn ed25519_accepts_a_signature_over_the_spent_outpoint() {
        let key = signing_key();
        let owner = key.verifying_key().to_bytes().to_vec();
        let outpoint = OutPoint::new([1u8; 32], 0);
        let signature = key.sign(&outpoint.to_key_bytes());

        let verifier = Ed25519SignatureVerifier;
        let input = TransactionInput::new(
            outpoint,
            UnlockProof { public_key: owner.clone(), signature: signature.to_bytes().to_vec() },
        );
        assert!(verifier.verify(&input, &spent_for(owner)));
    }

    #[test]
    fn ed25519_rejects_a_signature_from_the_wrong_key() {
        let key = signing_key();
        let wrong_key = SigningKey::from_bytes(&[9u8; 32]);
        let owner = key.verifying_key().to_bytes().to_vec();
        let outpoint = OutPoint::new([1u8; 32], 0);
        let signature = wrong_key.sign(&outpoint.to_key_bytes());

        let verifier = Ed25519SignatureVerifier;
        let input = TransactionInput::new(
            outpoint,
            UnlockProof {
                public_key: wrong_key.verifying_key().to_bytes().to_vec(),
                signature: signature.to_bytes().to_vec(),
            },
        );
        assert!(!verifier.verify(&input, &spent_for(owner)));
    }

    #[test]
    fn ed25519_rejects_a_signature_over_a_different_outpoint() {
        let key = signing_key();
        let owner = key.verifying_key().to_bytes().to_vec();
        let signed_outpoint = OutPoint::new([1u8; 32], 0);
        let claimed_outpoint = OutPoint::new([2u8; 32], 0);
        let signature = key.sign(&signed_outpoint.to_key_bytes());

        let verifier = Ed25519SignatureVerifier;
        let input = TransactionInput::new(
            claimed_outpoint,
            UnlockProof { public_key: owner.clone(), signature: signature.to_bytes().to_vec() },
        );
        assert!(!verifier.verify(&input, &spent_for(owner)));
    }
}
