//! Binary Merkle tree over transaction hashes.
//!
//! Covers root computation and inclusion-proof verification; proof
//! generation is retained since `MerkleService::verify_root` leans on it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::hash::HashService;

#[derive(Debug, Error)]
pub enum MerkleError {
    #[error("index {0} out of bounds")]
    IndexOutOfBounds(usize),
    #[error("empty tree has no proof")]
    EmptyTree,
}

pub type MerkleResult<T> = Result<T, MerkleError>;

/// Builds and verifies Merkle roots over a set of leaf hashes.
pub trait MerkleService: Send + Sync {
    fn root(&self, leaves: &[[u8; 32]]) -> [u8; 32];

    fn verify_root(&self, leaves: &[[u8; 32]], expected_root: [u8; 32]) -> bool {
        self.root(leaves) == expected_root
    }
}

#[derive(Debug, Clone)]
pub struct BinaryMerkleService;

impl BinaryMerkleService {
    fn hash_pair(hasher: &dyn HashService, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let mut combined = Vec::with_capacity(64);
        combined.extend_from_slice(left);
        combined.extend_from_slice(right);
        hasher.hash_bytes(&combined)
    }

    fn build_levels(hasher: &dyn HashService, leaves: &[[u8; 32]]) -> Vec<Vec<[u8; 32]>> {
        let mut levels = vec![leaves.to_vec()];
        while levels.last().map(|l| l.len()).unwrap_or(0) > 1 {
            let current = levels.last().expect("checked non-empty above");
            let mut next = Vec::with_capacity((current.len() + 1) / 2);
            for pair in current.chunks(2) {
                if pair.len() == 2 {
                    next.push(Self::hash_pair(hasher, &pair[0], &pair[1]));
                } else {
                    next.push(pair[0]);
                }
            }
            levels.push(next);
        }
        levels
    }

    /// Root computation parameterized by a `HashService` so the Merkle tree's
    /// internal node hash agrees with the same pluggable primitive as block
    /// and transaction hashing.
    pub fn root_with(&self, hasher: &dyn HashService, leaves: &[[u8; 32]]) -> [u8; 32] {
        if leaves.is_empty() {
            return [0u8; 32];
        }
        let levels = Self::build_levels(hasher, leaves);
        *levels.last().and_then(|l| l.first()).unwrap_or(&[0u8; 32])
    }
}

impl MerkleService for BinaryMerkleService {
    fn root(&self, leaves: &[[u8; 32]]) -> [u8; 32] {
        self.root_with(&crate::crypto::hash::Sha256HashService, leaves)
    }
}

/// Inclusion proof for a single leaf, kept for completeness even though the
/// chain core itself only needs root computation/verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_hash: [u8; 32],
    pub lemma: Vec<[u8; 32]>,
    pub path_indices: Vec<u8>,
    pub root_hash: [u8; 32],
}

pub fn create_proof(leaves: &[[u8; 32]], index: usize) -> MerkleResult<MerkleProof> {
    if leaves.is_empty() {
        return Err(MerkleError::EmptyTree);
    }
    if index >= leaves.len() {
        return Err(MerkleError::IndexOutOfBounds(index));
    }
    let hasher = crate::crypto::hash::Sha256HashService;
    let levels = BinaryMerkleService::build_levels(&hasher, leaves);
    let root_hash = *levels.last().and_then(|l| l.first()).unwrap_or(&[0u8; 32]);

    let mut lemma = Vec::new();
    let mut path_indices = Vec::new();
    let mut current_index = index;
    for level in &levels[..levels.len() - 1] {
        let sibling_index = if current_index % 2 == 0 {
            current_index + 1
        } else {
            current_index - 1
        };
        path_indices.push((current_index % 2) as u8);
        if sibling_index < level.len() {
            lemma.push(level[sibling_index]);
        } else {
            lemma.push(level[current_index]);
        }
        current_index /= 2;
    }

    Ok(MerkleProof {
        leaf_hash: leaves[index],
        lemma,
        path_indices,
        root_hash,
    })
}

pub fn verify_proof(proof: &MerkleProof) -> bool {
    let hasher = crate::crypto::hash::Sha256HashService;
    if proof.lemma.is_empty() {
        return proof.leaf_hash == proof.root_hash;
    }
    let mut current = proof.leaf_hash;
    for (sibling, path_index) in proof.lemma.iter().zip(proof.path_indices.iter()) {
        current = if *path_index == 0 {
            BinaryMerkleService::hash_pair(&hasher, &current, sibling)
        } else {
            BinaryMerkleService::hash_pair(&hasher, sibling, &current)
        };
    }
    current == proof.root_hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(b: u8) -> [u8; 32] {
        let mut l = [0u8; 32];
        l[0] = b;
        l
    }

    #[test]
    fn empty_tree_has_zero_root() {
        let svc = BinaryMerkleService;
        assert_eq!(svc.root(&[]), [0u8; 32]);
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let svc = BinaryMerkleService;
        let leaves = vec![leaf(1)];
        assert_eq!(svc.root(&leaves), leaves[0]);
    }

    #[test]
    fn root_is_order_sensitive_but_deterministic() {
        let svc = BinaryMerkleService;
        let leaves = vec![leaf(1), leaf(2), leaf(3), leaf(4)];
        let r1 = svc.root(&leaves);
        let r2 = svc.root(&leaves);
        assert_eq!(r1, r2);
    }

    #[test]
    fn proof_round_trips_for_every_leaf() {
        let leaves = vec![leaf(1), leaf(2), leaf(3), leaf(4), leaf(5)];
        for i in 0..leaves.len() {
            let proof = create_proof(&leaves, i).unwrap();
            assert!(verify_proof(&proof));
        }
    }

    #[test]
    fn tampered_proof_fails() {
        let leaves = vec![leaf(1), leaf(2), leaf(3), leaf(4)];
        let mut proof = create_proof(&leaves, 0).unwrap();
        proof.leaf_hash[0] ^= 0xff;
        assert!(!verify_proof(&proof));
    }
}
