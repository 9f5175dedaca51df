//! UTXO record and deterministic, order-independent state-root derivation.

use serde::{Deserialize, Serialize};

use crate::crypto::hash::HashService;
use crate::crypto::merkle::BinaryMerkleService;
use crate::types::{OutPoint, OutputCategory};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub value: u64,
    pub owner: Vec<u8>,
    pub block_height: u64,
    pub category: OutputCategory,
    pub locking_script: Vec<u8>,
}

impl Utxo {
    /// Canonical bytes hashed into the state-root leaf for this UTXO.
    /// `outpoint ‖ serialized UTXO`, matching the `utxo:set:{hex(tx)}:{idx}`
    /// persisted key's addressing scheme so the leaf is unambiguous per-key.
    pub fn state_root_leaf_bytes(&self) -> Vec<u8> {
        let mut buf = self.outpoint.to_key_bytes();
        buf.extend_from_slice(&bincode::serialize(self).expect("utxo serialization is infallible"));
        buf
    }
}

/// Computes the UTXO-set state root committed into every block header.
///
/// Deterministic and order-independent: leaves are sorted by outpoint bytes
/// before Merkleization so two nodes holding the same *set* (regardless of
/// insertion order) compute byte-identical roots.
pub fn compute_state_root(hasher: &dyn HashService, utxos: &[Utxo]) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = utxos
        .iter()
        .map(|u| hasher.hash_bytes(&u.state_root_leaf_bytes()))
        .collect();
    leaves.sort_unstable();
    BinaryMerkleService.root_with(hasher, &leaves)
}
