//! Pluggable, deterministic hashing over canonical block/transaction bytes.
//!
//! The exact primitive is not load-bearing for correctness (spec Non-goals) —
//! what matters is that every node computes the same digest for the same
//! canonical bytes. `Sha256HashService` is the default; swap in another
//! `HashService` impl (e.g. BLAKE3) without touching callers.

use sha2::{Digest, Sha256};

use crate::types::{Block, BlockHeader, Transaction};

/// Deterministic 32-byte hashing over canonical header/transaction bytes.
pub trait HashService: Send + Sync {
    fn hash_bytes(&self, data: &[u8]) -> [u8; 32];

    fn hash_header(&self, header: &BlockHeader) -> [u8; 32] {
        self.hash_bytes(&header.canonical_bytes())
    }

    fn hash_transaction(&self, tx: &Transaction) -> [u8; 32] {
        self.hash_bytes(&tx.canonical_bytes())
    }

    fn hash_block(&self, block: &Block) -> [u8; 32] {
        self.hash_header(&block.header)
    }
}

/// SHA-256 based `HashService`.
#[derive(Debug, Clone, Default)]
pub struct Sha256HashService;

impl HashService for Sha256HashService {
    fn hash_bytes(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }
}

/// BLAKE3 based `HashService` — drop-in alternative with identical contract.
#[derive(Debug, Clone, Default)]
pub struct Blake3HashService;

impl HashService for Blake3HashService {
    fn hash_bytes(&self, data: &[u8]) -> [u8; 32] {
        *blake3::hash(data).as_bytes()
    }
}
