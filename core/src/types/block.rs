//! Block and block header types.

use serde::{Deserialize, Serialize};

use super::transaction::Transaction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Configured network id; a mismatch here is a cross-chain replay attempt.
    pub chain_id: u64,
    pub version: u32,
    pub previous_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    pub state_root: [u8; 32],
    pub timestamp: u64,
    pub height: u64,
    /// PoW nonce. Must be non-empty for every block except genesis.
    pub nonce: Vec<u8>,
    pub difficulty: u64,
}

impl BlockHeader {
    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }

    /// Canonical serialization used as the hashing input for this header.
    /// Must agree bit-for-bit across every node (HashService requirement).
    pub fn canonical_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("header serialization is infallible")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBody {
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub body: BlockBody,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            body: BlockBody { transactions },
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.body.transactions
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.body.transactions.first()
    }

    pub fn non_coinbase_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.body.transactions.iter().skip(1)
    }
}
