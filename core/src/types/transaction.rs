//! Transaction, input/output and outpoint types shared across the chain core.

use serde::{Deserialize, Serialize};

/// Reference to a single output of a previous transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub tx_hash: [u8; 32],
    pub output_index: u32,
}

impl OutPoint {
    pub fn new(tx_hash: [u8; 32], output_index: u32) -> Self {
        Self {
            tx_hash,
            output_index,
        }
    }

    /// Binary-exact key bytes used by the `utxo:set:{hex(tx)}:{out_idx}` schema.
    pub fn to_key_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(36);
        buf.extend_from_slice(&self.tx_hash);
        buf.extend_from_slice(&self.output_index.to_be_bytes());
        buf
    }
}

/// Proof unlocking a referenced output (signature, script witness, etc).
/// Kept opaque here — signature scheme is a pluggable concern of the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockProof {
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub previous_output: OutPoint,
    pub unlock: UnlockProof,
}

impl TransactionInput {
    pub fn new(previous_output: OutPoint, unlock: UnlockProof) -> Self {
        Self {
            previous_output,
            unlock,
        }
    }
}

/// Category of UTXO being created; resource-category UTXOs carry additional
/// cross-referenced index records (see `indices:resource-*` in the key schema).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputCategory {
    Standard,
    Resource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: u64,
    pub owner: Vec<u8>,
    pub category: OutputCategory,
    pub locking_script: Vec<u8>,
}

impl TransactionOutput {
    pub fn new(value: u64, owner: Vec<u8>, locking_script: Vec<u8>) -> Self {
        Self {
            value,
            owner,
            category: OutputCategory::Standard,
            locking_script,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub locktime: u32,
}

impl Transaction {
    pub fn new(
        version: u32,
        inputs: Vec<TransactionInput>,
        outputs: Vec<TransactionOutput>,
        locktime: u32,
    ) -> Self {
        Self {
            version,
            inputs,
            outputs,
            locktime,
        }
    }

    /// Coinbase transactions have zero inputs and are only valid at index 0.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Canonical serialization used as the hashing input for this transaction.
    /// Must agree bit-for-bit across every node (HashService requirement).
    pub fn canonical_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("transaction serialization is infallible")
    }

    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }
}
