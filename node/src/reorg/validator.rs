//! Three independent post-REORG verification levels. Any level failing
//! aborts the REORG; levels 2 and 3 catch silent index skew level 1's
//! cryptographic state-root check alone could miss.

use std::sync::Arc;

use strataforge_core::crypto::HashService;
use thiserror::Error;

use crate::store::{BlockStore, UtxoStore};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReorgVerifyError {
    #[error("state root mismatch at height {height}: recorded {recorded}, expected {expected}")]
    StateRootMismatch { height: u64, recorded: String, expected: String },
    #[error("index integrity failed at height {height}: {detail}")]
    IndexIntegrity { height: u64, detail: String },
    #[error("cross-module validation failed at height {height}: {detail}")]
    CrossModule { height: u64, detail: String },
}

pub struct ReorgValidator {
    block_store: Arc<BlockStore>,
    utxo_store: Arc<UtxoStore>,
    hasher: Arc<dyn HashService>,
}

impl ReorgValidator {
    pub fn new(block_store: Arc<BlockStore>, utxo_store: Arc<UtxoStore>, hasher: Arc<dyn HashService>) -> Self {
        Self {
            block_store,
            utxo_store,
            hasher,
        }
    }

    pub fn verify(&self, expected_height: u64) -> Result<(), ReorgVerifyError> {
        self.verify_state_root(expected_height)?;
        self.verify_index_integrity(expected_height)?;
        self.verify_cross_module(expected_height)?;
        Ok(())
    }

    fn verify_state_root(&self, expected_height: u64) -> Result<(), ReorgVerifyError> {
        let recorded = self
            .block_store
            .state_root()
            .map_err(|e| ReorgVerifyError::StateRootMismatch {
                height: expected_height,
                recorded: "<unreadable>".to_string(),
                expected: e.to_string(),
            })?
            .unwrap_or([0u8; 32]);

        let block = self
            .block_store
            .get_block_by_height(expected_height)
            .map_err(|e| ReorgVerifyError::StateRootMismatch {
                height: expected_height,
                recorded: hex::encode(recorded),
                expected: e.to_string(),
            })?
            .ok_or_else(|| ReorgVerifyError::StateRootMismatch {
                height: expected_height,
                recorded: hex::encode(recorded),
                expected: "<block missing>".to_string(),
            })?;

        if recorded != block.header.state_root {
            return Err(ReorgVerifyError::StateRootMismatch {
                height: expected_height,
                recorded: hex::encode(recorded),
                expected: hex::encode(block.header.state_root),
            });
        }
        Ok(())
    }

    fn verify_index_integrity(&self, expected_height: u64) -> Result<(), ReorgVerifyError> {
        let fail = |detail: String| ReorgVerifyError::IndexIntegrity { height: expected_height, detail };

        for h in 0..=expected_height {
            let hash = self
                .block_store
                .height_to_hash(h)
                .map_err(|e| fail(e.to_string()))?
                .ok_or_else(|| fail(format!("indices:height:{h} missing")))?;
            let back = self
                .block_store
                .hash_to_height(&hash)
                .map_err(|e| fail(e.to_string()))?;
            if back != Some(h) {
                return Err(fail(format!("indices:hash:{} does not map back to {h}", hex::encode(hash))));
            }
        }

        let expected_hash = self
            .block_store
            .height_to_hash(expected_height)
            .map_err(|e| fail(e.to_string()))?
            .ok_or_else(|| fail(format!("indices:height:{expected_height} missing")))?;
        let tip = self.block_store.tip().map_err(|e| fail(e.to_string()))?;
        if tip != Some((expected_height, expected_hash)) {
            return Err(fail(format!("state:chain:tip does not equal ({expected_height}, {})", hex::encode(expected_hash))));
        }
        Ok(())
    }

    fn verify_cross_module(&self, expected_height: u64) -> Result<(), ReorgVerifyError> {
        let fail = |detail: String| ReorgVerifyError::CrossModule { height: expected_height, detail };

        let utxos = self.utxo_store.scan_all().map_err(|e| fail(e.to_string()))?;
        for utxo in &utxos {
            if utxo.block_height > expected_height {
                return Err(fail(format!(
                    "utxo {:?} has block_height {} beyond expected height {expected_height}",
                    utxo.outpoint, utxo.block_height
                )));
            }
            if expected_height > 0 && utxo.block_height == 0 {
                return Err(fail(format!("utxo {:?} has block_height==0 past genesis", utxo.outpoint)));
            }
        }

        for h in 0..=expected_height {
            let Some(block) = self.block_store.get_block_by_height(h).map_err(|e| fail(e.to_string()))? else {
                return Err(fail(format!("block at height {h} missing during cross-module check")));
            };
            for tx in block.transactions() {
                let tx_hash = self.hasher.hash_transaction(tx);
                if self
                    .block_store
                    .tx_location(&tx_hash)
                    .map_err(|e| fail(e.to_string()))?
                    .is_none()
                {
                    return Err(fail(format!(
                        "indices:tx:{} missing for a transaction in block {h}",
                        hex::encode(tx_hash)
                    )));
                }
            }
        }

        // Resource-category cross-reference checks (code/instance/owner
        // indices mutually referencing each other) are not performed: this
        // core does not originate resource-index records in the first
        // place (see IndexRollbackPlan::resource_keys).
        Ok(())
    }
}
