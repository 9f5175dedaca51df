//! Wires every component into a running node: storage, validation,
//! processing, fork handling and REORG, plus the `Ingress` seam external
//! callers drive.

use std::sync::Arc;

use strataforge_core::crypto::{HashService, Sha256HashService};
use strataforge_core::events::EventBus;
use tracing::info;

use crate::config::NodeConfig;
use crate::consensus::ForkDetector;
use crate::events::ChannelEventBus;
use crate::ingress::Ingress;
use crate::mempool::TxPool;
use crate::processor::BlockProcessor;
use crate::provider::BlockProvider;
use crate::reorg::{IndexManager, ReorgCoordinator, ReorgValidator, SnapshotManager, WriteGate};
use crate::store::{BlockStore, KvStore, SledKvStore, UtxoStore};
use crate::validation::{BlockValidator, Ed25519SignatureVerifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub tip_height: u64,
    pub tip_hash: Option<[u8; 32]>,
    pub write_gate_state: &'static str,
    pub mempool_len: usize,
}

/// Owns every long-lived component and exposes `ingress` as the only thing
/// an external caller (gossip layer, RPC façade) needs to touch.
pub struct Node {
    pub ingress: Ingress,
    block_store: Arc<BlockStore>,
    write_gate: Arc<WriteGate>,
    tx_pool: Arc<TxPool>,
    event_bus: Arc<ChannelEventBus>,
}

impl Node {
    /// Builds a node over `db`/`files_root`, with `provider` as the block
    /// supplier REORG replay and ancestor search consult for branches this
    /// node does not hold locally.
    pub fn new(config: NodeConfig, db: Arc<dyn KvStore>, provider: Arc<dyn BlockProvider>) -> Self {
        let hasher: Arc<dyn HashService> = Arc::new(Sha256HashService);
        let event_bus = Arc::new(ChannelEventBus::new(1024));
        let event_bus_dyn: Arc<dyn EventBus> = event_bus.clone();

        let block_store = Arc::new(BlockStore::new(db.clone(), config.storage.data_dir.clone()));
        let utxo_store = Arc::new(UtxoStore::new(db.clone()));
        let write_gate = Arc::new(WriteGate::new());
        let tx_pool = Arc::new(TxPool::new());

        let validator = Arc::new(BlockValidator::new(
            hasher.clone(),
            Arc::new(Ed25519SignatureVerifier),
            block_store.clone(),
            utxo_store.clone(),
            config.consensus.clone(),
        ));
        let fork_detector = Arc::new(ForkDetector::new(hasher.clone(), block_store.clone(), config.consensus.max_backtrack));

        let processor = Arc::new(BlockProcessor::new(
            hasher.clone(),
            validator,
            fork_detector.clone(),
            db.clone(),
            block_store.clone(),
            utxo_store.clone(),
            write_gate.clone(),
            tx_pool.clone(),
            event_bus_dyn.clone(),
        ));

        let snapshot_manager = Arc::new(SnapshotManager::new(
            db.clone(),
            utxo_store.clone(),
            hasher.clone(),
            config.storage.snapshot_batch_threshold,
        ));
        let index_manager = Arc::new(IndexManager::new(db.clone(), block_store.clone(), hasher.clone()));
        let reorg_validator = Arc::new(ReorgValidator::new(block_store.clone(), utxo_store.clone(), hasher.clone()));

        let coordinator = Arc::new(ReorgCoordinator::new(
            snapshot_manager,
            index_manager,
            reorg_validator,
            write_gate.clone(),
            processor.clone(),
            tx_pool.clone(),
            block_store.clone(),
            utxo_store.clone(),
            hasher.clone(),
            event_bus_dyn,
            config.storage.snapshot_batch_threshold,
        ));

        let ingress = Ingress::new(
            hasher,
            processor,
            fork_detector,
            coordinator,
            block_store.clone(),
            tx_pool.clone(),
            provider,
        );

        info!(network = %config.network_name, "node initialized");

        Self {
            ingress,
            block_store,
            write_gate,
            tx_pool,
            event_bus,
        }
    }

    /// Opens a `SledKvStore` at `config.storage.data_dir` and builds a node
    /// over it. The usual construction path for the binary entry point.
    pub fn open(config: NodeConfig, provider: Arc<dyn BlockProvider>) -> anyhow::Result<Self> {
        let db: Arc<dyn KvStore> = Arc::new(SledKvStore::open(&config.storage.data_dir)?);
        Ok(Self::new(config, db, provider))
    }

    pub fn status(&self) -> NodeStatus {
        let (tip_height, tip_hash) = match self.block_store.tip() {
            Ok(Some((h, hash))) => (h, Some(hash)),
            _ => (0, None),
        };
        NodeStatus {
            tip_height,
            tip_hash,
            write_gate_state: self.write_gate.state_label(),
            mempool_len: self.tx_pool.len(),
        }
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<strataforge_core::events::Event> {
        self.event_bus.subscribe()
    }
}
