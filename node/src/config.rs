//! Node configuration, loaded from `config.toml` layered with environment
//! overrides via the `config` crate.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Configured network id; blocks carrying a different `chain_id` are a
    /// cross-chain replay attempt and are rejected outright.
    pub chain_id: u64,
    pub min_difficulty: u64,
    /// Hard ceiling on `difficulty`, independent of the adjustment algorithm's
    /// own `[parent/4, parent*4]` window; guards against a malicious or
    /// corrupt header claiming an unbounded target.
    pub max_difficulty: u64,
    pub difficulty_adjustment_interval: u64,
    pub min_block_interval_secs: u64,
    pub max_timestamp_drift_future_secs: u64,
    pub max_timestamp_drift_past_secs: u64,
    pub max_backtrack: u64,
    pub max_supported_version: u32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            min_difficulty: 1,
            max_difficulty: 1 << 32,
            difficulty_adjustment_interval: 2016,
            min_block_interval_secs: 1,
            max_timestamp_drift_future_secs: 2 * 3600,
            max_timestamp_drift_past_secs: 30 * 24 * 3600,
            max_backtrack: 2_000,
            max_supported_version: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Threshold (in UTXO count) above which `SnapshotManager::rollback`
    /// switches from a single write transaction to the batched variant.
    pub snapshot_batch_threshold: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            snapshot_batch_threshold: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub network_name: String,
    pub consensus: ConsensusConfig,
    pub storage: StorageConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network_name: "strataforge-testnet".to_string(),
            consensus: ConsensusConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from `path`, falling back to defaults for any
    /// field the file omits, with `STRATAFORGE_*` environment overrides.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&NodeConfig::default())?)
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("STRATAFORGE").separator("__"));

        let cfg = builder.build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Platform config-directory default (`$XDG_CONFIG_HOME/strataforge/config.toml`
    /// or the OS equivalent), used when the caller doesn't name a config file
    /// explicitly. Falls back to `./config.toml` if the OS exposes no config dir.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("strataforge").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}
