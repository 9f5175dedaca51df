//! Node binary: loads configuration, opens storage, and runs the chain-state
//! core until a shutdown signal arrives. Block and transaction ingress from
//! the network is out of scope here; this entry point exists to host the
//! core and expose its status, with `Ingress` ready for a gossip layer to
//! drive once one exists.

use std::sync::Arc;

use clap::Parser;
use node::config::NodeConfig;
use node::{BlockProvider, Node};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "StrataForge chain-state node", long_about = None)]
struct Args {
    /// Defaults to the platform config directory (see `NodeConfig::default_config_path`)
    /// when omitted.
    #[arg(short, long)]
    config: Option<String>,

    #[arg(short, long)]
    debug: bool,
}

/// Placeholder block supplier: this node has no peers wired up yet, so
/// REORG replay and ancestor search for branches it doesn't hold locally
/// always come back empty. A gossip layer can supersede this with a real
/// peer-backed `BlockProvider` without touching anything else here.
struct NoPeers;

impl BlockProvider for NoPeers {
    fn get(&self, _height: u64) -> Option<strataforge_core::types::Block> {
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if args.debug { "debug" } else { "info" };
        EnvFilter::new(level)
    });
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config_path = args
        .config
        .unwrap_or_else(|| NodeConfig::default_config_path().to_string_lossy().into_owned());
    let config = NodeConfig::load(&config_path).unwrap_or_else(|e| {
        eprintln!("failed to load configuration: {e}");
        std::process::exit(1);
    });

    info!(network = %config.network_name, data_dir = ?config.storage.data_dir, "starting node");

    let node = match Node::open(config, Arc::new(NoPeers)) {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "failed to open node");
            return Err(e);
        }
    };

    let status = node.status();
    info!(
        tip_height = status.tip_height,
        write_gate = status.write_gate_state,
        mempool_len = status.mempool_len,
        "node ready"
    );

    signal::ctrl_c().await?;
    info!("shutdown signal received, stopping");

    Ok(())
}
