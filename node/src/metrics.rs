//! Lightweight metrics emission via the `metrics` crate facade.
//!
//! No exporter is wired up here — the metrics HTTP surface belongs to an
//! external API layer — but the instrumentation points themselves are
//! recorded throughout block processing, fork handling and the mempool.

use metrics::{counter, gauge};

pub fn block_processed() {
    counter!("strataforge_blocks_processed_total", 1);
}

pub fn fork_detected() {
    counter!("strataforge_forks_detected_total", 1);
}

pub fn reorg_committed() {
    counter!("strataforge_reorgs_committed_total", 1);
}

pub fn reorg_aborted() {
    counter!("strataforge_reorgs_aborted_total", 1);
}

pub fn write_gate_state(state: &str) {
    let value = match state {
        "enabled_for_writes" => 0.0,
        "write_fenced" => 1.0,
        "read_only" => 2.0,
        _ => -1.0,
    };
    gauge!("strataforge_write_gate_state", value);
}

pub fn chain_tip_height(height: u64) {
    gauge!("strataforge_chain_tip_height", height as f64);
}
