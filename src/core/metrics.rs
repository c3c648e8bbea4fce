// src/core/metrics.rs

//! Defines and registers Prometheus metrics for control-plane observability.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only
//! once globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, TextEncoder, register_counter, register_gauge,
};

lazy_static! {
    /// Number of operations currently queued in the persistence queue.
    pub static ref PERSISTENCE_QUEUE_DEPTH: Gauge =
        register_gauge!("koth_persistence_queue_depth", "Number of pending persistence-queue operations.").unwrap();
    /// Number of bootstrap tokens currently outstanding (minted but not consumed).
    pub static ref BOOTSTRAP_TOKENS_OUTSTANDING: Gauge =
        register_gauge!("koth_bootstrap_tokens_outstanding", "Number of unredeemed bootstrap tokens.").unwrap();
    /// Number of active (unexpired) session tokens.
    pub static ref SESSIONS_ACTIVE: Gauge =
        register_gauge!("koth_sessions_active", "Number of active session tokens.").unwrap();
    /// Number of teams currently tracked in the in-memory environment.
    pub static ref TEAMS_TRACKED: Gauge =
        register_gauge!("koth_teams_tracked", "Number of teams currently tracked.").unwrap();

    /// Total number of teams successfully provisioned.
    pub static ref PROVISIONING_SUCCESS_TOTAL: Counter =
        register_counter!("koth_provisioning_success_total", "Total number of teams successfully provisioned.").unwrap();
    /// Total number of provisioning attempts that failed at any stage.
    pub static ref PROVISIONING_FAILURE_TOTAL: Counter =
        register_counter!("koth_provisioning_failure_total", "Total number of failed provisioning attempts.").unwrap();
    /// Total number of completed scoring ticks.
    pub static ref SCORING_TICKS_TOTAL: Counter =
        register_counter!("koth_scoring_ticks_total", "Total number of completed scoring ticks.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
