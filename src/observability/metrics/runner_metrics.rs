//! # Runner Metrics
//!
//! Metrics for remote command execution over SSH.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{Histogram, IntCounterVec};
use std::sync::LazyLock;

static REMOTE_COMMANDS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "fleet_controller_remote_commands_total",
            "Total number of remote commands by outcome (success, failed, fatal)",
        ),
        &["outcome"],
    )
    .expect("Failed to create REMOTE_COMMANDS_TOTAL metric - this should never happen")
});

static REMOTE_COMMAND_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "fleet_controller_remote_command_duration_seconds",
            "Duration of remote commands in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
    )
    .expect("Failed to create REMOTE_COMMAND_DURATION metric - this should never happen")
});

static NODE_SHUTDOWNS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "fleet_controller_node_shutdowns_total",
            "Total number of post-run node shutdown attempts by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create NODE_SHUTDOWNS_TOTAL metric - this should never happen")
});

/// Register runner metrics with the registry
pub(crate) fn register_runner_metrics() -> Result<()> {
    REGISTRY.register(Box::new(REMOTE_COMMANDS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REMOTE_COMMAND_DURATION.clone()))?;
    REGISTRY.register(Box::new(NODE_SHUTDOWNS_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_remote_commands(outcome: &str) {
    REMOTE_COMMANDS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn observe_remote_command_duration(duration: f64) {
    REMOTE_COMMAND_DURATION.observe(duration);
}

pub fn increment_node_shutdowns(outcome: &str) {
    NODE_SHUTDOWNS_TOTAL.with_label_values(&[outcome]).inc();
}
