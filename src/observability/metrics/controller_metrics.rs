//! # Controller Metrics
//!
//! Metrics for the reconciliation engine, labelled by controller name.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec, IntGaugeVec};
use std::sync::LazyLock;

// Reconciliation metrics
static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "fleet_controller_reconciliations_total",
            "Total number of work items taken off a controller queue",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "fleet_controller_reconciliation_errors_total",
            "Total number of reconciliation errors by stage (list, process, sync)",
        ),
        &["controller", "stage"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "fleet_controller_reconciliation_duration_seconds",
            "Duration of a single work item reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

// Resync metrics
static RESYNCS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "fleet_controller_resyncs_total",
            "Total number of successful full resync passes",
        ),
        &["controller"],
    )
    .expect("Failed to create RESYNCS_TOTAL metric - this should never happen")
});

// Queue metrics
static QUEUE_DEPTH: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "fleet_controller_queue_depth",
            "Number of work items waiting to be processed",
        ),
        &["controller"],
    )
    .expect("Failed to create QUEUE_DEPTH metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "fleet_controller_requeues_total",
            "Total number of rate-limited requeues after a failed sync",
        ),
        &["controller"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(RESYNCS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations(controller: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[controller]).inc();
}

pub fn increment_reconciliation_errors(controller: &str, stage: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[controller, stage])
        .inc();
}

pub fn observe_reconciliation_duration(controller: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[controller])
        .observe(duration);
}

pub fn increment_resyncs(controller: &str) {
    RESYNCS_TOTAL.with_label_values(&[controller]).inc();
}

pub fn set_queue_depth(controller: &str, depth: usize) {
    let depth = i64::try_from(depth).unwrap_or(i64::MAX);
    QUEUE_DEPTH.with_label_values(&[controller]).set(depth);
}

pub fn increment_requeues(controller: &str) {
    REQUEUES_TOTAL.with_label_values(&[controller]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.with_label_values(&["metrics-test"]).get();
        increment_reconciliations("metrics-test");
        let after = RECONCILIATIONS_TOTAL.with_label_values(&["metrics-test"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_reconciliation_errors_are_labelled_by_stage() {
        let before = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["metrics-test", "sync"])
            .get();
        increment_reconciliation_errors("metrics-test", "sync");
        let after = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["metrics-test", "sync"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_set_queue_depth() {
        set_queue_depth("metrics-depth", 3);
        assert_eq!(QUEUE_DEPTH.with_label_values(&["metrics-depth"]).get(), 3);
        set_queue_depth("metrics-depth", 0);
        assert_eq!(QUEUE_DEPTH.with_label_values(&["metrics-depth"]).get(), 0);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        observe_reconciliation_duration("metrics-test", 0.25);
        // Just verify it doesn't panic - histogram observation doesn't return a value
    }
}
