//! # Provider Metrics
//!
//! Metrics for registry connectivity: image registry logins, model registry
//! connects and health checks.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::IntCounterVec;
use std::sync::LazyLock;

static REGISTRY_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "fleet_controller_registry_operations_total",
            "Total number of registry operations by registry kind and operation",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create REGISTRY_OPERATIONS_TOTAL metric - this should never happen")
});

static REGISTRY_OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "fleet_controller_registry_operation_errors_total",
            "Total number of failed registry operations by registry kind and operation",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create REGISTRY_OPERATION_ERRORS_TOTAL metric - this should never happen")
});

/// Register provider metrics with the registry
pub(crate) fn register_provider_metrics() -> Result<()> {
    REGISTRY.register(Box::new(REGISTRY_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REGISTRY_OPERATION_ERRORS_TOTAL.clone()))?;
    Ok(())
}

/// Record the outcome of one registry operation
pub fn record_registry_operation(kind: &str, operation: &str, success: bool) {
    REGISTRY_OPERATIONS_TOTAL
        .with_label_values(&[kind, operation])
        .inc();
    if !success {
        REGISTRY_OPERATION_ERRORS_TOTAL
            .with_label_values(&[kind, operation])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_registry_operation_failure_counts_both() {
        let total = || {
            REGISTRY_OPERATIONS_TOTAL
                .with_label_values(&["test", "login"])
                .get()
        };
        let errors = || {
            REGISTRY_OPERATION_ERRORS_TOTAL
                .with_label_values(&["test", "login"])
                .get()
        };
        let (total_before, errors_before) = (total(), errors());

        record_registry_operation("test", "login", true);
        record_registry_operation("test", "login", false);

        assert_eq!(total(), total_before + 2);
        assert_eq!(errors(), errors_before + 1);
    }
}
