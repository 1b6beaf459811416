//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `managed_resource_reconciliations_total` - Total number of secret reconciliations
//! - `managed_resource_reconciliation_errors_total` - Total number of failed reconciliations
//! - `managed_resource_reconciliation_duration_seconds` - Duration of reconciliations
//! - `managed_resource_finalizers_added_total` - Finalizers added to secrets
//! - `managed_resource_finalizers_removed_total` - Finalizers removed from secrets
//! - `managed_resource_update_conflicts_total` - Optimistic update conflicts, by kind

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "managed_resource_reconciliations_total",
        "Total number of secret reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "managed_resource_reconciliation_errors_total",
        "Total number of failed secret reconciliations",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "managed_resource_reconciliation_duration_seconds",
            "Duration of secret reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static FINALIZERS_ADDED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "managed_resource_finalizers_added_total",
        "Total number of finalizers added to secrets",
    )
    .expect("Failed to create FINALIZERS_ADDED_TOTAL metric - this should never happen")
});

static FINALIZERS_REMOVED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "managed_resource_finalizers_removed_total",
        "Total number of finalizers removed from secrets",
    )
    .expect("Failed to create FINALIZERS_REMOVED_TOTAL metric - this should never happen")
});

static UPDATE_CONFLICTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "managed_resource_update_conflicts_total",
            "Total number of optimistic update conflicts",
        ),
        &["kind"],
    )
    .expect("Failed to create UPDATE_CONFLICTS_TOTAL metric - this should never happen")
});

/// Register all metrics with the process registry
///
/// Must be called once at startup, before the server serves `/metrics`.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(FINALIZERS_ADDED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FINALIZERS_REMOVED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UPDATE_CONFLICTS_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_finalizers_added() {
    FINALIZERS_ADDED_TOTAL.inc();
}

pub fn increment_finalizers_removed() {
    FINALIZERS_REMOVED_TOTAL.inc();
}

pub fn increment_update_conflicts(kind: &str) {
    UPDATE_CONFLICTS_TOTAL.with_label_values(&[kind]).inc();
}
