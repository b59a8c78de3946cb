//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `ingress_routes_reconciliations_total` - Total number of reconciliations
//! - `ingress_routes_reconciliation_errors_total` - Total number of reconciliation errors
//! - `ingress_routes_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `ingress_routes_active_targets` - Component routes present in both spec and status
//! - `ingress_routes_derived_operations_total` - Writes to derived objects by kind and operation
//! - `ingress_routes_label_integrity_faults_total` - Derived objects found without their marker label
//! - `ingress_routes_requeues_total` - Requeues requested by the error policy

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ingress_routes_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ingress_routes_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "ingress_routes_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static ACTIVE_TARGETS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "ingress_routes_active_targets",
        "Component routes present in both spec and status",
    )
    .expect("Failed to create ACTIVE_TARGETS metric - this should never happen")
});

static DERIVED_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "ingress_routes_derived_operations_total",
            "Writes to derived Roles and RoleBindings by kind and operation",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create DERIVED_OPERATIONS_TOTAL metric - this should never happen")
});

static LABEL_INTEGRITY_FAULTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ingress_routes_label_integrity_faults_total",
        "Derived objects matched by the marker selector without carrying the marker label",
    )
    .expect("Failed to create LABEL_INTEGRITY_FAULTS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "ingress_routes_requeues_total",
            "Requeues requested after reconciliation, by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Registration only fails on duplicate metric names"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(ACTIVE_TARGETS.clone()))?;
    REGISTRY.register(Box::new(DERIVED_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(LABEL_INTEGRITY_FAULTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

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

pub fn set_active_targets(count: usize) {
    ACTIVE_TARGETS.set(i64::try_from(count).unwrap_or(i64::MAX));
}

/// Record a create/update/delete of a derived object
pub fn record_derived_operation(kind: &str, operation: &str) {
    DERIVED_OPERATIONS_TOTAL
        .with_label_values(&[kind, operation])
        .inc();
}

pub fn increment_label_integrity_faults() {
    LABEL_INTEGRITY_FAULTS_TOTAL.inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}
