//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `schema_migration_reconciliations_total` - Total number of reconciliations
//! - `schema_migration_reconciliation_errors_total` - Total number of reconciliation errors
//! - `schema_migration_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `schema_migration_migrations_applied_total` - Successful version transitions
//! - `schema_migration_migration_failures_total` - Failed `apply` calls
//! - `schema_migration_dirty_databases_total` - Reconciliations that found a dirty database
//! - `schema_migration_connections_opened_total` - Database connections opened
//! - `schema_migration_connection_evictions_total` - Cached connections dropped, by cause
//! - `schema_migration_cached_connections` - Connections currently cached
//! - `schema_migration_status_update_failures_total` - Status writes that failed
//! - `schema_migration_requeues_total` - Requeues by policy

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "schema_migration_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "schema_migration_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "schema_migration_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static MIGRATIONS_APPLIED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "schema_migration_migrations_applied_total",
        "Total number of successful version transitions",
    )
    .expect("Failed to create MIGRATIONS_APPLIED_TOTAL metric - this should never happen")
});

static MIGRATION_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "schema_migration_migration_failures_total",
        "Total number of failed migration attempts",
    )
    .expect("Failed to create MIGRATION_FAILURES_TOTAL metric - this should never happen")
});

static DIRTY_DATABASES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "schema_migration_dirty_databases_total",
        "Total number of reconciliations that found a dirty database",
    )
    .expect("Failed to create DIRTY_DATABASES_TOTAL metric - this should never happen")
});

static CONNECTIONS_OPENED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "schema_migration_connections_opened_total",
        "Total number of database connections opened",
    )
    .expect("Failed to create CONNECTIONS_OPENED_TOTAL metric - this should never happen")
});

static CONNECTION_EVICTIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "schema_migration_connection_evictions_total",
            "Total number of cached connections dropped, by cause",
        ),
        &["cause"],
    )
    .expect("Failed to create CONNECTION_EVICTIONS_TOTAL metric - this should never happen")
});

static CACHED_CONNECTIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "schema_migration_cached_connections",
        "Current number of cached database connections",
    )
    .expect("Failed to create CACHED_CONNECTIONS metric - this should never happen")
});

static STATUS_UPDATE_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "schema_migration_status_update_failures_total",
        "Total number of failed status writes",
    )
    .expect("Failed to create STATUS_UPDATE_FAILURES_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "schema_migration_requeues_total",
            "Total number of requeues by policy",
        ),
        &["policy"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Only fails when a metric is registered twice"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(MIGRATIONS_APPLIED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MIGRATION_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DIRTY_DATABASES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONNECTIONS_OPENED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONNECTION_EVICTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CACHED_CONNECTIONS.clone()))?;
    REGISTRY.register(Box::new(STATUS_UPDATE_FAILURES_TOTAL.clone()))?;
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

pub fn increment_migrations_applied() {
    MIGRATIONS_APPLIED_TOTAL.inc();
}

pub fn increment_migration_failures() {
    MIGRATION_FAILURES_TOTAL.inc();
}

pub fn increment_dirty_databases() {
    DIRTY_DATABASES_TOTAL.inc();
}

pub fn increment_connections_opened() {
    CONNECTIONS_OPENED_TOTAL.inc();
}

/// Count a cache eviction; `cause` is one of `broken`, `dsn-changed`, `deleted`
pub fn increment_connection_evictions(cause: &str) {
    CONNECTION_EVICTIONS_TOTAL.with_label_values(&[cause]).inc();
}

pub fn set_cached_connections(count: usize) {
    CACHED_CONNECTIONS.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn increment_status_update_failures() {
    STATUS_UPDATE_FAILURES_TOTAL.inc();
}

/// Count a requeue; `policy` is one of `backoff`, `after-delay`, `never`, `resync`
pub fn increment_requeues_total(policy: &str) {
    REQUEUES_TOTAL.with_label_values(&[policy]).inc();
}
