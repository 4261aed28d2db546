//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_BACKOFF_MAX_MINUTES, DEFAULT_BACKOFF_MIN_MINUTES, DEFAULT_CONTROLLER_NAME,
    DEFAULT_DEPENDENCY_REQUEUE_SECS, DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
    DEFAULT_METRICS_PORT, DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS, DEFAULT_RESYNC_INTERVAL_SECS,
};
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// Fixed requeue interval (seconds) after an error when Fibonacci backoff is disabled
    pub reconciliation_error_requeue_secs: u64,
    /// Requeue interval (seconds) while a referenced secret or `Database` does not exist yet
    pub dependency_requeue_secs: u64,
    /// Requeue interval (seconds) after a successful reconciliation
    pub resync_interval_secs: u64,
    /// Fibonacci backoff floor (minutes)
    /// `0` disables the backoff in favour of `reconciliation_error_requeue_secs`
    pub backoff_min_minutes: u64,
    /// Fibonacci backoff ceiling (minutes)
    pub backoff_max_minutes: u64,
    /// Maximum concurrent reconciliations
    /// Reconciliations of the same resource never overlap regardless of this value
    pub max_concurrent_reconciliations: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE), used when `RUST_LOG` is unset
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Field manager for status patches and reporter for events
    pub controller_name: String,
    /// Pod name, recorded as the event reporter instance
    pub pod_name: Option<String>,
    /// Restrict the watch to a single namespace (all namespaces when unset)
    pub watch_namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            reconciliation_error_requeue_secs: DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
            dependency_requeue_secs: DEFAULT_DEPENDENCY_REQUEUE_SECS,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            backoff_min_minutes: DEFAULT_BACKOFF_MIN_MINUTES,
            backoff_max_minutes: DEFAULT_BACKOFF_MAX_MINUTES,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            controller_name: DEFAULT_CONTROLLER_NAME.to_string(),
            pod_name: None,
            watch_namespace: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// `from_env` delegates here; tests pass a map instead of mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backoff_min_minutes = parsed::<u64, _>(&lookup, "BACKOFF_MIN_MINUTES")
            .unwrap_or(defaults.backoff_min_minutes);
        let backoff_max_minutes = parsed::<u64, _>(&lookup, "BACKOFF_MAX_MINUTES")
            .unwrap_or(defaults.backoff_max_minutes)
            .max(backoff_min_minutes);

        Self {
            metrics_port: parsed(&lookup, "METRICS_PORT").unwrap_or(defaults.metrics_port),
            reconciliation_error_requeue_secs: parsed(&lookup, "RECONCILIATION_ERROR_REQUEUE_SECS")
                .unwrap_or(defaults.reconciliation_error_requeue_secs),
            dependency_requeue_secs: parsed(&lookup, "DEPENDENCY_REQUEUE_SECS")
                .unwrap_or(defaults.dependency_requeue_secs),
            resync_interval_secs: parsed(&lookup, "RESYNC_INTERVAL_SECS")
                .unwrap_or(defaults.resync_interval_secs),
            backoff_min_minutes,
            backoff_max_minutes,
            max_concurrent_reconciliations: parsed::<u16, _>(&lookup, "MAX_CONCURRENT_RECONCILIATIONS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_reconciliations),
            log_level: text("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: text("LOG_FORMAT")
                .map(|f| f.to_lowercase())
                .unwrap_or(defaults.log_format),
            controller_name: text("CONTROLLER_NAME").unwrap_or(defaults.controller_name),
            pod_name: text("POD_NAME"),
            watch_namespace: text("WATCH_NAMESPACE"),
        }
    }

    /// Fixed requeue duration after an error, used when Fibonacci backoff is disabled
    #[must_use]
    pub fn reconciliation_error_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.reconciliation_error_requeue_secs)
    }

    /// Whether errors requeue after a fixed delay instead of backing off
    #[must_use]
    pub fn fixed_error_requeue(&self) -> bool {
        self.backoff_min_minutes == 0
    }

    /// Requeue duration while waiting on a dependency
    #[must_use]
    pub fn dependency_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.dependency_requeue_secs)
    }

    /// Requeue duration after success
    #[must_use]
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Whether logs should be emitted as JSON
    #[must_use]
    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}

/// Read a value and parse it, ignoring anything unparsable
fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}
