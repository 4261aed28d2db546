//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health checks
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default requeue interval for reconciliation errors when backoff state is unavailable (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Default requeue interval while waiting on a secret or `Database` that does not exist yet (seconds)
pub const DEFAULT_DEPENDENCY_REQUEUE_SECS: u64 = 15;

/// Default interval between periodic reconciliations of a healthy resource (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Fibonacci backoff floor (minutes)
pub const DEFAULT_BACKOFF_MIN_MINUTES: u64 = 1;

/// Fibonacci backoff ceiling (minutes)
pub const DEFAULT_BACKOFF_MAX_MINUTES: u64 = 10;

/// Default number of reconciliations the controller runs at once
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Field manager and event reporter name
pub const DEFAULT_CONTROLLER_NAME: &str = "schema-migration-controller";

/// Key inside a `Database`'s generated secret that holds its connection string
pub const DATABASE_DSN_SECRET_KEY: &str = "dsn";

/// Name of the version-tracking table the migration driver maintains
pub const MIGRATIONS_TABLE: &str = "schema_migrations";

/// Error text some drivers report for a dead connection
pub const BAD_CONNECTION_INDICATOR: &str = "bad connection";

/// Error text some drivers report after the server closed the connection
pub const CONNECTION_CLOSED_INDICATOR: &str = "connection is already closed";
