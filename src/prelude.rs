//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use schema_migration_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (DatabaseSchema, Database, SchemaState, etc.)
//! - The boundary traits the reconciler is built on
//! - Reconciler types (Reconciler, ReconcilerError, etc.)
//! - Config types (ControllerConfig)

// CRD types - most commonly used
pub use crate::crd::*;

// Boundary traits - needed for alternative stores, drivers and fakes
pub use crate::controller::driver::{
    DriverError, MigrationConnection, MigrationDriver, MigrationSource, MigrationVersion,
};
pub use crate::controller::events::{EventPublisher, SchemaEvent};
pub use crate::controller::resolve::{ResolveError, SecretError, SecretSource};
pub use crate::controller::store::{ResourceStore, StoreError};

// Reconciler types - core controller functionality
pub use crate::controller::connection_cache::ConnectionCache;
pub use crate::controller::reconciler::{
    reconcile, ReconcileOutcome, Reconciler, ReconcilerError, RequeuePolicy, StatusReason,
};

// Config types - for configuration management
pub use crate::config::ControllerConfig;
