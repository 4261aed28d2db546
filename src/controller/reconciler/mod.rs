//! # Reconciler
//!
//! Core reconciliation logic for `DatabaseSchema` resources.
//!
//! The reconciler:
//! - Resolves the connection string from the spec, a secret, or the related `Database`
//! - Resolves the migration source URL from the spec or a secret
//! - Keeps one open connection per resource in a shared cache
//! - Migrates the database up or down to the target version
//! - Records `Pending`, `Error` or `Success` with a reason code in status
//!
//! A dirty database is never migrated; it needs manual repair first.

pub mod reconcile;
pub mod types;

pub use reconcile::{reconcile, split_key};
pub use types::{ReconcileOutcome, Reconciler, ReconcilerError, RequeuePolicy, StatusReason};
