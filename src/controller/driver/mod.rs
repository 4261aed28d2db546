//! # Migration Driver
//!
//! Boundary to the database being migrated.
//!
//! - [`MigrationDriver::open`] turns a DSN into a [`MigrationConnection`]
//! - [`MigrationConnection::current_version`] reports the applied version and dirty flag,
//!   `Ok(None)` when nothing was ever applied
//! - [`MigrationConnection::apply_to`] walks the database up or down to a target version
//!
//! Errors carry a structured [`DriverError::ConnectionBroken`] variant so callers
//! never have to pattern-match driver error text.

mod postgres;
mod source;

pub use postgres::{PostgresConnection, PostgresDriver};
pub use source::{plan, Direction, MigrationFile, MigrationSet, MigrationSource, MigrationStep};

use crate::constants::{BAD_CONNECTION_INDICATOR, CONNECTION_CLOSED_INDICATOR};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Applied migration version as recorded by the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationVersion {
    pub version: u64,
    /// A previous migration stopped part-way
    pub dirty: bool,
}

impl MigrationVersion {
    #[must_use]
    pub fn clean(version: u64) -> Self {
        Self {
            version,
            dirty: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    /// The connection could not be established
    #[error("failed to open connection: {0}")]
    Open(String),
    /// The connection died; the cached handle must not be reused
    #[error("database connection broken: {0}")]
    ConnectionBroken(String),
    /// The migration source could not be read or is inconsistent
    #[error("invalid migration source: {0}")]
    Source(String),
    /// A query against the version table failed
    #[error("database query failed: {0}")]
    Query(String),
    /// A migration script failed; the database is left dirty
    #[error("migration {version} failed: {message}")]
    Migration { version: u64, message: String },
}

impl DriverError {
    #[must_use]
    pub fn is_connection_broken(&self) -> bool {
        matches!(self, DriverError::ConnectionBroken(_))
    }

    /// Classify free-form driver error text
    ///
    /// Used for drivers that only surface a message; structured errors are classified at the source.
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if indicates_broken_connection(&message) {
            DriverError::ConnectionBroken(message)
        } else {
            DriverError::Query(message)
        }
    }
}

/// Whether error text carries one of the known dead-connection indicators
#[must_use]
pub fn indicates_broken_connection(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    lowered.contains(BAD_CONNECTION_INDICATOR) || lowered.contains(CONNECTION_CLOSED_INDICATOR)
}

/// Opens connections for DSNs
#[async_trait]
pub trait MigrationDriver: Send + Sync + fmt::Debug {
    async fn open(&self, dsn: &str) -> Result<Arc<dyn MigrationConnection>, DriverError>;
}

/// An open connection to one database
#[async_trait]
pub trait MigrationConnection: Send + Sync + fmt::Debug {
    /// Applied version, or `None` when no migration was ever applied
    async fn current_version(&self) -> Result<Option<MigrationVersion>, DriverError>;

    /// Migrate up or down until `target` is the applied version
    ///
    /// Target `0` removes every migration.
    async fn apply_to(&self, source: &MigrationSource, target: u64) -> Result<(), DriverError>;

    /// Release the underlying connection
    async fn close(&self) {}
}
