//! # Types
//!
//! Core types for the reconciler.

use crate::config::ControllerConfig;
use crate::controller::backoff::BackoffState;
use crate::controller::connection_cache::ConnectionCache;
use crate::controller::driver::{DriverError, MigrationDriver, PostgresDriver};
use crate::controller::events::{EventPublisher, KubeEventPublisher};
use crate::controller::resolve::{KubeSecretSource, ResolveError, SecretSource};
use crate::controller::status::StatusReporter;
use crate::controller::store::{KubeResourceStore, ResourceStore, StoreError};
use crate::crd::SchemaState;
use kube::Client;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Machine-readable reason recorded next to the status state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusReason {
    /// A referenced secret or `Database` does not exist yet
    DependencyNotReady,
    /// The spec cannot be resolved into a DSN and migration source
    InvalidConfiguration,
    ConnectionFailed,
    ConnectionBroken,
    VersionQueryFailed,
    /// The database has never been migrated
    NoVersionApplied,
    DirtyDatabase,
    MigrationFailed,
    AlreadySynced,
    MigrationApplied,
}

impl StatusReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusReason::DependencyNotReady => "DependencyNotReady",
            StatusReason::InvalidConfiguration => "InvalidConfiguration",
            StatusReason::ConnectionFailed => "ConnectionFailed",
            StatusReason::ConnectionBroken => "ConnectionBroken",
            StatusReason::VersionQueryFailed => "VersionQueryFailed",
            StatusReason::NoVersionApplied => "NoVersionApplied",
            StatusReason::DirtyDatabase => "DirtyDatabase",
            StatusReason::MigrationFailed => "MigrationFailed",
            StatusReason::AlreadySynced => "AlreadySynced",
            StatusReason::MigrationApplied => "MigrationApplied",
        }
    }

    /// State that accompanies this reason
    #[must_use]
    pub fn state(&self) -> SchemaState {
        match self {
            StatusReason::DependencyNotReady | StatusReason::NoVersionApplied => {
                SchemaState::Pending
            }
            StatusReason::AlreadySynced | StatusReason::MigrationApplied => SchemaState::Success,
            StatusReason::InvalidConfiguration
            | StatusReason::ConnectionFailed
            | StatusReason::ConnectionBroken
            | StatusReason::VersionQueryFailed
            | StatusReason::DirtyDatabase
            | StatusReason::MigrationFailed => SchemaState::Error,
        }
    }
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the dispatcher should retry after an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeuePolicy {
    /// Retrying cannot help; wait for the resource to change
    Never,
    /// Waiting on a dependency; retry after a short fixed delay without counting a failure
    AfterDelay,
    /// Retry with per-resource Fibonacci backoff
    Backoff,
}

impl RequeuePolicy {
    /// Metrics label
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RequeuePolicy::Never => "never",
            RequeuePolicy::AfterDelay => "after-delay",
            RequeuePolicy::Backoff => "backoff",
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("invalid resource key '{0}': expected namespace/name")]
    InvalidKey(String),
    #[error("failed to get DatabaseSchema: {0}")]
    Store(#[from] StoreError),
    #[error("waiting for dependency: {0}")]
    WaitingForDependency(#[source] ResolveError),
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("failed to open database connection: {0}")]
    Connection(#[source] DriverError),
    #[error("failed to query migration version: {0}")]
    VersionQuery(#[source] DriverError),
    #[error("database is dirty at version {version}")]
    Dirty { version: u64 },
    #[error("migration to version {target} failed: {source}")]
    Migration {
        target: u64,
        #[source]
        source: DriverError,
    },
}

impl ReconcilerError {
    #[must_use]
    pub fn requeue_policy(&self) -> RequeuePolicy {
        match self {
            ReconcilerError::InvalidKey(_) => RequeuePolicy::Never,
            ReconcilerError::WaitingForDependency(_) => RequeuePolicy::AfterDelay,
            ReconcilerError::Store(_)
            | ReconcilerError::Configuration(_)
            | ReconcilerError::Connection(_)
            | ReconcilerError::VersionQuery(_)
            | ReconcilerError::Dirty { .. }
            | ReconcilerError::Migration { .. } => RequeuePolicy::Backoff,
        }
    }
}

/// What a successful reconciliation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The resource no longer exists
    Deleted,
    /// The database was already at the target version
    AlreadyAtVersion { version: u64 },
    /// Migrations ran; `from` is `None` when nothing had been applied before
    Migrated { from: Option<u64>, to: u64 },
}

#[derive(Clone)]
pub struct Reconciler {
    pub(crate) store: Arc<dyn ResourceStore>,
    pub(crate) secrets: Arc<dyn SecretSource>,
    pub(crate) driver: Arc<dyn MigrationDriver>,
    pub(crate) events: Arc<dyn EventPublisher>,
    pub(crate) status: StatusReporter,
    /// Open connections keyed by `namespace.name`
    pub connections: Arc<ConnectionCache>,
    /// Backoff state per resource (identified by namespace/name)
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
    pub config: ControllerConfig,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("driver", &self.driver)
            .field("connections", &self.connections)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        store: Arc<dyn ResourceStore>,
        secrets: Arc<dyn SecretSource>,
        driver: Arc<dyn MigrationDriver>,
        events: Arc<dyn EventPublisher>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            status: StatusReporter::new(Arc::clone(&store)),
            store,
            secrets,
            driver,
            events,
            connections: Arc::new(ConnectionCache::new()),
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Reconciler wired to the Kubernetes API and Postgres
    #[must_use]
    pub fn from_client(client: Client, config: ControllerConfig) -> Self {
        let store = Arc::new(KubeResourceStore::new(
            client.clone(),
            config.controller_name.clone(),
        ));
        let secrets = Arc::new(KubeSecretSource::new(client.clone()));
        let events = Arc::new(KubeEventPublisher::new(
            client,
            &config.controller_name,
            config.pod_name.clone(),
        ));
        Self::new(
            store,
            secrets,
            Arc::new(PostgresDriver::new()),
            events,
            config,
        )
    }
}
