//! # Reconciliation Logic
//!
//! Brings one `DatabaseSchema` to its target version.
//!
//! 1. Fetch the resource (gone means nothing to do)
//! 2. Resolve the connection string and migration source
//! 3. Reuse or open the cached connection for the resource
//! 4. Read the applied version and dirty flag
//! 5. Refuse to touch a dirty database
//! 6. Migrate when the applied version differs from the target
//! 7. Record the outcome in status

use crate::controller::connection_cache::{CacheLookup, ConnectionCache, ConnectionHandle};
use crate::controller::driver::{DriverError, MigrationSource, MigrationVersion};
use crate::controller::events::SchemaEvent;
use crate::controller::reconciler::types::{
    ReconcileOutcome, Reconciler, ReconcilerError, StatusReason,
};
use crate::controller::resolve::resolve_inputs;
use crate::crd::DatabaseSchema;
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::{Arc, PoisonError};
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Split a `namespace/name` key
///
/// # Errors
///
/// Both parts must be non-empty and the name must not contain another `/`.
pub fn split_key(key: &str) -> Result<(&str, &str), ReconcilerError> {
    match key.split_once('/') {
        Some((namespace, name))
            if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok((namespace, name))
        }
        _ => Err(ReconcilerError::InvalidKey(key.to_string())),
    }
}

fn render_version(version: Option<u64>) -> String {
    version.map_or_else(|| "none".to_string(), |v| v.to_string())
}

/// Entry point for `kube_runtime::Controller`
///
/// Errors are turned into requeues by `runtime::error_policy`.
pub async fn reconcile(
    schema: Arc<DatabaseSchema>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let namespace = schema.namespace().unwrap_or_default();
    let name = schema.name_any();
    let key = format!("{namespace}/{name}");

    let span = info_span!(
        "reconcile",
        resource.namespace = %namespace,
        resource.name = %name,
        resource.kind = "DatabaseSchema",
        resource.target_version = schema.spec.version
    );

    metrics::increment_reconciliations();
    let start = Instant::now();
    let result = ctx.reconcile_key(&key).instrument(span).await;
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    match result {
        Ok(outcome) => {
            ctx.reset_backoff(&key);
            if outcome == ReconcileOutcome::Deleted {
                return Ok(Action::await_change());
            }
            metrics::increment_requeues_total("resync");
            Ok(Action::requeue(ctx.config.resync_interval()))
        }
        Err(e) => {
            metrics::increment_reconciliation_errors();
            Err(e)
        }
    }
}

impl Reconciler {
    /// Reconcile the schema identified by `namespace/name`
    ///
    /// Writes status for every outcome except a malformed key, a failed fetch and a deleted resource.
    ///
    /// # Errors
    ///
    /// Any error asks the dispatcher to retry; see [`ReconcilerError::requeue_policy`].
    pub async fn reconcile_key(&self, key: &str) -> Result<ReconcileOutcome, ReconcilerError> {
        let (namespace, name) = split_key(key)?;
        let cache_key = ConnectionCache::key_for(namespace, name);

        let Some(schema) = self.store.get_schema(namespace, name).await? else {
            debug!("DatabaseSchema {}/{} no longer exists", namespace, name);
            self.drop_connection(&cache_key, "deleted").await;
            return Ok(ReconcileOutcome::Deleted);
        };
        let target = schema.spec.version;

        let inputs = match resolve_inputs(
            self.store.as_ref(),
            self.secrets.as_ref(),
            &schema,
            namespace,
        )
        .await
        {
            Ok(inputs) => inputs,
            Err(e) if e.is_not_yet_available() => {
                info!("Waiting for dependency of {}/{}: {}", namespace, name, e);
                self.record(&schema, StatusReason::DependencyNotReady, &e.to_string())
                    .await;
                return Err(ReconcilerError::WaitingForDependency(e));
            }
            Err(e) => {
                warn!("Cannot resolve inputs of {}/{}: {}", namespace, name, e);
                self.record(&schema, StatusReason::InvalidConfiguration, &e.to_string())
                    .await;
                return Err(ReconcilerError::Configuration(e.to_string()));
            }
        };

        let source = match MigrationSource::parse(&inputs.source_url) {
            Ok(source) => source,
            Err(e) => {
                self.record(&schema, StatusReason::InvalidConfiguration, &e.to_string())
                    .await;
                return Err(ReconcilerError::Configuration(e.to_string()));
            }
        };

        let connection = match self.connection_for(&cache_key, &inputs.dsn).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Failed to open database for {}/{}: {}", namespace, name, e);
                self.record(
                    &schema,
                    StatusReason::ConnectionFailed,
                    &format!("failed to open database connection: {e}"),
                )
                .await;
                return Err(ReconcilerError::Connection(e));
            }
        };

        let mut schema = schema;
        let applied = match connection.current_version().await {
            Ok(Some(applied)) => Some(applied),
            Ok(None) => {
                info!("No migration applied yet to {}/{}", namespace, name);
                schema = self
                    .record(
                        &schema,
                        StatusReason::NoVersionApplied,
                        &format!("no migration applied yet, migrating to version {target}"),
                    )
                    .await;
                None
            }
            Err(e) => {
                let reason = if e.is_connection_broken() {
                    warn!(
                        "Connection for {}/{} is broken, dropping it: {}",
                        namespace, name, e
                    );
                    self.drop_connection(&cache_key, "broken").await;
                    StatusReason::ConnectionBroken
                } else {
                    StatusReason::VersionQueryFailed
                };
                self.record(
                    &schema,
                    reason,
                    &format!("failed to query migration version: {e}"),
                )
                .await;
                return Err(ReconcilerError::VersionQuery(e));
            }
        };
        let from = applied.map(|v| v.version);

        if let Some(MigrationVersion {
            version,
            dirty: true,
        }) = applied
        {
            metrics::increment_dirty_databases();
            warn!(
                "Database of {}/{} is dirty at version {}, not migrating",
                namespace, name, version
            );
            self.record(
                &schema,
                StatusReason::DirtyDatabase,
                &format!(
                    "database is dirty at version {version}: a previous migration stopped part-way, fix it manually and force the version"
                ),
            )
            .await;
            return Err(ReconcilerError::Dirty { version });
        }

        // Nothing applied is the same as version 0
        if from.unwrap_or(0) == target {
            debug!("{}/{} already at version {}", namespace, name, target);
            self.record(
                &schema,
                StatusReason::AlreadySynced,
                &format!("already synced: database is at requested version {target}"),
            )
            .await;
            return Ok(ReconcileOutcome::AlreadyAtVersion { version: target });
        }

        info!(
            "Migrating {}/{} from version {} to {} using {}",
            namespace,
            name,
            render_version(from),
            target,
            source
        );
        if let Err(e) = connection.apply_to(&source, target).await {
            metrics::increment_migration_failures();
            if e.is_connection_broken() {
                self.drop_connection(&cache_key, "broken").await;
            }
            self.record(
                &schema,
                StatusReason::MigrationFailed,
                &format!(
                    "failed to migrate from version {} to {target}: {e}",
                    render_version(from)
                ),
            )
            .await;
            return Err(ReconcilerError::Migration { target, source: e });
        }

        metrics::increment_migrations_applied();
        info!(
            "Migrated {}/{} from version {} to {}",
            namespace,
            name,
            render_version(from),
            target
        );
        self.events
            .publish(&schema, SchemaEvent::migrated(from, target))
            .await;
        self.record(
            &schema,
            StatusReason::MigrationApplied,
            &format!(
                "synced: migrated from version {} to {target}",
                render_version(from)
            ),
        )
        .await;

        Ok(ReconcileOutcome::Migrated { from, to: target })
    }

    /// Cached connection for `key`, opening one when missing or opened with another DSN
    async fn connection_for(&self, key: &str, dsn: &str) -> Result<ConnectionHandle, DriverError> {
        match self.connections.get_for(key, dsn) {
            CacheLookup::Hit(handle) => return Ok(handle),
            CacheLookup::Stale(stale) => {
                info!("Connection string for {} changed, reopening", key);
                metrics::increment_connection_evictions("dsn-changed");
                stale.close().await;
            }
            CacheLookup::Miss => {}
        }

        let handle = self.driver.open(dsn).await?;
        metrics::increment_connections_opened();
        self.connections.put(key, dsn, Arc::clone(&handle));
        Ok(handle)
    }

    async fn drop_connection(&self, key: &str, cause: &str) {
        if let Some(handle) = self.connections.evict(key) {
            metrics::increment_connection_evictions(cause);
            handle.close().await;
        }
    }

    /// Write status, returning the stored resource or the original one if the write failed
    async fn record(
        &self,
        schema: &DatabaseSchema,
        reason: StatusReason,
        message: &str,
    ) -> DatabaseSchema {
        match self
            .status
            .set_status(schema, reason.state(), reason.as_str(), message)
            .await
        {
            Ok(updated) => updated,
            Err(e) => *e.original,
        }
    }

    /// Forget accumulated backoff after a successful reconciliation
    pub fn reset_backoff(&self, key: &str) {
        let mut states = self
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = states.get_mut(key) {
            state.reset();
        }
    }
}
