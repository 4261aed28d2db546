//! # Status Reporter
//!
//! Writes the outcome of a reconciliation to the `DatabaseSchema` status.
//!
//! The fetched resource may be shared with other readers, so the new status is
//! built on a copy and the server's resulting object is returned. A failed
//! write is logged and counted but never changes the reconciliation outcome.

use crate::controller::store::{ResourceStore, StoreError};
use crate::crd::{DatabaseSchema, DatabaseSchemaStatus, SchemaState};
use crate::observability::metrics;
use kube::ResourceExt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// A status write that did not reach the server
#[derive(Debug, Error)]
#[error("failed to update status: {error}")]
pub struct StatusWriteError {
    /// The resource as it was before the attempted write
    pub original: Box<DatabaseSchema>,
    #[source]
    pub error: StoreError,
}

#[derive(Clone)]
pub struct StatusReporter {
    store: Arc<dyn ResourceStore>,
}

impl std::fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReporter").finish_non_exhaustive()
    }
}

/// Status a reconciliation wants to record
#[must_use]
pub fn build_status(
    schema: &DatabaseSchema,
    state: SchemaState,
    reason: &str,
    message: &str,
) -> DatabaseSchemaStatus {
    DatabaseSchemaStatus {
        state: Some(state),
        message: Some(message.to_string()),
        reason: Some(reason.to_string()),
        observed_generation: schema.metadata.generation,
    }
}

impl StatusReporter {
    #[must_use]
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Record `state` with a reason code and message
    ///
    /// Returns the updated resource, or on failure the original resource together with the error.
    pub async fn set_status(
        &self,
        schema: &DatabaseSchema,
        state: SchemaState,
        reason: &str,
        message: &str,
    ) -> Result<DatabaseSchema, StatusWriteError> {
        let namespace = schema.namespace().unwrap_or_default();
        let name = schema.name_any();

        let mut updated = schema.clone();
        let status = build_status(schema, state, reason, message);
        updated.status = Some(status.clone());

        debug!(
            resource.namespace = %namespace,
            resource.name = %name,
            "Setting status {} ({}): {}", state, reason, message
        );

        match self
            .store
            .update_schema_status(&namespace, &name, &status)
            .await
        {
            // Fall back to the local copy if the server response carried no status
            Ok(stored) if stored.status.is_none() => Ok(updated),
            Ok(stored) => Ok(stored),
            Err(error) => {
                metrics::increment_status_update_failures();
                warn!(
                    resource.namespace = %namespace,
                    resource.name = %name,
                    "Failed to update status to {}: {}", state, error
                );
                Err(StatusWriteError {
                    original: Box::new(schema.clone()),
                    error,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::DatabaseSchemaSpec;

    #[test]
    fn test_build_status_records_generation() {
        let mut schema = DatabaseSchema::new(
            "orders",
            DatabaseSchemaSpec {
                version: 3,
                ..Default::default()
            },
        );
        schema.metadata.generation = Some(7);

        let status = build_status(&schema, SchemaState::Success, "MigrationApplied", "synced");
        assert_eq!(status.state, Some(SchemaState::Success));
        assert_eq!(status.reason.as_deref(), Some("MigrationApplied"));
        assert_eq!(status.message.as_deref(), Some("synced"));
        assert_eq!(status.observed_generation, Some(7));
        assert!(schema.status.is_none());
    }
}
