//! # Events
//!
//! Kubernetes events emitted against a `DatabaseSchema`. Only a successful
//! version change produces one. Publication is best effort.

use crate::crd::DatabaseSchema;
use async_trait::async_trait;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use tracing::warn;

pub const REASON_MIGRATION_SUCCEEDED: &str = "MigrationSucceeded";
pub const ACTION_MIGRATE: &str = "Migrate";

/// An informational event about one schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaEvent {
    pub reason: String,
    pub action: String,
    pub note: String,
}

impl SchemaEvent {
    /// Event for a completed version transition
    #[must_use]
    pub fn migrated(from: Option<u64>, to: u64) -> Self {
        let from = from.map_or_else(|| "none".to_string(), |v| v.to_string());
        Self {
            reason: REASON_MIGRATION_SUCCEEDED.to_string(),
            action: ACTION_MIGRATE.to_string(),
            note: format!("migrated from version {from} to {to}"),
        }
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a Normal event; failures are logged, never returned
    async fn publish(&self, schema: &DatabaseSchema, event: SchemaEvent);
}

/// `EventPublisher` backed by the `events.k8s.io` API
#[derive(Clone)]
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventPublisher").finish_non_exhaustive()
    }
}

impl KubeEventPublisher {
    #[must_use]
    pub fn new(client: Client, controller_name: &str, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, schema: &DatabaseSchema, event: SchemaEvent) {
        let reference = schema.object_ref(&());
        let result = self
            .recorder
            .publish(
                &Event {
                    type_: EventType::Normal,
                    reason: event.reason.clone(),
                    note: Some(event.note.clone()),
                    action: event.action.clone(),
                    secondary: None,
                },
                &reference,
            )
            .await;

        if let Err(e) = result {
            warn!(
                resource.namespace = reference.namespace.as_deref().unwrap_or_default(),
                resource.name = reference.name.as_deref().unwrap_or_default(),
                "Failed to publish {} event: {}", event.reason, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrated_event_mentions_both_versions() {
        let event = SchemaEvent::migrated(Some(1), 3);
        assert_eq!(event.reason, "MigrationSucceeded");
        assert_eq!(event.action, "Migrate");
        assert!(event.note.contains('1'));
        assert!(event.note.contains('3'));
    }

    #[test]
    fn test_migrated_from_nothing() {
        let event = SchemaEvent::migrated(None, 2);
        assert_eq!(event.note, "migrated from version none to 2");
    }
}
