//! # Resource Store
//!
//! Read access to `DatabaseSchema` and `Database` resources plus the one write
//! the controller performs: the schema's status subresource.

use crate::crd::{Database, DatabaseSchema, DatabaseSchemaStatus};
use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// `Ok(None)` when the schema does not exist
    async fn get_schema(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DatabaseSchema>, StoreError>;

    /// `Ok(None)` when the database does not exist
    async fn get_database(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Database>, StoreError>;

    /// Replace the schema's status and return the server's resulting object
    async fn update_schema_status(
        &self,
        namespace: &str,
        name: &str,
        status: &DatabaseSchemaStatus,
    ) -> Result<DatabaseSchema, StoreError>;
}

/// `ResourceStore` backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeResourceStore {
    client: Client,
    field_manager: String,
}

impl std::fmt::Debug for KubeResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeResourceStore")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

impl KubeResourceStore {
    #[must_use]
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn get_schema(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DatabaseSchema>, StoreError> {
        let api: Api<DatabaseSchema> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_database(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Database>, StoreError> {
        let api: Api<Database> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn update_schema_status(
        &self,
        namespace: &str,
        name: &str,
        status: &DatabaseSchemaStatus,
    ) -> Result<DatabaseSchema, StoreError> {
        let api: Api<DatabaseSchema> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "status": status
        });

        // patch_status answers with the object as stored, so no re-read is needed
        api.patch_status(
            name,
            &PatchParams::apply(&self.field_manager),
            &Patch::Merge(patch),
        )
        .await
        .map_err(|e| match e {
            kube::Error::Api(ref response) if response.code == 404 => StoreError::NotFound {
                kind: "DatabaseSchema",
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            other => StoreError::Api(other),
        })
    }
}
