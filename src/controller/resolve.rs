//! # Input Resolution
//!
//! Resolves the connection string and migration source a `DatabaseSchema`
//! points at, from inline values, secrets, or the related `Database`.
//!
//! Every failure is classified as either [`ResolveError::NotYetAvailable`]
//! (something referenced has not been created yet, retry shortly) or
//! [`ResolveError::Failed`] (the reference itself is wrong).

use crate::controller::store::{ResourceStore, StoreError};
use crate::crd::{DatabaseSchema, ValueSource};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use std::fmt;
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },
    #[error("secret {namespace}/{name}: {reason}")]
    Invalid {
        namespace: String,
        name: String,
        reason: String,
    },
    #[error("failed to read secret: {0}")]
    Api(#[from] kube::Error),
}

/// Read-only access to secret values
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Value of `key` in secret `name`
    async fn get(&self, namespace: &str, name: &str, key: &str) -> Result<String, SecretError>;
}

/// `SecretSource` backed by Kubernetes `Secret` objects
#[derive(Clone)]
pub struct KubeSecretSource {
    client: Client,
}

impl fmt::Debug for KubeSecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeSecretSource").finish_non_exhaustive()
    }
}

impl KubeSecretSource {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretSource for KubeSecretSource {
    async fn get(&self, namespace: &str, name: &str, key: &str) -> Result<String, SecretError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let Some(secret) = api.get_opt(name).await? else {
            return Err(SecretError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        };

        let invalid = |reason: String| SecretError::Invalid {
            namespace: namespace.to_string(),
            name: name.to_string(),
            reason,
        };

        // stringData is write-only on the server, but fakes and older clusters may still return it
        if let Some(value) = secret.string_data.as_ref().and_then(|d| d.get(key)) {
            return Ok(value.clone());
        }
        let bytes = secret
            .data
            .as_ref()
            .and_then(|d| d.get(key))
            .ok_or_else(|| invalid(format!("key '{key}' not present")))?;
        String::from_utf8(bytes.0.clone())
            .map_err(|e| invalid(format!("key '{key}' is not valid UTF-8: {e}")))
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    /// A referenced secret or `Database` does not exist yet
    #[error("{0}")]
    NotYetAvailable(String),
    /// The reference cannot be resolved as written
    #[error("{0}")]
    Failed(String),
}

impl ResolveError {
    #[must_use]
    pub fn is_not_yet_available(&self) -> bool {
        matches!(self, ResolveError::NotYetAvailable(_))
    }
}

impl From<SecretError> for ResolveError {
    fn from(error: SecretError) -> Self {
        match error {
            SecretError::NotFound { .. } => ResolveError::NotYetAvailable(error.to_string()),
            SecretError::Invalid { .. } | SecretError::Api(_) => {
                ResolveError::Failed(error.to_string())
            }
        }
    }
}

/// Inputs of one reconciliation; never persisted
pub struct ResolvedInputs {
    pub dsn: Zeroizing<String>,
    pub database_name: Option<String>,
    pub source_url: String,
}

impl fmt::Debug for ResolvedInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedInputs")
            .field("dsn", &"<redacted>")
            .field("database_name", &self.database_name)
            .field("source_url", &self.source_url)
            .finish()
    }
}

/// Resolve a single value
///
/// # Errors
///
/// A missing secret is `NotYetAvailable`; every other failure is `Failed`.
pub async fn resolve_value(
    secrets: &dyn SecretSource,
    namespace: &str,
    source: &ValueSource,
) -> Result<String, ResolveError> {
    match source {
        ValueSource::Literal(value) => Ok(value.clone()),
        ValueSource::SecretKeyRef(selector) => {
            debug!(
                "Resolving key '{}' of secret {}/{}",
                selector.key, namespace, selector.name
            );
            Ok(secrets.get(namespace, &selector.name, &selector.key).await?)
        }
    }
}

/// Resolve the connection string: inline, then `dsnFrom`, then the `Database`'s generated secret
///
/// # Errors
///
/// `NotYetAvailable` when the referenced secret or `Database` does not exist yet.
pub async fn resolve_dsn(
    store: &dyn ResourceStore,
    secrets: &dyn SecretSource,
    schema: &DatabaseSchema,
    namespace: &str,
) -> Result<Zeroizing<String>, ResolveError> {
    let source = match schema.spec.dsn_source() {
        Some(source) => source,
        None => {
            let Some(database_name) = schema.spec.database_name() else {
                return Err(ResolveError::Failed(
                    "no dsn, dsnFrom or database is set".to_string(),
                ));
            };
            let database = store
                .get_database(namespace, database_name)
                .await
                .map_err(|e| match e {
                    StoreError::NotFound { .. } => ResolveError::NotYetAvailable(e.to_string()),
                    other => ResolveError::Failed(format!(
                        "failed to get database {namespace}/{database_name}: {other}"
                    )),
                })?
                .ok_or_else(|| {
                    ResolveError::NotYetAvailable(format!(
                        "database {namespace}/{database_name} not found"
                    ))
                })?;
            ValueSource::from(database.dsn_secret())
        }
    };

    let dsn = Zeroizing::new(resolve_value(secrets, namespace, &source).await?);
    if dsn.trim().is_empty() {
        return Err(ResolveError::Failed("resolved dsn is empty".to_string()));
    }
    Ok(dsn)
}

/// Resolve the migration source URL: inline, then `sourceFrom`
///
/// # Errors
///
/// `Failed` when neither is set or the value is empty.
pub async fn resolve_source(
    secrets: &dyn SecretSource,
    schema: &DatabaseSchema,
    namespace: &str,
) -> Result<String, ResolveError> {
    let source = schema
        .spec
        .migration_source()
        .ok_or_else(|| ResolveError::Failed("neither source nor sourceFrom is set".to_string()))?;
    let url = resolve_value(secrets, namespace, &source).await?;
    let url = url.trim();
    if url.is_empty() {
        return Err(ResolveError::Failed("resolved source is empty".to_string()));
    }
    Ok(url.to_string())
}

/// Resolve everything a reconciliation needs
///
/// The connection string is resolved before the source, so a missing DSN secret is reported first.
///
/// # Errors
///
/// See [`resolve_dsn`] and [`resolve_source`].
pub async fn resolve_inputs(
    store: &dyn ResourceStore,
    secrets: &dyn SecretSource,
    schema: &DatabaseSchema,
    namespace: &str,
) -> Result<ResolvedInputs, ResolveError> {
    let dsn = resolve_dsn(store, secrets, schema, namespace).await?;
    let source_url = resolve_source(secrets, schema, namespace).await?;
    Ok(ResolvedInputs {
        dsn,
        database_name: schema.spec.database_name().map(str::to_string),
        source_url,
    })
}
