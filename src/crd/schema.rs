//! # DatabaseSchema Spec
//!
//! The resource this controller reconciles.

use crate::crd::{ValueFrom, ValueSource};
use serde::{Deserialize, Serialize};

/// DatabaseSchema Custom Resource Definition
///
/// Declares which migration version a database should be at and where the
/// migrations live.
///
/// # Example
///
/// ```yaml
/// apiVersion: atlasdb.infoblox.com/v1alpha1
/// kind: DatabaseSchema
/// metadata:
///   name: orders
///   namespace: default
/// spec:
///   database: orders-db
///   source: file:///migrations/orders
///   version: 3
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "DatabaseSchema",
    group = "atlasdb.infoblox.com",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::DatabaseSchemaStatus",
    shortname = "dbschema",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}, {"name":"Version", "type":"integer", "jsonPath":".spec.version"}, {"name":"Reason", "type":"string", "jsonPath":".status.reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSchemaSpec {
    /// Connection string given inline
    /// Takes precedence over `dsnFrom` and over the `database` resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsn: Option<String>,
    /// Connection string read from a secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsn_from: Option<ValueFrom>,
    /// Name of a `Database` in the same namespace
    /// Its generated secret supplies the connection string when neither `dsn` nor `dsnFrom` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Migration source URL given inline (e.g. `file:///migrations/orders`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Migration source URL read from a secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_from: Option<ValueFrom>,
    /// Target migration version
    pub version: u64,
}

impl DatabaseSchemaSpec {
    /// Explicit connection string source, if the spec sets one
    #[must_use]
    pub fn dsn_source(&self) -> Option<ValueSource> {
        ValueSource::pick(self.dsn.as_deref(), self.dsn_from.as_ref())
    }

    /// Migration source URL source, if the spec sets one
    #[must_use]
    pub fn migration_source(&self) -> Option<ValueSource> {
        ValueSource::pick(self.source.as_deref(), self.source_from.as_ref())
    }

    /// Referenced `Database` name, ignoring blanks
    #[must_use]
    pub fn database_name(&self) -> Option<&str> {
        self.database
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}
