//! # Database
//!
//! The database a schema is applied to. Owned by another controller; read-only here.

use crate::constants::DATABASE_DSN_SECRET_KEY;
use crate::crd::SecretKeySelector;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

/// Database Custom Resource Definition
///
/// Only the location of its generated connection-string secret matters to
/// this controller.
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Database",
    group = "atlasdb.infoblox.com",
    version = "v1alpha1",
    namespaced,
    shortname = "db"
)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Name of the database server this database lives on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Name of the secret holding the generated connection string
    /// Defaults to the Database's own name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsn_secret_name: Option<String>,
}

impl Database {
    /// Secret key holding this database's generated connection string
    #[must_use]
    pub fn dsn_secret(&self) -> SecretKeySelector {
        let name = self
            .spec
            .dsn_secret_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map_or_else(|| self.name_any(), str::to_string);
        SecretKeySelector {
            name,
            key: DATABASE_DSN_SECRET_KEY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dsn_secret_defaults_to_database_name() {
        let db = Database::new("orders-db", DatabaseSpec::default());
        let secret = db.dsn_secret();
        assert_eq!(secret.name, "orders-db");
        assert_eq!(secret.key, "dsn");
    }

    #[test]
    fn test_dsn_secret_override() {
        let db = Database::new(
            "orders-db",
            DatabaseSpec {
                server: Some("pg-main".to_string()),
                dsn_secret_name: Some("orders-db-credentials".to_string()),
            },
        );
        assert_eq!(db.dsn_secret().name, "orders-db-credentials");
    }
}
