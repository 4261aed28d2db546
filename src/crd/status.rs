//! # DatabaseSchema Status
//!
//! Status written back after every reconciliation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse reconciliation state
///
/// Persisted as exactly `Pending`, `Error` or `Success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum SchemaState {
    /// Waiting on something that does not exist yet, or no migration applied so far
    Pending,
    /// The last reconciliation failed
    Error,
    /// The database is at the requested version
    Success,
}

impl SchemaState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaState::Pending => "Pending",
            SchemaState::Error => "Error",
            SchemaState::Success => "Success",
        }
    }
}

impl fmt::Display for SchemaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the DatabaseSchema resource
///
/// Derived only from the most recent reconciliation; the controller never reads it back.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSchemaStatus {
    /// Pending, Error or Success
    #[serde(default)]
    pub state: Option<SchemaState>,
    /// Human-readable description of the outcome
    #[serde(default)]
    pub message: Option<String>,
    /// Machine-readable reason code (e.g. `DirtyDatabase`, `MigrationApplied`)
    #[serde(default)]
    pub reason: Option<String>,
    /// Generation of the spec this status was computed from
    #[serde(default)]
    pub observed_generation: Option<i64>,
}
