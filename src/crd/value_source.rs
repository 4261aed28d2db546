//! # Value Sources
//!
//! Inline-or-secret references used by `DatabaseSchema` for its connection
//! string and migration source.

use serde::{Deserialize, Serialize};

/// Reference to a value held by a Kubernetes secret
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValueFrom {
    /// Secret and key holding the value
    pub secret_key_ref: SecretKeySelector,
}

/// Selects a key of a secret in the resource's namespace
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    /// Secret name
    pub name: String,
    /// Key within the secret's data
    pub key: String,
}

/// Where a single configuration value comes from, after inline/reference precedence is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value given directly in the resource spec
    Literal(String),
    /// Value read from a secret in the resource's namespace
    SecretKeyRef(SecretKeySelector),
}

impl ValueSource {
    /// Pick the inline value when it is non-empty, otherwise the secret reference
    #[must_use]
    pub fn pick(literal: Option<&str>, reference: Option<&ValueFrom>) -> Option<Self> {
        match literal.map(str::trim).filter(|v| !v.is_empty()) {
            Some(value) => Some(Self::Literal(value.to_string())),
            None => reference.map(|r| Self::SecretKeyRef(r.secret_key_ref.clone())),
        }
    }

    /// Name of the secret behind this source, if any (for status messages)
    #[must_use]
    pub fn secret_name(&self) -> Option<&str> {
        match self {
            Self::Literal(_) => None,
            Self::SecretKeyRef(selector) => Some(selector.name.as_str()),
        }
    }
}

impl From<SecretKeySelector> for ValueSource {
    fn from(selector: SecretKeySelector) -> Self {
        Self::SecretKeyRef(selector)
    }
}
