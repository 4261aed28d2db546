//! # Custom Resource Definitions
//!
//! CRD types for the Schema Migration Controller.
//!
//! ## Module Structure
//!
//! - `schema.rs` - `DatabaseSchema`, the reconciled resource
//! - `database.rs` - `Database`, read to locate generated connection strings
//! - `status.rs` - `DatabaseSchema` status types
//! - `value_source.rs` - inline-or-secret value references

mod database;
mod schema;
mod status;
mod value_source;

pub use database::{Database, DatabaseSpec};
pub use schema::{DatabaseSchema, DatabaseSchemaSpec};
pub use status::{DatabaseSchemaStatus, SchemaState};
pub use value_source::{SecretKeySelector, ValueFrom, ValueSource};
