//! # Schema Migration Controller
//!
//! A Kubernetes controller that keeps databases at the migration version
//! declared by their `DatabaseSchema` resources.
//!
//! ## Overview
//!
//! For every `DatabaseSchema` the controller:
//!
//! 1. **Resolves inputs** - connection string inline, from a secret, or from the related `Database`
//! 2. **Reuses connections** - one cached connection per resource, reopened when broken or when the DSN changes
//! 3. **Checks the applied version** - refusing to touch a dirty database
//! 4. **Migrates** - up or down to the target version from a `file://` migration source
//! 5. **Reports** - `Pending`, `Error` or `Success` plus a reason code in status, and an event per migration
//!
//! ## Features
//!
//! - **Multi-namespace**: Watches `DatabaseSchema` resources across all namespaces (or `WATCH_NAMESPACE`)
//! - **Prometheus metrics**: Exposes metrics for monitoring and observability
//! - **Health checks**: HTTP endpoints for liveness and readiness checks

use anyhow::Result;
use schema_migration_controller::runtime::{initialization::initialize, watch_loop::run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(init.schemas, init.reconciler, init.server_state).await
}
