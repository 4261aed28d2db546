//! # Watch Loop
//!
//! Controller watch loop that monitors DatabaseSchema resources and triggers
//! reconciliation when changes are detected.

use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::DatabaseSchema;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::{controller, watcher, Controller};
use std::sync::Arc;
use tracing::{debug, info};

/// Run the controller watch loop
///
/// Reconciliations of the same resource never overlap; up to
/// `max_concurrent_reconciliations` different resources run at once.
/// Returns once a shutdown signal has been received and in-flight
/// reconciliations have finished.
///
/// # Errors
///
/// Currently never fails; the signature leaves room for setup errors.
pub async fn run_watch_loop(
    schemas: Api<DatabaseSchema>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    info!("Starting controller watch loop...");

    // Mark not ready as soon as shutdown starts so traffic drains before exit
    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, initiating graceful shutdown...");
            shutdown_server_state.set_ready(false);
            info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
        }
    });

    let concurrency = reconciler.config.max_concurrent_reconciliations;
    Controller::new(schemas, watcher::Config::default().any_semantic())
        .with_config(controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, reconciler)
        .for_each(|result| async move {
            match result {
                Ok((object, action)) => {
                    debug!(
                        resource.namespace = object.namespace.as_deref().unwrap_or_default(),
                        resource.name = %object.name,
                        "Reconciled, next: {:?}", action
                    );
                }
                Err(e) => handle_watch_stream_error(&format!("{e:?}")),
            }
        })
        .await;

    server_state.set_ready(false);
    info!("Controller stopped gracefully");
    Ok(())
}
