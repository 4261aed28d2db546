//! # Error Policy
//!
//! Turns reconciliation errors into requeue decisions and classifies watch
//! stream errors for logging.

use crate::controller::backoff::BackoffState;
use crate::controller::reconciler::{Reconciler, ReconcilerError, RequeuePolicy};
use crate::crd::DatabaseSchema;
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};

/// Handle reconciliation errors according to their requeue policy
///
/// Backoff state is tracked per resource so one failing schema never slows down another.
pub fn handle_reconciliation_error(
    obj: Arc<DatabaseSchema>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();
    let policy = error.requeue_policy();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = %name,
        resource.namespace = %namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    observability::metrics::increment_requeues_total(policy.as_str());
    match policy {
        RequeuePolicy::Never => {
            error!("Reconciliation of {}/{} cannot succeed: {}", namespace, name, error);
            Action::await_change()
        }
        RequeuePolicy::AfterDelay => {
            let delay = ctx.config.dependency_requeue_duration();
            info!(
                "{}/{} waiting on a dependency, retrying in {}s: {}",
                namespace,
                name,
                delay.as_secs(),
                error
            );
            Action::requeue(delay)
        }
        RequeuePolicy::Backoff => {
            let resource_key = format!("{namespace}/{name}");
            let (delay, error_count) = next_backoff(&ctx, &resource_key);
            let next_trigger_time = chrono::Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

            error!("Reconciliation error for {}/{}: {}", namespace, name, error);
            info!(
                "Retrying {} in {}s (error count: {}, next attempt at {})",
                resource_key,
                delay.as_secs(),
                error_count,
                next_trigger_time.to_rfc3339()
            );
            Action::requeue(delay)
        }
    }
}

/// Advance the backoff for `resource_key`, creating it on first failure
///
/// With backoff disabled the failure is still counted but the delay is the fixed error requeue.
fn next_backoff(ctx: &Reconciler, resource_key: &str) -> (Duration, u32) {
    let mut states = ctx
        .backoff_states
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let state = states.entry(resource_key.to_string()).or_insert_with(|| {
        BackoffState::new(ctx.config.backoff_min_minutes, ctx.config.backoff_max_minutes)
    });
    let delay = state.record_failure();
    if ctx.config.fixed_error_requeue() {
        return (
            ctx.config.reconciliation_error_requeue_duration(),
            state.error_count,
        );
    }
    (delay, state.error_count)
}

/// Kind of watch stream failure, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// RBAC revoked or token expired
    Unauthorized,
    /// Resource version too old; the watcher relists
    Expired,
    /// API server throttling or reinitializing storage
    Throttled,
    /// CRD missing or object deleted mid-watch
    NotFound,
    Other,
}

/// Classify a watch stream error by its rendered text
#[must_use]
pub fn classify_watch_error(error: &str) -> WatchErrorKind {
    // 404 first: plain-text 404 bodies surface as WatchFailed errors too
    if error.contains("ObjectNotFound") || error.contains("404") || error.contains("not found") {
        WatchErrorKind::NotFound
    } else if error.contains("401") || error.contains("Unauthorized") {
        WatchErrorKind::Unauthorized
    } else if error.contains("410")
        || error.contains("too old resource version")
        || error.contains("Expired")
        || error.contains("Gone")
    {
        WatchErrorKind::Expired
    } else if error.contains("429")
        || error.contains("storage is (re)initializing")
        || error.contains("TooManyRequests")
    {
        WatchErrorKind::Throttled
    } else {
        WatchErrorKind::Other
    }
}

/// Log a watch stream error at a level matching its kind
pub fn handle_watch_stream_error(error: &str) {
    match classify_watch_error(error) {
        WatchErrorKind::Unauthorized => error!(
            "Watch authentication failed (401 Unauthorized), check the controller's RBAC: {}",
            error
        ),
        WatchErrorKind::Expired => {
            warn!("Watch resource version expired (410), watcher will relist");
        }
        WatchErrorKind::Throttled => warn!("API server throttling the watch (429): {}", error),
        WatchErrorKind::NotFound => warn!(
            "DatabaseSchema watch returned 404, the CRD may be missing: {}",
            error
        ),
        WatchErrorKind::Other => error!("Controller stream error: {}", error),
    }
}
