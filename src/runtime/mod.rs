//! # Runtime
//!
//! Process wiring for the controller binary.
//!
//! - `initialization`: crypto provider, logging, metrics, HTTP server, Kubernetes client
//! - `watch_loop`: the `kube_runtime::Controller` driving reconciliations
//! - `error_policy`: requeue decisions after failed reconciliations

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
