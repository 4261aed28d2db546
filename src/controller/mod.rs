//! # Controller
//!
//! Core controller modules for the schema migration controller.
//!
//! - `backoff`: Fibonacci backoff mechanism for retries
//! - `connection_cache`: open database connections per resource
//! - `driver`: migration driver boundary and the Postgres implementation
//! - `events`: Kubernetes events for completed migrations
//! - `reconciler`: Core reconciliation logic
//! - `resolve`: DSN and migration source resolution
//! - `server`: HTTP server for metrics and health checks
//! - `status`: status subresource updates
//! - `store`: resource reads and status writes

pub mod backoff;
pub mod connection_cache;
pub mod driver;
pub mod events;
pub mod reconciler;
pub mod resolve;
pub mod server;
pub mod status;
pub mod store;
