//! # Runtime
//!
//! Process bootstrap and the controller watch loop.
//!
//! - `initialization`: rustls, tracing, metrics, server and client setup
//! - `watch_loop`: The kube-runtime controller over secrets
//! - `error_policy`: Requeue decisions for failed reconciliations

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
