//! # Runtime
//!
//! Process-level wiring around the reconciliation core.
//!
//! - `initialization`: rustls, tracing, metrics, HTTP server, and client setup
//! - `watch_loop`: kube-runtime controller and event mapping
//! - `error_policy`: retry decisions for failed reconciliations and stream errors

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
