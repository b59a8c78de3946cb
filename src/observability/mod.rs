//! # Observability
//!
//! Prometheus metrics and tracing setup.
//!
//! - `metrics`: Prometheus metrics collection
//! - `tracing`: subscriber initialization

pub mod metrics;
pub mod tracing;
