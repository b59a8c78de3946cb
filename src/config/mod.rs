//! # Configuration
//!
//! Controller configuration loaded from environment variables.

mod controller;

pub use controller::{ControllerConfig, NamingMode};
