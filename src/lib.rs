//! Ingress Routes Controller Library
//!
//! Grants the operators that consume a component route read access to the
//! serving certificate secret an administrator configured for it.
//!
//! For every component route listed in both the spec and the status of the
//! cluster `Ingress` config, the controller keeps one Role (read access to
//! the serving secret) and one RoleBinding (the route's consuming service
//! accounts) in the secret namespace. Derived objects are tagged with a
//! correlation hash label and removed once their route is no longer active.
//!
//! ## Quick Start
//!
//! ```rust
//! use ingress_routes_controller::prelude::*;
//! ```

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod server;
