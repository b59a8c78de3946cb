//! # Custom Resource Definitions
//!
//! Types for the `config.openshift.io/v1` `Ingress` resource whose component
//! routes drive RBAC generation.
//!
//! ## Module Structure
//!
//! - `spec.rs` - Resource kind and desired component routes
//! - `status.rs` - Component route status reported by other operators

mod spec;
mod status;

pub use spec::{ComponentRouteSpec, Ingress, IngressSpec, SecretNameReference};
pub use status::{ComponentRouteCondition, ComponentRouteStatus, IngressStatus, RelatedObject};
