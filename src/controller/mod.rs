//! # Controller
//!
//! Reconciliation core for component route RBAC.
//!
//! - `hash`: stable correlation keys for component routes
//! - `intersect`: spec/status join producing reconciliation targets
//! - `rbac`: Role and RoleBinding builders
//! - `upsert`: per-target convergence of derived objects
//! - `gc`: removal of derived objects with no active target
//! - `reconciler`: the reconcile driver
//! - `store`: collaborator traits and their implementations
//! - `backoff`: Fibonacci backoff for retries

pub mod backoff;
pub mod gc;
pub mod hash;
pub mod intersect;
pub mod rbac;
pub mod reconciler;
pub mod store;
pub mod upsert;
