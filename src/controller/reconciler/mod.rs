//! # Reconciler
//!
//! Reconcile driver for the cluster `Ingress` config.
//!
//! ## Reconciliation Flow
//!
//! 1. Fetch the Ingress config by name (missing means nothing to do)
//! 2. Intersect spec and status component routes into active targets
//! 3. Converge one Role and one RoleBinding per target
//! 4. Garbage-collect labeled derived objects with no active target
//!
//! The driver never sleeps or retries on its own. Failures surface as a
//! requeue request and backoff is owned by the runtime error policy.

pub mod reconcile;
pub mod types;

pub use reconcile::{reconcile, reconcile_key, reconcile_parent};
pub use types::{
    BackoffState, ReconcileOutcome, ReconcileSummary, Reconciler, ReconcilerError, TriggerSource,
};
