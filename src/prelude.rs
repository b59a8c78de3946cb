//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use ingress_routes_controller::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Collaborator traits and stores
pub use crate::controller::store::{
    DerivedObjectStore, KubeStore, MemoryStore, ParentSource, StoreError,
};

// Reconciler types
pub use crate::controller::reconciler::{
    reconcile, reconcile_key, reconcile_parent, BackoffState, ReconcileOutcome, ReconcileSummary,
    Reconciler, ReconcilerError, TriggerSource,
};

pub use crate::controller::hash::{hash_key, LogicalKey};
pub use crate::controller::intersect::{active_targets, ReconciliationTarget};

// Configuration
pub use crate::config::{ControllerConfig, NamingMode};
