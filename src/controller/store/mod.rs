//! # Object Stores
//!
//! Collaborator interfaces the reconciliation core talks to.
//!
//! - `ParentSource` reads the Ingress config being reconciled
//! - `DerivedObjectStore` lists, creates, updates, and deletes derived
//!   Roles and RoleBindings inside the managed namespace
//!
//! `KubeStore` backs both with the Kubernetes API. `MemoryStore` keeps
//! everything in process and is what the test suite drives.

mod cluster;
mod memory;

pub use cluster::KubeStore;
pub use memory::{Failure, MemoryStore, Operation};

use crate::crd::Ingress;
use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },
    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid {kind}: {reason}")]
    Invalid { kind: &'static str, reason: String },
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

/// Source of the Ingress config resources being reconciled
#[async_trait]
pub trait ParentSource: Send + Sync {
    /// Fetch an Ingress config by name
    ///
    /// Returns `StoreError::NotFound` when the resource does not exist.
    async fn get_parent(&self, name: &str) -> Result<Ingress, StoreError>;
}

/// Store of derived Roles and RoleBindings in the managed namespace
///
/// Selectors use Kubernetes label selector syntax (`key` or `key=value`,
/// comma separated). List results keep a stable order between calls.
#[async_trait]
pub trait DerivedObjectStore: Send + Sync {
    async fn list_roles(&self, selector: &str) -> Result<Vec<Role>, StoreError>;

    /// Create a Role, returning it as persisted (with its final name)
    async fn create_role(&self, role: &Role) -> Result<Role, StoreError>;

    async fn update_role(&self, role: &Role) -> Result<Role, StoreError>;

    async fn delete_role(&self, name: &str) -> Result<(), StoreError>;

    async fn list_role_bindings(&self, selector: &str) -> Result<Vec<RoleBinding>, StoreError>;

    /// Create a RoleBinding, returning it as persisted
    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, StoreError>;

    async fn update_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, StoreError>;

    async fn delete_role_binding(&self, name: &str) -> Result<(), StoreError>;
}
