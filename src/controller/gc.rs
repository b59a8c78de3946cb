//! # Garbage Collection
//!
//! Removes derived Roles and RoleBindings whose correlation hash no longer
//! belongs to an active reconciliation target.
//!
//! Every object carrying the marker label in the managed namespace is
//! considered, regardless of which target created it. Objects without the
//! label are never listed and therefore never touched.
//!
//! A listed object missing the label is a labeling fault. It is skipped,
//! the rest of the pass still runs, and the first fault is returned.

use crate::constants::COMPONENT_ROUTE_HASH_LABEL;
use crate::controller::rbac::{
    correlation_hash, marker_selector, object_name, ROLE_BINDING_KIND, ROLE_KIND,
};
use crate::controller::store::{DerivedObjectStore, StoreError};
use crate::observability::metrics;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Store(#[from] StoreError),
    /// An object matched the marker selector but has no marker label
    #[error("{kind} '{name}' matched the {label} selector but carries no such label")]
    MissingLabel {
        kind: &'static str,
        name: String,
        label: &'static str,
    },
}

/// Names of the objects removed by one collection pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectReport {
    pub roles_deleted: Vec<String>,
    pub role_bindings_deleted: Vec<String>,
}

impl CollectReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.roles_deleted.len() + self.role_bindings_deleted.len()
    }
}

/// Decide whether a listed object is stale
fn is_stale(
    kind: &'static str,
    meta: &ObjectMeta,
    active: &HashSet<String>,
) -> Result<Option<String>, CollectError> {
    let name = object_name(meta, kind)?;
    let Some(hash) = correlation_hash(meta) else {
        error!(
            kind,
            name = %name,
            label = COMPONENT_ROUTE_HASH_LABEL,
            "derived object lost its marker label"
        );
        metrics::increment_label_integrity_faults();
        return Err(CollectError::MissingLabel {
            kind,
            name,
            label: COMPONENT_ROUTE_HASH_LABEL,
        });
    };
    if active.contains(hash) {
        Ok(None)
    } else {
        Ok(Some(name))
    }
}

fn deleted_or_gone(
    result: Result<(), StoreError>,
    kind: &'static str,
    name: &str,
) -> Result<bool, StoreError> {
    match result {
        Ok(()) => {
            metrics::record_derived_operation(kind, "delete");
            info!(kind, name, "deleted stale derived object");
            Ok(true)
        }
        Err(e) if e.is_not_found() => {
            debug!(kind, name, "stale derived object already gone");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Delete every labeled Role and RoleBinding whose hash is not in `active`
///
/// # Errors
///
/// Store failures other than NotFound on delete, and objects missing the
/// marker label.
pub async fn collect_garbage(
    store: &dyn DerivedObjectStore,
    active: &HashSet<String>,
) -> Result<CollectReport, CollectError> {
    let selector = marker_selector();
    let mut report = CollectReport::default();
    let mut fault = None;

    for role in store.list_roles(&selector).await? {
        match is_stale(ROLE_KIND, &role.metadata, active) {
            Ok(Some(name)) => {
                if deleted_or_gone(store.delete_role(&name).await, ROLE_KIND, &name)? {
                    report.roles_deleted.push(name);
                }
            }
            Ok(None) => {}
            Err(e @ CollectError::MissingLabel { .. }) => {
                fault.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }

    for binding in store.list_role_bindings(&selector).await? {
        match is_stale(ROLE_BINDING_KIND, &binding.metadata, active) {
            Ok(Some(name)) => {
                let result = store.delete_role_binding(&name).await;
                if deleted_or_gone(result, ROLE_BINDING_KIND, &name)? {
                    report.role_bindings_deleted.push(name);
                }
            }
            Ok(None) => {}
            Err(e @ CollectError::MissingLabel { .. }) => {
                fault.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }

    debug!(
        active = active.len(),
        deleted = report.total(),
        "garbage collection finished"
    );
    match fault {
        Some(e) => Err(e),
        None => Ok(report),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::store::{MemoryStore, Operation};
    use k8s_openapi::api::rbac::v1::Role;
    use std::collections::BTreeMap;

    fn role(name: Option<&str>, hash: &str) -> Role {
        Role {
            metadata: ObjectMeta {
                name: name.map(str::to_string),
                labels: Some(BTreeMap::from([(
                    COMPONENT_ROUTE_HASH_LABEL.to_string(),
                    hash.to_string(),
                )])),
                ..ObjectMeta::default()
            },
            rules: None,
        }
    }

    #[tokio::test]
    async fn test_collects_only_inactive_hashes() {
        let store = MemoryStore::default();
        store.insert_role(role(Some("keep"), "active"));
        store.insert_role(role(Some("drop"), "stale"));

        let active = HashSet::from(["active".to_string()]);
        let report = collect_garbage(&store, &active).await.expect("collect");

        assert_eq!(report.roles_deleted, vec!["drop"]);
        assert_eq!(store.roles().len(), 1);
    }

    #[tokio::test]
    async fn test_nameless_object_is_never_deleted() {
        let store = MemoryStore::default();
        store.insert_role(role(None, "stale"));

        let err = collect_garbage(&store, &HashSet::new())
            .await
            .expect_err("nameless object");

        assert!(matches!(err, CollectError::Store(StoreError::Invalid { .. })));
        assert_eq!(store.calls(Operation::DeleteRole), 0);
    }
}
