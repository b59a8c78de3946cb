//! # Derived Object Convergence
//!
//! Ensures exactly one Role and one RoleBinding exist for each reconciliation
//! target, with content matching the target.
//!
//! Each step is idempotent and safe to run concurrently with itself: objects
//! are found by correlation label, never by name, and duplicates produced by
//! racing writers are healed by keeping the first listed object and deleting
//! the rest.

use crate::controller::intersect::ReconciliationTarget;
use crate::controller::rbac::{
    consumer_subjects, desired_role, desired_role_binding, hash_selector, object_name, role_ref,
    secret_read_rules, subjects_match, DerivedScope, ROLE_BINDING_KIND, ROLE_KIND,
};
use crate::controller::store::{DerivedObjectStore, StoreError};
use crate::observability::metrics;
use kube::Resource;
use tracing::{debug, info, warn};

/// What convergence did to a derived object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectAction {
    Created,
    Updated,
    /// RoleBinding deleted and created again because its roleRef changed
    Recreated,
    Unchanged,
}

impl ObjectAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectAction::Created => "create",
            ObjectAction::Updated => "update",
            ObjectAction::Recreated => "recreate",
            ObjectAction::Unchanged => "unchanged",
        }
    }
}

/// Result of converging one derived object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converged {
    /// Name of the surviving object
    pub name: String,
    pub action: ObjectAction,
    /// Duplicates removed during this pass
    pub duplicates_deleted: usize,
}

/// Delete an object another writer may already have removed
///
/// Returns whether this call did the deletion.
async fn delete_tolerating_absence<F, Fut>(
    kind: &'static str,
    name: &str,
    delete: F,
) -> Result<bool, StoreError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(), StoreError>>,
{
    match delete().await {
        Ok(()) => {
            metrics::record_derived_operation(kind, "delete");
            Ok(true)
        }
        Err(e) if e.is_not_found() => {
            debug!(kind, name, "already deleted");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Drop every object but the first, returning the first
async fn keep_first<T, F, Fut>(
    kind: &'static str,
    mut existing: Vec<T>,
    delete: F,
) -> Result<(T, usize), StoreError>
where
    T: Resource,
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = Result<(), StoreError>>,
{
    let duplicates = existing.split_off(1);
    let canonical = existing.into_iter().next().ok_or_else(|| StoreError::Invalid {
        kind,
        reason: "nothing to keep".to_string(),
    })?;
    let mut deleted = 0;
    for duplicate in duplicates {
        let name = object_name(duplicate.meta(), kind)?;
        warn!(kind, name = %name, "deleting duplicate derived object");
        if delete_tolerating_absence(kind, &name, || delete(name.clone())).await? {
            deleted += 1;
        }
    }
    Ok((canonical, deleted))
}

/// Converge the Role of one target, returning the Role's name
///
/// # Errors
///
/// Any store error other than AlreadyExists on create or NotFound on a
/// duplicate delete.
pub async fn ensure_role(
    store: &dyn DerivedObjectStore,
    scope: &DerivedScope<'_>,
    target: &ReconciliationTarget,
) -> Result<Converged, StoreError> {
    let selector = hash_selector(&target.correlation_hash);
    let mut existing = store.list_roles(&selector).await?;

    if existing.is_empty() {
        let desired = desired_role(target, scope);
        match store.create_role(&desired).await {
            Ok(created) => {
                let name = object_name(&created.metadata, ROLE_KIND)?;
                metrics::record_derived_operation(ROLE_KIND, "create");
                info!(
                    route = %target.key,
                    role = %name,
                    secret = %target.serving_secret_name,
                    "created role"
                );
                return Ok(Converged {
                    name,
                    action: ObjectAction::Created,
                    duplicates_deleted: 0,
                });
            }
            Err(e) if e.is_already_exists() => {
                debug!(route = %target.key, "role created concurrently, re-reading");
                existing = store.list_roles(&selector).await?;
                if existing.is_empty() {
                    // The name is held by an object without our label
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }

    let (mut role, duplicates_deleted) = keep_first(
        ROLE_KIND,
        existing,
        |name| async move { store.delete_role(&name).await },
    )
    .await?;
    let name = object_name(&role.metadata, ROLE_KIND)?;

    let rules = secret_read_rules(&target.serving_secret_name);
    if role.rules.as_ref() == Some(&rules) {
        return Ok(Converged {
            name,
            action: ObjectAction::Unchanged,
            duplicates_deleted,
        });
    }

    role.rules = Some(rules);
    store.update_role(&role).await?;
    metrics::record_derived_operation(ROLE_KIND, "update");
    info!(
        route = %target.key,
        role = %name,
        secret = %target.serving_secret_name,
        "updated role"
    );
    Ok(Converged {
        name,
        action: ObjectAction::Updated,
        duplicates_deleted,
    })
}

/// Converge the RoleBinding of one target so it binds `role_name`
///
/// `role_name` must be the name `ensure_role` returned for the same target.
///
/// # Errors
///
/// Any store error other than AlreadyExists on create or NotFound on delete.
pub async fn ensure_role_binding(
    store: &dyn DerivedObjectStore,
    scope: &DerivedScope<'_>,
    target: &ReconciliationTarget,
    role_name: &str,
) -> Result<Converged, StoreError> {
    let selector = hash_selector(&target.correlation_hash);
    let mut existing = store.list_role_bindings(&selector).await?;

    if existing.is_empty() {
        match create_binding(store, scope, target, role_name).await {
            Ok(name) => {
                return Ok(Converged {
                    name,
                    action: ObjectAction::Created,
                    duplicates_deleted: 0,
                })
            }
            Err(e) if e.is_already_exists() => {
                debug!(route = %target.key, "rolebinding created concurrently, re-reading");
                existing = store.list_role_bindings(&selector).await?;
                if existing.is_empty() {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }

    let (mut binding, duplicates_deleted) = keep_first(
        ROLE_BINDING_KIND,
        existing,
        |name| async move { store.delete_role_binding(&name).await },
    )
    .await?;
    let name = object_name(&binding.metadata, ROLE_BINDING_KIND)?;

    // roleRef is immutable on the API server
    if binding.role_ref != role_ref(role_name) {
        info!(
            route = %target.key,
            rolebinding = %name,
            from = %binding.role_ref.name,
            to = role_name,
            "rolebinding references another role, recreating"
        );
        delete_tolerating_absence(ROLE_BINDING_KIND, &name, || store.delete_role_binding(&name))
            .await?;
        let recreated = match create_binding(store, scope, target, role_name).await {
            Ok(recreated) => recreated,
            Err(e) if e.is_already_exists() => {
                debug!(route = %target.key, "rolebinding recreated concurrently, re-reading");
                // Another reconciliation may have won; the next pass checks its content
                let Some(winner) = store.list_role_bindings(&selector).await?.into_iter().next()
                else {
                    // The name is held by an object without our label
                    return Err(e);
                };
                object_name(&winner.metadata, ROLE_BINDING_KIND)?
            }
            Err(e) => return Err(e),
        };
        return Ok(Converged {
            name: recreated,
            action: ObjectAction::Recreated,
            duplicates_deleted,
        });
    }

    let subjects = consumer_subjects(&target.consuming_users);
    if subjects_match(binding.subjects.as_ref(), &subjects) {
        return Ok(Converged {
            name,
            action: ObjectAction::Unchanged,
            duplicates_deleted,
        });
    }

    binding.subjects = Some(subjects);
    store.update_role_binding(&binding).await?;
    metrics::record_derived_operation(ROLE_BINDING_KIND, "update");
    info!(
        route = %target.key,
        rolebinding = %name,
        users = ?target.consuming_users,
        "updated rolebinding subjects"
    );
    Ok(Converged {
        name,
        action: ObjectAction::Updated,
        duplicates_deleted,
    })
}

async fn create_binding(
    store: &dyn DerivedObjectStore,
    scope: &DerivedScope<'_>,
    target: &ReconciliationTarget,
    role_name: &str,
) -> Result<String, StoreError> {
    let desired = desired_role_binding(target, scope, role_name);
    let created = store.create_role_binding(&desired).await?;
    let name = object_name(&created.metadata, ROLE_BINDING_KIND)?;
    metrics::record_derived_operation(ROLE_BINDING_KIND, "create");
    info!(
        route = %target.key,
        rolebinding = %name,
        users = ?target.consuming_users,
        "created rolebinding"
    );
    Ok(name)
}
