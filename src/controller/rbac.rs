//! # Derived RBAC Objects
//!
//! Builders for the Role and RoleBinding generated per reconciliation target,
//! plus helpers for reading back the correlation label.

use crate::config::NamingMode;
use crate::constants::{
    COMPONENT_ROUTE_HASH_LABEL, OWNING_INGRESS_ANNOTATION, RBAC_API_GROUP, SECRET_READ_VERBS,
    SERVICE_ACCOUNT_KIND,
};
use crate::controller::intersect::ReconciliationTarget;
use crate::controller::store::StoreError;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

pub const ROLE_KIND: &str = "Role";
pub const ROLE_BINDING_KIND: &str = "RoleBinding";

/// Where and on whose behalf derived objects are written
#[derive(Debug, Clone, Copy)]
pub struct DerivedScope<'a> {
    /// Namespace holding the serving secrets and the derived objects
    pub namespace: &'a str,
    /// Name of the Ingress config being reconciled
    pub parent: &'a str,
    pub naming_mode: NamingMode,
}

/// Label selector matching every derived object
#[must_use]
pub fn marker_selector() -> String {
    COMPONENT_ROUTE_HASH_LABEL.to_string()
}

/// Label selector matching the derived objects of one target
#[must_use]
pub fn hash_selector(hash: &str) -> String {
    format!("{COMPONENT_ROUTE_HASH_LABEL}={hash}")
}

/// Correlation hash stored on a derived object, if labeled
#[must_use]
pub fn correlation_hash(meta: &ObjectMeta) -> Option<&str> {
    meta.labels
        .as_ref()
        .and_then(|labels| labels.get(COMPONENT_ROUTE_HASH_LABEL))
        .map(String::as_str)
}

/// Name of a persisted object; the API server always returns one
///
/// # Errors
///
/// `StoreError::Invalid` when the name is absent or empty.
pub fn object_name(meta: &ObjectMeta, kind: &'static str) -> Result<String, StoreError> {
    meta.name
        .clone()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| StoreError::Invalid {
            kind,
            reason: "persisted object has no name".to_string(),
        })
}

fn derived_metadata(target: &ReconciliationTarget, scope: &DerivedScope<'_>) -> ObjectMeta {
    ObjectMeta {
        namespace: Some(scope.namespace.to_string()),
        labels: Some(BTreeMap::from([(
            COMPONENT_ROUTE_HASH_LABEL.to_string(),
            target.correlation_hash.clone(),
        )])),
        annotations: Some(BTreeMap::from([(
            OWNING_INGRESS_ANNOTATION.to_string(),
            scope.parent.to_string(),
        )])),
        ..ObjectMeta::default()
    }
}

/// Read-only access to exactly one named secret
#[must_use]
pub fn secret_read_rules(secret_name: &str) -> Vec<PolicyRule> {
    vec![PolicyRule {
        api_groups: Some(vec![String::new()]),
        resources: Some(vec!["secrets".to_string()]),
        resource_names: Some(vec![secret_name.to_string()]),
        verbs: SECRET_READ_VERBS.iter().map(|v| (*v).to_string()).collect(),
        ..PolicyRule::default()
    }]
}

/// Role to create for a target that has none yet
#[must_use]
pub fn desired_role(target: &ReconciliationTarget, scope: &DerivedScope<'_>) -> Role {
    let mut metadata = derived_metadata(target, scope);
    match scope.naming_mode {
        NamingMode::Logical => metadata.name = Some(target.key.name.clone()),
        NamingMode::Generated => metadata.generate_name = Some(format!("{}-", target.key.name)),
    }
    Role {
        metadata,
        rules: Some(secret_read_rules(&target.serving_secret_name)),
    }
}

/// One service account subject per consuming user, in status order
#[must_use]
pub fn consumer_subjects(users: &[String]) -> Vec<Subject> {
    users
        .iter()
        .map(|user| Subject {
            kind: SERVICE_ACCOUNT_KIND.to_string(),
            name: user.clone(),
            api_group: None,
            namespace: None,
        })
        .collect()
}

#[must_use]
pub fn role_ref(role_name: &str) -> RoleRef {
    RoleRef {
        api_group: RBAC_API_GROUP.to_string(),
        kind: ROLE_KIND.to_string(),
        name: role_name.to_string(),
    }
}

/// RoleBinding to create for a target, named after the Role it binds
#[must_use]
pub fn desired_role_binding(
    target: &ReconciliationTarget,
    scope: &DerivedScope<'_>,
    role_name: &str,
) -> RoleBinding {
    let mut metadata = derived_metadata(target, scope);
    metadata.name = Some(role_name.to_string());
    RoleBinding {
        metadata,
        role_ref: role_ref(role_name),
        subjects: Some(consumer_subjects(&target.consuming_users)),
    }
}

/// `apiGroup` and `namespace` are omitted on the wire when empty
fn same_subject(a: &Subject, b: &Subject) -> bool {
    a.kind == b.kind
        && a.name == b.name
        && a.api_group.as_deref().unwrap_or_default() == b.api_group.as_deref().unwrap_or_default()
        && a.namespace.as_deref().unwrap_or_default() == b.namespace.as_deref().unwrap_or_default()
}

/// Compare subjects treating a missing list as empty
#[must_use]
pub fn subjects_match(existing: Option<&Vec<Subject>>, desired: &[Subject]) -> bool {
    let existing = existing.map_or(&[][..], Vec::as_slice);
    existing.len() == desired.len()
        && existing.iter().zip(desired).all(|(a, b)| same_subject(a, b))
}
