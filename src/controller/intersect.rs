//! # State Intersection
//!
//! Joins the administrator's desired component routes with the status
//! entries reported by consuming operators. Only routes present in both
//! become reconciliation targets.

use crate::controller::hash::LogicalKey;
use crate::crd::{ComponentRouteSpec, ComponentRouteStatus, Ingress};
use std::collections::{HashMap, HashSet};

/// A component route for which a Role and RoleBinding should exist
///
/// Built fresh on every reconciliation and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationTarget {
    pub key: LogicalKey,
    pub correlation_hash: String,
    pub serving_secret_name: String,
    pub consuming_users: Vec<String>,
}

/// Compute the active targets of an Ingress config
#[must_use]
pub fn targets_for(ingress: &Ingress) -> Vec<ReconciliationTarget> {
    let observed = ingress
        .status
        .as_ref()
        .map(|s| s.component_routes.as_slice())
        .unwrap_or_default();
    active_targets(&ingress.spec.component_routes, observed)
}

/// Intersect desired and observed component routes on `(namespace, name)`
///
/// Output follows the order of `desired`. Duplicate status entries resolve
/// to the last one listed; spec-only and status-only entries are dropped.
#[must_use]
pub fn active_targets(
    desired: &[ComponentRouteSpec],
    observed: &[ComponentRouteStatus],
) -> Vec<ReconciliationTarget> {
    let consumers_by_hash: HashMap<String, &[String]> = observed
        .iter()
        .map(|status| {
            let key = LogicalKey::new(&status.namespace, &status.name);
            (key.hash(), status.consuming_users.as_slice())
        })
        .collect();

    desired
        .iter()
        .filter_map(|route| {
            let key = LogicalKey::new(&route.namespace, &route.name);
            let correlation_hash = key.hash();
            let users = consumers_by_hash.get(&correlation_hash)?;
            Some(ReconciliationTarget {
                serving_secret_name: route.serving_cert_key_pair_secret.name.clone(),
                consuming_users: users.to_vec(),
                key,
                correlation_hash,
            })
        })
        .collect()
}

/// Hashes of all active targets, for garbage collection
#[must_use]
pub fn active_hashes(targets: &[ReconciliationTarget]) -> HashSet<String> {
    targets.iter().map(|t| t.correlation_hash.clone()).collect()
}
