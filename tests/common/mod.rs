//! Shared fixtures for reconciliation tests
//!
//! Builds Ingress configs and a `Reconciler` wired to a `MemoryStore`.

#![allow(dead_code, reason = "Each test binary uses a different subset of fixtures")]

use ingress_routes_controller::config::{ControllerConfig, NamingMode};
use ingress_routes_controller::controller::reconciler::Reconciler;
use ingress_routes_controller::controller::store::MemoryStore;
use ingress_routes_controller::crd::{
    ComponentRouteSpec, ComponentRouteStatus, Ingress, IngressSpec, IngressStatus,
    SecretNameReference,
};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::sync::Arc;

pub const SECRET_NAMESPACE: &str = "openshift-config";
pub const PARENT: &str = "cluster";

pub fn route(namespace: &str, name: &str, secret: &str) -> ComponentRouteSpec {
    ComponentRouteSpec {
        namespace: namespace.to_string(),
        name: name.to_string(),
        hostname: format!("{name}.apps.example.com"),
        serving_cert_key_pair_secret: SecretNameReference {
            name: secret.to_string(),
        },
    }
}

pub fn route_status(namespace: &str, name: &str, users: &[&str]) -> ComponentRouteStatus {
    ComponentRouteStatus {
        namespace: namespace.to_string(),
        name: name.to_string(),
        default_hostname: format!("{name}.apps.example.com"),
        consuming_users: users.iter().map(|u| (*u).to_string()).collect(),
        ..ComponentRouteStatus::default()
    }
}

pub fn ingress(spec: Vec<ComponentRouteSpec>, status: Vec<ComponentRouteStatus>) -> Ingress {
    let mut ingress = Ingress::new(
        PARENT,
        IngressSpec {
            domain: "apps.example.com".to_string(),
            component_routes: spec,
        },
    );
    ingress.status = Some(IngressStatus {
        component_routes: status,
    });
    ingress
}

/// Two routes, `foo` consumed by `[a, b]` and `bar` consumed by `[b]`
pub fn foo_bar_ingress() -> Ingress {
    ingress(
        vec![route("default", "foo", "foo"), route("default", "bar", "bar")],
        vec![
            route_status("default", "foo", &["a", "b"]),
            route_status("default", "bar", &["b"]),
        ],
    )
}

pub fn setup(naming_mode: NamingMode) -> (Arc<MemoryStore>, Reconciler) {
    let store = Arc::new(MemoryStore::new(SECRET_NAMESPACE));
    let config = ControllerConfig {
        naming_mode,
        ..ControllerConfig::default()
    };
    let reconciler = Reconciler::new(store.clone(), store.clone(), config);
    (store, reconciler)
}

/// Secret names a Role grants access to
pub fn granted_secrets(role: &Role) -> Vec<String> {
    role.rules
        .iter()
        .flatten()
        .flat_map(|rule| rule.resource_names.clone().unwrap_or_default())
        .collect()
}

pub fn subject_names(binding: &RoleBinding) -> Vec<String> {
    binding
        .subjects
        .iter()
        .flatten()
        .map(|s| s.name.clone())
        .collect()
}

pub fn name_of(meta: &ObjectMeta) -> String {
    meta.name.clone().unwrap_or_default()
}
