//! # Ingress Config Spec
//!
//! The cluster-scoped `Ingress` config resource and the component routes a
//! cluster administrator customizes through it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::status::IngressStatus;

/// Cluster-wide ingress configuration
///
/// Only `componentRoutes` is acted upon by this controller.
///
/// # Example
///
/// ```yaml
/// apiVersion: config.openshift.io/v1
/// kind: Ingress
/// metadata:
///   name: cluster
/// spec:
///   domain: apps.example.com
///   componentRoutes:
///     - namespace: openshift-console
///       name: console
///       hostname: console.example.com
///       servingCertKeyPairSecret:
///         name: console-cert
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Ingress",
    group = "config.openshift.io",
    version = "v1",
    status = "IngressStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// Default domain used for routes
    #[serde(default)]
    pub domain: String,
    /// Routes a cluster administrator wants to customize, logically keyed by
    /// `{namespace, name}`. Entries with no matching status entry have no effect.
    #[serde(default)]
    pub component_routes: Vec<ComponentRouteSpec>,
}

/// Desired customization of one component route
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRouteSpec {
    /// Namespace of the route to customize
    pub namespace: String,
    /// Logical name of the route to customize
    pub name: String,
    /// Hostname the administrator wants the route served on
    #[serde(default)]
    pub hostname: String,
    /// TLS secret in the secret namespace holding the serving cert/key pair
    #[serde(default)]
    pub serving_cert_key_pair_secret: SecretNameReference,
}

/// Reference to a secret by name, namespace implied by context
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct SecretNameReference {
    #[serde(default)]
    pub name: String,
}
