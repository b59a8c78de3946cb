//! # Kubernetes Store
//!
//! `ParentSource` and `DerivedObjectStore` backed by the Kubernetes API.

use super::{DerivedObjectStore, ParentSource, StoreError};
use crate::controller::rbac::{ROLE_BINDING_KIND, ROLE_KIND};
use crate::crd::Ingress;
use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use tracing::debug;

const INGRESS_KIND: &str = "Ingress";

/// Kubernetes-backed store
///
/// Ingress configs are cluster scoped; derived objects live in the secret namespace.
#[derive(Clone)]
pub struct KubeStore {
    ingresses: Api<Ingress>,
    roles: Api<Role>,
    role_bindings: Api<RoleBinding>,
    namespace: String,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            ingresses: Api::all(client.clone()),
            roles: Api::namespaced(client.clone(), namespace),
            role_bindings: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }
}

/// Map 404 and 409 responses onto the store's error taxonomy
fn classify(err: kube::Error, kind: &'static str, name: &str) -> StoreError {
    match err {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound {
            kind,
            name: name.to_string(),
        },
        kube::Error::Api(api_err) if api_err.code == 409 && api_err.reason == "AlreadyExists" => {
            StoreError::AlreadyExists {
                kind,
                name: name.to_string(),
            }
        }
        other => StoreError::Kube(other),
    }
}

fn name_for_create<'a>(name: Option<&'a String>, generate_name: Option<&'a String>) -> &'a str {
    name.or(generate_name).map_or("", String::as_str)
}

fn name_for_update<'a>(name: Option<&'a String>, kind: &'static str) -> Result<&'a str, StoreError> {
    name.map(String::as_str).ok_or_else(|| StoreError::Invalid {
        kind,
        reason: "object has no name".to_string(),
    })
}

#[async_trait]
impl ParentSource for KubeStore {
    async fn get_parent(&self, name: &str) -> Result<Ingress, StoreError> {
        self.ingresses
            .get(name)
            .await
            .map_err(|e| classify(e, INGRESS_KIND, name))
    }
}

#[async_trait]
impl DerivedObjectStore for KubeStore {
    async fn list_roles(&self, selector: &str) -> Result<Vec<Role>, StoreError> {
        debug!(namespace = %self.namespace, selector, "listing roles");
        let list = self
            .roles
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(StoreError::Kube)?;
        Ok(list.items)
    }

    async fn create_role(&self, role: &Role) -> Result<Role, StoreError> {
        let name = name_for_create(
            role.metadata.name.as_ref(),
            role.metadata.generate_name.as_ref(),
        );
        self.roles
            .create(&PostParams::default(), role)
            .await
            .map_err(|e| classify(e, ROLE_KIND, name))
    }

    async fn update_role(&self, role: &Role) -> Result<Role, StoreError> {
        let name = name_for_update(role.metadata.name.as_ref(), ROLE_KIND)?;
        self.roles
            .replace(name, &PostParams::default(), role)
            .await
            .map_err(|e| classify(e, ROLE_KIND, name))
    }

    async fn delete_role(&self, name: &str) -> Result<(), StoreError> {
        self.roles
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| classify(e, ROLE_KIND, name))
    }

    async fn list_role_bindings(&self, selector: &str) -> Result<Vec<RoleBinding>, StoreError> {
        debug!(namespace = %self.namespace, selector, "listing rolebindings");
        let list = self
            .role_bindings
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(StoreError::Kube)?;
        Ok(list.items)
    }

    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, StoreError> {
        let name = name_for_create(
            binding.metadata.name.as_ref(),
            binding.metadata.generate_name.as_ref(),
        );
        self.role_bindings
            .create(&PostParams::default(), binding)
            .await
            .map_err(|e| classify(e, ROLE_BINDING_KIND, name))
    }

    async fn update_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, StoreError> {
        let name = name_for_update(binding.metadata.name.as_ref(), ROLE_BINDING_KIND)?;
        self.role_bindings
            .replace(name, &PostParams::default(), binding)
            .await
            .map_err(|e| classify(e, ROLE_BINDING_KIND, name))
    }

    async fn delete_role_binding(&self, name: &str) -> Result<(), StoreError> {
        self.role_bindings
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| classify(e, ROLE_BINDING_KIND, name))
    }
}
