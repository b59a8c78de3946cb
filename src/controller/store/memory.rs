//! # In-Memory Store
//!
//! A process-local `ParentSource` + `DerivedObjectStore` with the same
//! observable behavior as the API server for the calls the reconciler makes:
//! label selection, `generateName`, AlreadyExists / NotFound, and stable list
//! order (creation order). Written objects pass through their JSON wire form
//! with empty optional fields dropped, so what is read back matches what the
//! API server returns. Every call is counted and failures can be injected,
//! which is what the reconciliation tests rely on.

use super::{DerivedObjectStore, ParentSource, StoreError};
use crate::controller::rbac::{ROLE_BINDING_KIND, ROLE_KIND};
use crate::crd::Ingress;
use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Store call, used for call counting and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetParent,
    ListRoles,
    CreateRole,
    UpdateRole,
    DeleteRole,
    ListRoleBindings,
    CreateRoleBinding,
    UpdateRoleBinding,
    DeleteRoleBinding,
}

impl Operation {
    #[must_use]
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            Operation::GetParent | Operation::ListRoles | Operation::ListRoleBindings
        )
    }
}

/// Injected failure for the next matching call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Fail with `StoreError::Unavailable`
    Unavailable(String),
    /// A concurrent writer created the object first: it is stored, and the
    /// call fails with AlreadyExists
    RacedCreate,
    /// A concurrent writer deleted the object first: it is removed, and the
    /// call fails with NotFound
    RacedDelete,
}

#[derive(Debug, Default)]
struct State {
    ingresses: BTreeMap<String, Ingress>,
    roles: Vec<Role>,
    role_bindings: Vec<RoleBinding>,
    generated: u64,
    resource_version: u64,
    calls: HashMap<Operation, usize>,
    failures: HashMap<Operation, VecDeque<Failure>>,
}

impl State {
    fn record(&mut self, op: Operation) -> Option<Failure> {
        *self.calls.entry(op).or_insert(0) += 1;
        self.failures.get_mut(&op).and_then(VecDeque::pop_front)
    }

    fn next_resource_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    /// Assign a final name the way the API server does for `generateName`
    fn assign_name(&mut self, meta: &ObjectMeta, kind: &'static str) -> Result<String, StoreError> {
        if let Some(name) = meta.name.as_ref().filter(|n| !n.is_empty()) {
            return Ok(name.clone());
        }
        if let Some(prefix) = meta.generate_name.as_ref().filter(|p| !p.is_empty()) {
            self.generated += 1;
            return Ok(format!("{prefix}{:05x}", self.generated));
        }
        Err(StoreError::Invalid {
            kind,
            reason: "name or generateName is required".to_string(),
        })
    }
}

/// In-process object store
#[derive(Debug)]
pub struct MemoryStore {
    namespace: String,
    state: Mutex<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_SECRET_NAMESPACE)
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not wedge every later assertion
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Store or replace an Ingress config
    pub fn put_parent(&self, ingress: Ingress) {
        let name = ingress.metadata.name.clone().unwrap_or_default();
        self.state().ingresses.insert(name, ingress);
    }

    pub fn remove_parent(&self, name: &str) {
        self.state().ingresses.remove(name);
    }

    /// Insert a Role as-is, bypassing call counting
    pub fn insert_role(&self, mut role: Role) {
        let mut state = self.state();
        role.metadata.namespace = Some(self.namespace.clone());
        role.metadata.resource_version = Some(state.next_resource_version());
        state.roles.push(role);
    }

    /// Insert a RoleBinding as-is, bypassing call counting
    pub fn insert_role_binding(&self, mut binding: RoleBinding) {
        let mut state = self.state();
        binding.metadata.namespace = Some(self.namespace.clone());
        binding.metadata.resource_version = Some(state.next_resource_version());
        state.role_bindings.push(binding);
    }

    #[must_use]
    pub fn roles(&self) -> Vec<Role> {
        self.state().roles.clone()
    }

    #[must_use]
    pub fn role_bindings(&self) -> Vec<RoleBinding> {
        self.state().role_bindings.clone()
    }

    /// Roles labeled for one correlation hash
    #[must_use]
    pub fn roles_for(&self, hash: &str) -> Vec<Role> {
        let selector = crate::controller::rbac::hash_selector(hash);
        self.roles()
            .into_iter()
            .filter(|r| selector_matches(&selector, &r.metadata))
            .collect()
    }

    /// RoleBindings labeled for one correlation hash
    #[must_use]
    pub fn role_bindings_for(&self, hash: &str) -> Vec<RoleBinding> {
        let selector = crate::controller::rbac::hash_selector(hash);
        self.role_bindings()
            .into_iter()
            .filter(|b| selector_matches(&selector, &b.metadata))
            .collect()
    }

    /// Number of times an operation was called
    #[must_use]
    pub fn calls(&self, op: Operation) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of create/update/delete calls of any kind
    #[must_use]
    pub fn write_calls(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|(op, _)| op.is_write())
            .map(|(_, n)| *n)
            .sum()
    }

    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }

    /// Make the next call of `op` fail; queued failures apply in order
    pub fn fail_next(&self, op: Operation, failure: Failure) {
        self.state().failures.entry(op).or_default().push_back(failure);
    }
}

/// Minimal label selector evaluation: comma separated `key` / `key=value` terms
fn selector_matches(selector: &str, meta: &ObjectMeta) -> bool {
    let empty = BTreeMap::new();
    let labels = meta.labels.as_ref().unwrap_or(&empty);
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => labels.contains_key(term),
        })
}

fn unavailable(message: String) -> StoreError {
    StoreError::Unavailable(message)
}

fn not_found(kind: &'static str, name: &str) -> StoreError {
    StoreError::NotFound {
        kind,
        name: name.to_string(),
    }
}

fn already_exists(kind: &'static str, name: &str) -> StoreError {
    StoreError::AlreadyExists {
        kind,
        name: name.to_string(),
    }
}

/// Object kinds the store holds, so create/update/delete are written once
trait Stored: Clone + Serialize + DeserializeOwned {
    const KIND: &'static str;
    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;
    fn items(state: &mut State) -> &mut Vec<Self>;
}

impl Stored for Role {
    const KIND: &'static str = ROLE_KIND;
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
    fn items(state: &mut State) -> &mut Vec<Self> {
        &mut state.roles
    }
}

impl Stored for RoleBinding {
    const KIND: &'static str = ROLE_BINDING_KIND;
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
    fn items(state: &mut State) -> &mut Vec<Self> {
        &mut state.role_bindings
    }
}

/// Drop empty strings and empty lists from JSON objects, as `omitempty` does
///
/// Label and annotation values are map entries and keep their empty strings.
fn drop_empty(value: &mut Value) {
    match value {
        Value::Object(fields) => {
            fields.retain(|_, v| match v {
                Value::String(s) => !s.is_empty(),
                Value::Array(items) => !items.is_empty(),
                Value::Null => false,
                _ => true,
            });
            for (key, field) in fields.iter_mut() {
                if key != "labels" && key != "annotations" {
                    drop_empty(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(drop_empty),
        _ => {}
    }
}

/// Round-trip an object through its wire form the way the API server stores it
fn persisted<T: Stored>(object: &T) -> Result<T, StoreError> {
    let invalid = |e: serde_json::Error| StoreError::Invalid {
        kind: T::KIND,
        reason: e.to_string(),
    };
    let mut value = serde_json::to_value(object).map_err(invalid)?;
    drop_empty(&mut value);
    serde_json::from_value(value).map_err(invalid)
}

fn position<T: Stored>(state: &mut State, name: &str) -> Option<usize> {
    T::items(state)
        .iter()
        .position(|o| o.meta().name.as_deref() == Some(name))
}

impl MemoryStore {
    fn list<T: Stored>(&self, op: Operation, selector: &str) -> Result<Vec<T>, StoreError> {
        let mut state = self.state();
        if let Some(Failure::Unavailable(message)) = state.record(op) {
            return Err(unavailable(message));
        }
        Ok(T::items(&mut state)
            .iter()
            .filter(|o| selector_matches(selector, o.meta()))
            .cloned()
            .collect())
    }

    fn create<T: Stored>(&self, op: Operation, object: &T) -> Result<T, StoreError> {
        let mut state = self.state();
        let failure = state.record(op);
        let name = state.assign_name(object.meta(), T::KIND)?;

        let mut created = persisted(object)?;
        created.meta_mut().name = Some(name.clone());
        created.meta_mut().generate_name = None;
        created.meta_mut().namespace = Some(self.namespace.clone());
        created.meta_mut().resource_version = Some(state.next_resource_version());

        match failure {
            Some(Failure::Unavailable(message)) => return Err(unavailable(message)),
            Some(Failure::RacedCreate) => {
                if position::<T>(&mut state, &name).is_none() {
                    T::items(&mut state).push(created);
                }
                return Err(already_exists(T::KIND, &name));
            }
            Some(Failure::RacedDelete) | None => {}
        }

        if position::<T>(&mut state, &name).is_some() {
            return Err(already_exists(T::KIND, &name));
        }
        T::items(&mut state).push(created.clone());
        Ok(created)
    }

    fn update<T: Stored>(&self, op: Operation, object: &T) -> Result<T, StoreError> {
        let mut state = self.state();
        let failure = state.record(op);
        let name = object.meta().name.clone().ok_or_else(|| StoreError::Invalid {
            kind: T::KIND,
            reason: "object has no name".to_string(),
        })?;

        match failure {
            Some(Failure::Unavailable(message)) => return Err(unavailable(message)),
            Some(Failure::RacedDelete) => {
                if let Some(index) = position::<T>(&mut state, &name) {
                    T::items(&mut state).remove(index);
                }
                return Err(not_found(T::KIND, &name));
            }
            Some(Failure::RacedCreate) | None => {}
        }

        let index = position::<T>(&mut state, &name).ok_or_else(|| not_found(T::KIND, &name))?;
        let mut updated = persisted(object)?;
        updated.meta_mut().resource_version = Some(state.next_resource_version());
        T::items(&mut state)[index] = updated.clone();
        Ok(updated)
    }

    fn delete<T: Stored>(&self, op: Operation, name: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        match state.record(op) {
            Some(Failure::Unavailable(message)) => return Err(unavailable(message)),
            Some(Failure::RacedDelete) => {
                if let Some(index) = position::<T>(&mut state, name) {
                    T::items(&mut state).remove(index);
                }
                return Err(not_found(T::KIND, name));
            }
            Some(Failure::RacedCreate) | None => {}
        }
        let index = position::<T>(&mut state, name).ok_or_else(|| not_found(T::KIND, name))?;
        T::items(&mut state).remove(index);
        Ok(())
    }
}

#[async_trait]
impl ParentSource for MemoryStore {
    async fn get_parent(&self, name: &str) -> Result<Ingress, StoreError> {
        let mut state = self.state();
        if let Some(Failure::Unavailable(message)) = state.record(Operation::GetParent) {
            return Err(unavailable(message));
        }
        state
            .ingresses
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("Ingress", name))
    }
}

#[async_trait]
impl DerivedObjectStore for MemoryStore {
    async fn list_roles(&self, selector: &str) -> Result<Vec<Role>, StoreError> {
        self.list(Operation::ListRoles, selector)
    }

    async fn create_role(&self, role: &Role) -> Result<Role, StoreError> {
        self.create(Operation::CreateRole, role)
    }

    async fn update_role(&self, role: &Role) -> Result<Role, StoreError> {
        self.update(Operation::UpdateRole, role)
    }

    async fn delete_role(&self, name: &str) -> Result<(), StoreError> {
        self.delete::<Role>(Operation::DeleteRole, name)
    }

    async fn list_role_bindings(&self, selector: &str) -> Result<Vec<RoleBinding>, StoreError> {
        self.list(Operation::ListRoleBindings, selector)
    }

    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, StoreError> {
        self.create(Operation::CreateRoleBinding, binding)
    }

    async fn update_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, StoreError> {
        self.update(Operation::UpdateRoleBinding, binding)
    }

    async fn delete_role_binding(&self, name: &str) -> Result<(), StoreError> {
        self.delete::<RoleBinding>(Operation::DeleteRoleBinding, name)
    }
}
