//! # Self-Healing Tests
//!
//! Races and drift the reconciler must repair without locking:
//! - Duplicate derived objects for one correlation hash
//! - Objects created or deleted by a concurrent writer mid-pass
//! - RoleBindings pointing at the wrong Role
//! - Objects outside the controller's ownership
//! - Derived objects that lost their correlation label

mod common;

use async_trait::async_trait;
use common::{
    foo_bar_ingress, granted_secrets, ingress, name_of, route, route_status, setup, subject_names,
    PARENT, SECRET_NAMESPACE,
};
use ingress_routes_controller::config::{ControllerConfig, NamingMode};
use ingress_routes_controller::constants::COMPONENT_ROUTE_HASH_LABEL;
use ingress_routes_controller::controller::hash::hash_key;
use ingress_routes_controller::controller::rbac::{marker_selector, role_ref, secret_read_rules};
use ingress_routes_controller::controller::reconciler::{
    reconcile_key, reconcile_parent, Reconciler, ReconcilerError, TriggerSource,
};
use ingress_routes_controller::controller::store::{
    DerivedObjectStore, Failure, MemoryStore, Operation, StoreError,
};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;

fn labeled_meta(name: &str, hash: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        labels: Some(BTreeMap::from([(
            COMPONENT_ROUTE_HASH_LABEL.to_string(),
            hash.to_string(),
        )])),
        ..ObjectMeta::default()
    }
}

fn labeled_role(name: &str, hash: &str) -> Role {
    Role {
        metadata: labeled_meta(name, hash),
        rules: None,
    }
}

fn labeled_binding(name: &str, hash: &str, role: &str) -> RoleBinding {
    RoleBinding {
        metadata: labeled_meta(name, hash),
        role_ref: role_ref(role),
        subjects: None,
    }
}

#[tokio::test]
async fn test_duplicate_roles_keep_first_listed() {
    let (store, ctx) = setup(NamingMode::Generated);
    let foo = hash_key("default", "foo");
    store.insert_role(labeled_role("foo-first", &foo));
    store.insert_role(labeled_role("foo-second", &foo));
    store.put_parent(foo_bar_ingress());

    let summary = reconcile_key(&ctx, PARENT).await.expect("reconcile");

    let roles = store.roles_for(&foo);
    assert_eq!(roles.len(), 1);
    assert_eq!(name_of(&roles[0].metadata), "foo-first");
    assert_eq!(granted_secrets(&roles[0]), vec!["foo"]);
    assert_eq!(summary.duplicates_deleted, 1);

    let bindings = store.role_bindings_for(&foo);
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].role_ref.name, "foo-first");
}

#[tokio::test]
async fn test_duplicate_bindings_keep_first_listed() {
    let (store, ctx) = setup(NamingMode::Logical);
    let foo = hash_key("default", "foo");
    store.insert_role(labeled_role("foo", &foo));
    store.insert_role_binding(labeled_binding("foo", &foo, "foo"));
    store.insert_role_binding(labeled_binding("foo-extra", &foo, "foo"));
    store.put_parent(foo_bar_ingress());

    reconcile_key(&ctx, PARENT).await.expect("reconcile");

    let bindings = store.role_bindings_for(&foo);
    assert_eq!(bindings.len(), 1);
    assert_eq!(name_of(&bindings[0].metadata), "foo");
    assert_eq!(subject_names(&bindings[0]), vec!["a", "b"]);
}

#[tokio::test]
async fn test_duplicate_already_deleted_is_not_an_error() {
    let (store, ctx) = setup(NamingMode::Generated);
    let foo = hash_key("default", "foo");
    store.insert_role(labeled_role("foo-first", &foo));
    store.insert_role(labeled_role("foo-second", &foo));
    store.put_parent(foo_bar_ingress());
    store.fail_next(Operation::DeleteRole, Failure::RacedDelete);

    reconcile_key(&ctx, PARENT).await.expect("reconcile");

    let roles = store.roles_for(&foo);
    assert_eq!(roles.len(), 1);
    assert_eq!(name_of(&roles[0].metadata), "foo-first");
}

#[tokio::test]
async fn test_raced_role_create_falls_back_to_existing() {
    let (store, ctx) = setup(NamingMode::Logical);
    store.put_parent(foo_bar_ingress());
    store.fail_next(Operation::CreateRole, Failure::RacedCreate);

    reconcile_key(&ctx, PARENT).await.expect("reconcile");

    let foo = hash_key("default", "foo");
    let roles = store.roles_for(&foo);
    assert_eq!(roles.len(), 1);
    assert_eq!(granted_secrets(&roles[0]), vec!["foo"]);
    assert_eq!(store.role_bindings_for(&foo)[0].role_ref.name, "foo");
}

#[tokio::test]
async fn test_raced_binding_create_falls_back_to_existing() {
    let (store, ctx) = setup(NamingMode::Generated);
    store.put_parent(foo_bar_ingress());
    store.fail_next(Operation::CreateRoleBinding, Failure::RacedCreate);

    reconcile_key(&ctx, PARENT).await.expect("reconcile");

    let foo = hash_key("default", "foo");
    let role_name = name_of(&store.roles_for(&foo)[0].metadata);
    let bindings = store.role_bindings_for(&foo);
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].role_ref.name, role_name);
}

#[tokio::test]
async fn test_stale_object_already_deleted_is_not_an_error() {
    let (store, ctx) = setup(NamingMode::Generated);
    store.put_parent(foo_bar_ingress());
    reconcile_key(&ctx, PARENT).await.expect("first pass");

    store.put_parent(ingress(
        vec![route("default", "foo", "foo")],
        vec![route_status("default", "foo", &["a", "b"])],
    ));
    store.fail_next(Operation::DeleteRole, Failure::RacedDelete);
    store.fail_next(Operation::DeleteRoleBinding, Failure::RacedDelete);

    let outcome = reconcile_parent(&ctx, PARENT, TriggerSource::Watch).await;

    assert!(outcome.is_success());
    assert!(store.roles_for(&hash_key("default", "bar")).is_empty());
    assert!(store.role_bindings_for(&hash_key("default", "bar")).is_empty());
}

#[tokio::test]
async fn test_binding_with_wrong_role_ref_is_recreated() {
    let (store, ctx) = setup(NamingMode::Generated);
    let foo = hash_key("default", "foo");
    let mut role = labeled_role("foo-abcde", &foo);
    role.rules = Some(secret_read_rules("foo"));
    store.insert_role(role);
    store.insert_role_binding(labeled_binding("foo-stale", &foo, "stale-role"));
    store.put_parent(foo_bar_ingress());

    let summary = reconcile_key(&ctx, PARENT).await.expect("reconcile");

    let bindings = store.role_bindings_for(&foo);
    assert_eq!(bindings.len(), 1);
    assert_eq!(name_of(&bindings[0].metadata), "foo-abcde");
    assert_eq!(bindings[0].role_ref.name, "foo-abcde");
    assert_eq!(subject_names(&bindings[0]), vec!["a", "b"]);
    assert_eq!(summary.recreated, 1);
}

#[tokio::test]
async fn test_recreate_blocked_by_unmanaged_binding_fails() {
    let (store, ctx) = setup(NamingMode::Generated);
    let foo = hash_key("default", "foo");
    let mut role = labeled_role("foo-abcde", &foo);
    role.rules = Some(secret_read_rules("foo"));
    store.insert_role(role);
    store.insert_role_binding(labeled_binding("foo-stale", &foo, "stale-role"));
    store.insert_role_binding(RoleBinding {
        metadata: ObjectMeta {
            name: Some("foo-abcde".to_string()),
            ..ObjectMeta::default()
        },
        role_ref: role_ref("someone-else"),
        subjects: None,
    });
    store.put_parent(foo_bar_ingress());

    let outcome = reconcile_parent(&ctx, PARENT, TriggerSource::Watch).await;

    assert!(outcome.requeue);
    assert!(matches!(
        outcome.error,
        Some(ReconcilerError::Converge {
            source: StoreError::AlreadyExists { .. },
            ..
        })
    ));
    assert!(store.role_bindings_for(&foo).is_empty());
    // The unmanaged binding is left as it was
    let unmanaged: Vec<_> = store
        .role_bindings()
        .into_iter()
        .filter(|b| name_of(&b.metadata) == "foo-abcde")
        .collect();
    assert_eq!(unmanaged.len(), 1);
    assert_eq!(unmanaged[0].role_ref.name, "someone-else");
}

#[tokio::test]
async fn test_duplicate_count_excludes_concurrently_deleted() {
    let (store, ctx) = setup(NamingMode::Generated);
    let foo = hash_key("default", "foo");
    store.insert_role(labeled_role("foo-first", &foo));
    store.insert_role(labeled_role("foo-second", &foo));
    store.insert_role(labeled_role("foo-third", &foo));
    store.put_parent(foo_bar_ingress());
    store.fail_next(Operation::DeleteRole, Failure::RacedDelete);

    let summary = reconcile_key(&ctx, PARENT).await.expect("reconcile");

    assert_eq!(summary.duplicates_deleted, 1);
    assert_eq!(store.roles_for(&foo).len(), 1);
}

#[tokio::test]
async fn test_unlabeled_objects_are_never_touched() {
    let (store, ctx) = setup(NamingMode::Logical);
    store.insert_role(Role {
        metadata: ObjectMeta {
            name: Some("hand-written".to_string()),
            ..ObjectMeta::default()
        },
        rules: None,
    });
    store.put_parent(ingress(vec![], vec![]));

    reconcile_key(&ctx, PARENT).await.expect("reconcile");

    assert_eq!(store.roles().len(), 1);
    assert_eq!(name_of(&store.roles()[0].metadata), "hand-written");
}

#[tokio::test]
async fn test_logical_name_held_by_unmanaged_role_fails() {
    let (store, ctx) = setup(NamingMode::Logical);
    store.insert_role(Role {
        metadata: ObjectMeta {
            name: Some("foo".to_string()),
            ..ObjectMeta::default()
        },
        rules: None,
    });
    store.put_parent(foo_bar_ingress());

    let err = reconcile_key(&ctx, PARENT).await.expect_err("name conflict");

    assert!(matches!(
        err,
        ReconcilerError::Converge {
            source: StoreError::AlreadyExists { .. },
            ..
        }
    ));
    assert_eq!(err.phase(), "converge");
    // The unmanaged role is left as it was
    assert!(store.roles()[0].rules.is_none());
}

#[tokio::test]
async fn test_collection_spans_every_labeled_object() {
    let (store, ctx) = setup(NamingMode::Generated);
    store.insert_role(labeled_role("orphan", &hash_key("other", "route")));
    store.put_parent(foo_bar_ingress());

    let summary = reconcile_key(&ctx, PARENT).await.expect("reconcile");

    assert_eq!(summary.collected, 1);
    assert!(store.roles().iter().all(|r| name_of(&r.metadata) != "orphan"));
}

/// Store whose label selection is broken: marker queries return an unlabeled Role
struct LeakyStore {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl DerivedObjectStore for LeakyStore {
    async fn list_roles(&self, selector: &str) -> Result<Vec<Role>, StoreError> {
        let mut roles = self.inner.list_roles(selector).await?;
        if selector == marker_selector() {
            roles.push(Role {
                metadata: ObjectMeta {
                    name: Some("unlabeled".to_string()),
                    ..ObjectMeta::default()
                },
                rules: None,
            });
        }
        Ok(roles)
    }

    async fn create_role(&self, role: &Role) -> Result<Role, StoreError> {
        self.inner.create_role(role).await
    }

    async fn update_role(&self, role: &Role) -> Result<Role, StoreError> {
        self.inner.update_role(role).await
    }

    async fn delete_role(&self, name: &str) -> Result<(), StoreError> {
        self.inner.delete_role(name).await
    }

    async fn list_role_bindings(&self, selector: &str) -> Result<Vec<RoleBinding>, StoreError> {
        self.inner.list_role_bindings(selector).await
    }

    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, StoreError> {
        self.inner.create_role_binding(binding).await
    }

    async fn update_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, StoreError> {
        self.inner.update_role_binding(binding).await
    }

    async fn delete_role_binding(&self, name: &str) -> Result<(), StoreError> {
        self.inner.delete_role_binding(name).await
    }
}

#[tokio::test]
async fn test_missing_label_is_reported_and_requeued() {
    let inner = Arc::new(MemoryStore::new(SECRET_NAMESPACE));
    inner.insert_role(labeled_role("stale", &hash_key("gone", "route")));
    inner.put_parent(foo_bar_ingress());
    let ctx = Reconciler::new(
        inner.clone(),
        Arc::new(LeakyStore {
            inner: inner.clone(),
        }),
        ControllerConfig::default(),
    );

    let outcome = reconcile_parent(&ctx, PARENT, TriggerSource::Watch).await;

    assert!(outcome.requeue);
    match outcome.error {
        Some(ReconcilerError::LabelIntegrity {
            kind,
            name,
            namespace,
        }) => {
            assert_eq!(kind, "Role");
            assert_eq!(name, "unlabeled");
            assert_eq!(namespace, SECRET_NAMESPACE);
        }
        other => panic!("expected label integrity fault, got {other:?}"),
    }
    // Collection still ran past the faulting object
    assert!(inner.roles().iter().all(|r| name_of(&r.metadata) != "stale"));
    assert_eq!(inner.roles_for(&hash_key("default", "foo")).len(), 1);
}
