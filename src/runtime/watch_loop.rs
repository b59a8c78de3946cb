//! # Watch Loop
//!
//! Runs the kube-runtime controller over the Ingress config and the
//! labeled Roles and RoleBindings derived from it.

use crate::constants::{COMPONENT_ROUTE_HASH_LABEL, OWNING_INGRESS_ANNOTATION};
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::crd::Ingress;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use crate::server::ServerState;
use futures::StreamExt;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::Api;
use kube::runtime::reflector::ObjectRef;
use kube::Client;
use kube_runtime::{controller, watcher, Controller};
use std::sync::Arc;
use tracing::{debug, info};

/// Parent key a derived object belongs to
///
/// Uses the owning-ingress annotation when present, else `fallback`.
#[must_use]
pub fn owning_ingress(meta: &ObjectMeta, fallback: &str) -> Option<ObjectRef<Ingress>> {
    meta.labels.as_ref()?.get(COMPONENT_ROUTE_HASH_LABEL)?;
    let parent = meta
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(OWNING_INGRESS_ANNOTATION))
        .filter(|name| !name.is_empty())
        .map_or(fallback, String::as_str);
    Some(ObjectRef::new(parent))
}

/// Run the controller until SIGINT or SIGTERM
///
/// Watch errors do not end the controller stream; the watchers relist with
/// their own backoff. The stream ends only once a shutdown signal has been
/// received and in-flight reconciliations have finished.
///
/// # Errors
///
/// Currently infallible; the signature matches the other runtime phases.
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let config = reconciler.config.clone();
    let restart_delay = config.watch_restart_delay_duration();

    let ingresses: Api<Ingress> = Api::all(client.clone());
    let roles: Api<Role> = Api::namespaced(client.clone(), &config.secret_namespace);
    let role_bindings: Api<RoleBinding> = Api::namespaced(client, &config.secret_namespace);
    let derived = watcher::Config::default().labels(COMPONENT_ROUTE_HASH_LABEL);
    let role_parent = config.parent_name.clone();
    let binding_parent = config.parent_name.clone();

    info!(
        namespace = %config.secret_namespace,
        concurrency = config.max_concurrent_reconciliations,
        "Starting controller watch loop..."
    );

    Controller::new(ingresses, watcher::Config::default().any_semantic())
        .watches(roles, derived.clone(), move |role: Role| {
            owning_ingress(&role.metadata, &role_parent)
        })
        .watches(role_bindings, derived, move |binding: RoleBinding| {
            owning_ingress(&binding.metadata, &binding_parent)
        })
        .with_config(
            controller::Config::default().concurrency(config.max_concurrent_reconciliations),
        )
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, reconciler)
        .for_each(move |result| async move {
            match result {
                Ok((object, _action)) => debug!(parent = %object.name, "reconciled"),
                Err(e) => handle_watch_stream_error(&format!("{e:?}"), restart_delay).await,
            }
        })
        .await;

    server_state.set_ready(false);
    info!("Controller stopped gracefully");
    Ok(())
}
