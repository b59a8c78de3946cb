//! # Reconciliation Logic
//!
//! Drives one Ingress config through fetch, converge, and collect.
//!
//! Every step is idempotent, so a failed pass simply aborts and the next
//! trigger re-runs the whole algorithm from scratch.

use crate::controller::gc::{collect_garbage, CollectError};
use crate::controller::intersect::{active_hashes, targets_for, ReconciliationTarget};
use crate::controller::rbac::DerivedScope;
use crate::controller::reconciler::types::{
    ReconcileOutcome, ReconcileSummary, Reconciler, ReconcilerError, TriggerSource,
};
use crate::controller::store::StoreError;
use crate::controller::upsert::{ensure_role, ensure_role_binding};
use crate::crd::Ingress;
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// Reconcile the Ingress config named `name`
///
/// A missing parent is a successful no-op.
///
/// # Errors
///
/// Returns the first store failure encountered, or a label-integrity fault
/// found during garbage collection.
pub async fn reconcile_key(
    ctx: &Reconciler,
    name: &str,
) -> Result<ReconcileSummary, ReconcilerError> {
    let ingress = match ctx.parents.get_parent(name).await {
        Ok(ingress) => ingress,
        Err(e) if e.is_not_found() => {
            debug!(parent = name, "Ingress config not found, nothing to reconcile");
            return Ok(ReconcileSummary::default());
        }
        Err(source) => {
            return Err(ReconcilerError::Fetch {
                parent: name.to_string(),
                source,
            })
        }
    };

    let targets = targets_for(&ingress);
    metrics::set_active_targets(targets.len());
    debug!(parent = name, targets = targets.len(), "computed active targets");

    let scope = DerivedScope {
        namespace: &ctx.config.secret_namespace,
        parent: name,
        naming_mode: ctx.config.naming_mode,
    };
    let mut summary = ReconcileSummary {
        parent_found: true,
        targets: targets.len(),
        ..ReconcileSummary::default()
    };

    for target in &targets {
        let to_error = |source: StoreError| converge_error(name, target, source);
        let role = ensure_role(&*ctx.store, &scope, target)
            .await
            .map_err(to_error)?;
        summary.record(&role);
        let binding = ensure_role_binding(&*ctx.store, &scope, target, &role.name)
            .await
            .map_err(to_error)?;
        summary.record(&binding);
    }

    let report = collect_garbage(&*ctx.store, &active_hashes(&targets))
        .await
        .map_err(|e| match e {
            CollectError::Store(source) => ReconcilerError::Collect {
                parent: name.to_string(),
                source,
            },
            CollectError::MissingLabel { kind, name, .. } => ReconcilerError::LabelIntegrity {
                kind,
                name,
                namespace: ctx.config.secret_namespace.clone(),
            },
        })?;
    summary.collected = report.total();

    Ok(summary)
}

fn converge_error(
    parent: &str,
    target: &ReconciliationTarget,
    source: StoreError,
) -> ReconcilerError {
    ReconcilerError::Converge {
        parent: parent.to_string(),
        target: target.key.to_string(),
        source,
    }
}

/// Run one reconciliation with metrics and logging
async fn reconcile_instrumented(
    ctx: &Reconciler,
    name: &str,
    trigger_source: TriggerSource,
) -> Result<ReconcileSummary, ReconcilerError> {
    let start = Instant::now();
    metrics::increment_reconciliations();

    let span = tracing::span!(
        tracing::Level::INFO,
        "reconcile",
        resource.name = name,
        resource.kind = "Ingress",
        trigger = trigger_source.as_str()
    );

    let result = reconcile_key(ctx, name).instrument(span).await;
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    match &result {
        Ok(summary) if !summary.parent_found => {}
        Ok(summary) if summary.changed() => {
            info!(
                parent = name,
                targets = summary.targets,
                created = summary.created,
                updated = summary.updated,
                recreated = summary.recreated,
                duplicates_deleted = summary.duplicates_deleted,
                collected = summary.collected,
                "✅ Reconciled Ingress config"
            );
        }
        Ok(summary) => {
            debug!(parent = name, targets = summary.targets, "derived objects already converged");
        }
        Err(e @ ReconcilerError::LabelIntegrity { .. }) => {
            metrics::increment_reconciliation_errors();
            error!(parent = name, error = %e, "❌ Derived object label integrity fault");
        }
        Err(e) => {
            metrics::increment_reconciliation_errors();
            warn!(parent = name, phase = e.phase(), error = %e, "Reconciliation failed");
        }
    }

    result
}

/// Reconcile a parent key and report whether the caller should retry
pub async fn reconcile_parent(
    ctx: &Reconciler,
    name: &str,
    trigger_source: TriggerSource,
) -> ReconcileOutcome {
    ReconcileOutcome::from(reconcile_instrumented(ctx, name, trigger_source).await)
}

/// Entry point for the kube-runtime controller
///
/// Errors are handed to the error policy, which owns backoff.
///
/// # Errors
///
/// See [`reconcile_key`].
pub async fn reconcile(
    ingress: Arc<Ingress>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = ingress.name_any();
    reconcile_instrumented(&ctx, &name, TriggerSource::Watch).await?;
    ctx.reset_backoff(&name);
    Ok(Action::await_change())
}
