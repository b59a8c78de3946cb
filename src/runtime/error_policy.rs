//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::controller::reconciler::{Reconciler, ReconcilerError, TriggerSource};
use crate::crd::Ingress;
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Instrument};

/// Handle reconciliation errors with per-parent Fibonacci backoff
///
/// Label-integrity faults are requeued like any other error but logged at
/// error level so the labeling bug stays visible.
pub fn handle_reconciliation_error(
    obj: Arc<Ingress>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.name_any();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name.as_str(),
        phase = error.phase()
    );
    let _error_guard = error_span.enter();

    if error.is_label_integrity_fault() {
        error!(
            "❌ Reconciliation of {} hit a label integrity fault, retrying: {}",
            name, error
        );
    }

    let (backoff_seconds, error_count) = ctx.next_backoff(&name);
    let delay = chrono::Duration::seconds(i64::try_from(backoff_seconds).unwrap_or(i64::MAX));
    let next_trigger_time = chrono::Utc::now() + delay;

    info!(
        "🔄 Retrying {} with Fibonacci backoff: {}s (error count: {}, trigger source: {})",
        name,
        backoff_seconds,
        error_count,
        TriggerSource::ErrorBackoff.as_str()
    );
    info!(
        "📅 Next retry scheduled: {} (in {}s)",
        next_trigger_time.to_rfc3339(),
        backoff_seconds
    );

    metrics::increment_requeues_total(TriggerSource::ErrorBackoff.as_str());
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// How the watch loop should treat a controller stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    /// Reconciler failure, already handled by the error policy
    Reconcile,
    /// Object vanished between event and reconciliation
    NotFound,
    /// Resource version expired; the watcher relists on its own
    Expired,
    /// API server throttling or storage reinitializing
    Throttled,
    /// Credentials rejected or RBAC revoked
    Unauthorized,
    Other,
}

/// Classify a controller stream error from its debug rendering
#[must_use]
pub fn classify_stream_error(error_string: &str) -> StreamErrorKind {
    if error_string.contains("ReconcilerFailed") {
        StreamErrorKind::Reconcile
    } else if error_string.contains("ObjectNotFound") || error_string.contains("404") {
        StreamErrorKind::NotFound
    } else if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Gone")
    {
        StreamErrorKind::Expired
    } else if error_string.contains("429") || error_string.contains("TooManyRequests") {
        StreamErrorKind::Throttled
    } else if error_string.contains("401")
        || error_string.contains("403")
        || error_string.contains("Unauthorized")
        || error_string.contains("Forbidden")
    {
        StreamErrorKind::Unauthorized
    } else {
        StreamErrorKind::Other
    }
}

/// Log a controller stream error and pause when the API server needs room
pub async fn handle_watch_stream_error(error_string: &str, restart_delay: Duration) {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );

    async {
        match classify_stream_error(error_string) {
            StreamErrorKind::Reconcile => {}
            StreamErrorKind::NotFound => {
                warn!("Object not found (404), it was probably deleted: {}", error_string);
            }
            StreamErrorKind::Expired => {
                warn!("Watch resource version expired (410), watcher will relist");
            }
            StreamErrorKind::Throttled => {
                warn!(
                    "API server throttling (429), backing off for {}s",
                    restart_delay.as_secs()
                );
                tokio::time::sleep(restart_delay).await;
            }
            StreamErrorKind::Unauthorized => {
                error!(
                    "❌ Watch rejected by the API server, check the controller's RBAC: {}",
                    error_string
                );
                tokio::time::sleep(restart_delay).await;
            }
            StreamErrorKind::Other => {
                error!("Controller stream error: {}", error_string);
            }
        }
    }
    .instrument(error_span)
    .await;
}
