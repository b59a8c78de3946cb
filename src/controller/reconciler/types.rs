//! # Types
//!
//! Core types for the reconciler.

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::store::{DerivedObjectStore, KubeStore, ParentSource, StoreError};
use crate::controller::upsert::{Converged, ObjectAction};
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("failed to fetch Ingress '{parent}': {source}")]
    Fetch {
        parent: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to converge component route {target} of Ingress '{parent}': {source}")]
    Converge {
        parent: String,
        target: String,
        #[source]
        source: StoreError,
    },
    #[error("garbage collection failed for Ingress '{parent}': {source}")]
    Collect {
        parent: String,
        #[source]
        source: StoreError,
    },
    /// A derived object matched the marker selector without carrying the marker label
    #[error("{kind} '{name}' in namespace '{namespace}' is missing its correlation label")]
    LabelIntegrity {
        kind: &'static str,
        name: String,
        namespace: String,
    },
}

impl ReconcilerError {
    /// Labeling bug elsewhere in the cluster, surfaced at error level
    #[must_use]
    pub fn is_label_integrity_fault(&self) -> bool {
        matches!(self, ReconcilerError::LabelIntegrity { .. })
    }

    /// Short machine-friendly name used in metrics and logs
    #[must_use]
    pub fn phase(&self) -> &'static str {
        match self {
            ReconcilerError::Fetch { .. } => "fetch",
            ReconcilerError::Converge { .. } => "converge",
            ReconcilerError::Collect { .. } => "collect",
            ReconcilerError::LabelIntegrity { .. } => "label-integrity",
        }
    }
}

/// Result of one reconciliation as seen by a trigger source
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub requeue: bool,
    pub error: Option<ReconcilerError>,
}

impl ReconcileOutcome {
    #[must_use]
    pub fn success() -> Self {
        Self {
            requeue: false,
            error: None,
        }
    }

    #[must_use]
    pub fn failure(error: ReconcilerError) -> Self {
        Self {
            requeue: true,
            error: Some(error),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl From<Result<ReconcileSummary, ReconcilerError>> for ReconcileOutcome {
    fn from(result: Result<ReconcileSummary, ReconcilerError>) -> Self {
        match result {
            Ok(_) => Self::success(),
            Err(e) => Self::failure(e),
        }
    }
}

/// Counts of what a successful reconciliation did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// False when the parent no longer exists and nothing was done
    pub parent_found: bool,
    pub targets: usize,
    pub created: usize,
    pub updated: usize,
    pub recreated: usize,
    pub unchanged: usize,
    pub duplicates_deleted: usize,
    pub collected: usize,
}

impl ReconcileSummary {
    pub(crate) fn record(&mut self, converged: &Converged) {
        match converged.action {
            ObjectAction::Created => self.created += 1,
            ObjectAction::Updated => self.updated += 1,
            ObjectAction::Recreated => self.recreated += 1,
            ObjectAction::Unchanged => self.unchanged += 1,
        }
        self.duplicates_deleted += converged.duplicates_deleted;
    }

    /// Whether any derived object was written
    #[must_use]
    pub fn changed(&self) -> bool {
        self.created + self.updated + self.recreated + self.duplicates_deleted + self.collected > 0
    }
}

/// Why a reconciliation was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Initial pass over the configured parent before the watch starts
    Startup,
    /// Parent or labeled derived object changed
    Watch,
    /// Retry scheduled by the error policy
    ErrorBackoff,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Startup => "startup",
            TriggerSource::Watch => "watch",
            TriggerSource::ErrorBackoff => "error-backoff",
        }
    }
}

/// Backoff state for a specific parent
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

#[derive(Clone)]
pub struct Reconciler {
    pub parents: Arc<dyn ParentSource>,
    pub store: Arc<dyn DerivedObjectStore>,
    pub config: ControllerConfig,
    // Keyed by parent name; owned by the error policy
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        parents: Arc<dyn ParentSource>,
        store: Arc<dyn DerivedObjectStore>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            parents,
            store,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Reconciler backed by the Kubernetes API
    #[must_use]
    pub fn from_client(client: Client, config: ControllerConfig) -> Self {
        let store = Arc::new(KubeStore::new(client, &config.secret_namespace));
        Self::new(store.clone(), store, config)
    }

    /// Forget accumulated errors for a parent
    pub fn reset_backoff(&self, parent: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(parent) {
                state.reset();
            }
        }
    }

    /// Record an error for a parent and return the next delay and error count
    ///
    /// Falls back to the configured minimum if the state lock is poisoned.
    pub fn next_backoff(&self, parent: &str) -> (u64, u32) {
        let (min, max) = (self.config.backoff_min_secs, self.config.backoff_max_secs);
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(parent.to_string())
                    .or_insert_with(|| BackoffState::new(min, max));
                state.increment_error();
                (state.backoff.next_backoff_seconds(), state.error_count)
            }
            Err(_) => (min.max(1), 0),
        }
    }
}
