//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing,
//! metrics, server startup, and Kubernetes client setup.

use crate::config::ControllerConfig;
use crate::controller::reconciler::{reconcile_parent, Reconciler, TriggerSource};
use crate::observability;
use crate::server::{start_server, ServerState};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn, Instrument};

/// Components needed by the watch loop
pub struct InitializationResult {
    pub client: Client,
    pub reconciler: Arc<Reconciler>,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready())
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Reconciler setup
/// - A first reconciliation of the configured Ingress config
///
/// # Errors
///
/// Fails if the server cannot start, metrics cannot be registered, or no
/// Kubernetes client configuration is available.
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before any rustls connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err(anyhow::anyhow!("Failed to install rustls crypto provider"));
    }

    observability::tracing::init_tracing()?;

    info!(
        "Starting Ingress Routes Controller v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = ControllerConfig::from_env();
    info!(
        namespace = %config.secret_namespace,
        parent = %config.parent_name,
        naming_mode = config.naming_mode.as_str(),
        "Loaded controller configuration"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    wait_for_server_ready(&server_state, &server_handle, &config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let reconciler = Arc::new(Reconciler::from_client(client.clone(), config));

    reconcile_configured_parent(&reconciler).await;

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        reconciler,
        server_state,
    })
}

/// Wait for the HTTP server to bind before proceeding
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &ControllerConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Reconcile the configured parent once before the watch starts
///
/// Failures are logged only; the watch loop retries on its first event.
async fn reconcile_configured_parent(reconciler: &Arc<Reconciler>) {
    let span = tracing::span!(
        tracing::Level::INFO,
        "controller.startup.reconcile_existing",
        resource.name = reconciler.config.parent_name.as_str()
    );

    let parent = reconciler.config.parent_name.clone();
    let outcome = reconcile_parent(reconciler, &parent, TriggerSource::Startup)
        .instrument(span)
        .await;
    match outcome.error {
        None => info!("Startup reconciliation of Ingress '{}' finished", parent),
        Some(e) => warn!(
            "Startup reconciliation of Ingress '{}' failed (requeue: {}): {}",
            parent, outcome.requeue, e
        ),
    }
}
