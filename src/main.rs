//! # Ingress Routes Controller
//!
//! Kubernetes controller that maintains the Roles and RoleBindings letting
//! component operators read the serving certificate secrets configured on
//! the cluster `Ingress` config.
//!
//! ## Configuration
//!
//! All settings come from environment variables, see
//! [`ControllerConfig`](ingress_routes_controller::config::ControllerConfig).
//! `RUST_LOG` controls log verbosity.

use anyhow::Result;
use ingress_routes_controller::runtime::{initialization::initialize, watch_loop::run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    run_watch_loop(
        init_result.client,
        init_result.reconciler,
        init_result.server_state,
    )
    .await
}
