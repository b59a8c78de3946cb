//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_BACKOFF_MAX_SECS, DEFAULT_BACKOFF_MIN_SECS, DEFAULT_METRICS_PORT, DEFAULT_PARENT_NAME,
    DEFAULT_SECRET_NAMESPACE, DEFAULT_SERVER_POLL_INTERVAL_MS,
    DEFAULT_SERVER_STARTUP_TIMEOUT_SECS, DEFAULT_WATCH_RESTART_DELAY_SECS,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// How derived Roles are named
///
/// RoleBindings always take the exact name of the Role they reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingMode {
    /// Role named after the component route's logical name
    Logical,
    /// Role created with `generateName` and the server-assigned name kept
    #[default]
    Generated,
}

impl NamingMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NamingMode::Logical => "logical",
            NamingMode::Generated => "generated",
        }
    }
}

impl FromStr for NamingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "logical" | "legacy" => Ok(NamingMode::Logical),
            "generated" | "generate" => Ok(NamingMode::Generated),
            other => Err(format!("unknown naming mode '{other}'")),
        }
    }
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace in which derived Roles and RoleBindings live
    pub secret_namespace: String,
    /// Name of the Ingress config resource reconciled at startup
    /// and used when a derived object carries no owning annotation
    pub parent_name: String,
    /// Naming strategy for derived Roles
    pub naming_mode: NamingMode,
    /// HTTP port for metrics and probes
    pub metrics_port: u16,
    /// How long to wait for the HTTP server to come up (seconds)
    pub startup_timeout_secs: u64,
    /// Readiness poll interval while waiting for the HTTP server (milliseconds)
    pub poll_interval_ms: u64,
    /// First retry delay after a failed reconciliation (seconds)
    pub backoff_min_secs: u64,
    /// Cap on the retry delay (seconds)
    pub backoff_max_secs: u64,
    /// Watch stream restart delay after it ends or errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Maximum concurrent reconciliations (0 means unbounded)
    pub max_concurrent_reconciliations: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            secret_namespace: DEFAULT_SECRET_NAMESPACE.to_string(),
            parent_name: DEFAULT_PARENT_NAME.to_string(),
            naming_mode: NamingMode::default(),
            metrics_port: DEFAULT_METRICS_PORT,
            startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            max_concurrent_reconciliations: 1,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Unparseable values fall back to their defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let naming_mode = match lookup("NAMING_MODE") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("Ignoring NAMING_MODE: {}", e);
                defaults.naming_mode
            }),
            None => defaults.naming_mode,
        };

        let backoff_min_secs = parse_or(&lookup, "BACKOFF_MIN_SECS", defaults.backoff_min_secs);
        let backoff_max_secs = parse_or(&lookup, "BACKOFF_MAX_SECS", defaults.backoff_max_secs)
            .max(backoff_min_secs);

        Self {
            secret_namespace: lookup("SECRET_NAMESPACE")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.secret_namespace),
            parent_name: lookup("PARENT_NAME")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.parent_name),
            naming_mode,
            metrics_port: parse_or(&lookup, "METRICS_PORT", defaults.metrics_port),
            startup_timeout_secs: parse_or(
                &lookup,
                "SERVER_STARTUP_TIMEOUT_SECS",
                defaults.startup_timeout_secs,
            ),
            poll_interval_ms: parse_or(&lookup, "SERVER_POLL_INTERVAL_MS", defaults.poll_interval_ms),
            backoff_min_secs,
            backoff_max_secs,
            watch_restart_delay_secs: parse_or(
                &lookup,
                "WATCH_RESTART_DELAY_SECS",
                defaults.watch_restart_delay_secs,
            ),
            max_concurrent_reconciliations: parse_or(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                defaults.max_concurrent_reconciliations,
            ),
        }
    }

    /// Get watch restart delay duration
    #[must_use]
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparseable value '{}' for {}", raw, key);
            default
        }),
        None => default,
    }
}
