//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Label carrying the correlation hash of the component route a derived
/// Role or RoleBinding was generated for
pub const COMPONENT_ROUTE_HASH_LABEL: &str = "ingress.operator.openshift.io/componentroutehash";

/// Annotation naming the Ingress config a derived object was generated from
pub const OWNING_INGRESS_ANNOTATION: &str = "ingress.operator.openshift.io/owning-ingress";

/// Namespace holding admin-supplied serving certificate secrets
pub const DEFAULT_SECRET_NAMESPACE: &str = "openshift-config";

/// Name of the singleton Ingress config resource
pub const DEFAULT_PARENT_NAME: &str = "cluster";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default minimum retry delay after a failed reconciliation (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Default maximum retry delay after repeated failed reconciliations (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default tracing filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "ingress_routes_controller=info";

/// Verbs granted on a serving certificate secret
pub const SECRET_READ_VERBS: [&str; 3] = ["get", "list", "watch"];

/// API group of RBAC resources
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Subject kind used for every consuming user
pub const SERVICE_ACCOUNT_KIND: &str = "ServiceAccount";
