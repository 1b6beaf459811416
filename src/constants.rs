//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

use std::time::Duration;

/// API group of the `ManagedResource` custom resource
pub const RESOURCES_GROUP: &str = "resources.gardener.cloud";

/// Resource class used when no class is configured
pub const DEFAULT_RESOURCE_CLASS: &str = "resources";

/// Finalizer protecting secrets referenced by resources of the default class
/// Other classes append `-<class>` to this name
pub const FINALIZER_NAME: &str = "resources.gardener.cloud/gardener-resource-manager";

/// Fixed requeue delay after a failed finalizer patch
/// The whole reconciliation is re-run instead of retrying the patch in place
pub const FINALIZER_FAILURE_REQUEUE: Duration = Duration::from_secs(5);

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default requeue interval for reconciliation errors (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Default number of secrets reconciled in parallel
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Default log filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Field manager recorded on writes issued by this controller
pub const FIELD_MANAGER: &str = "managed-resource-controller";
