//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_LOG_LEVEL, DEFAULT_MAX_CONCURRENT_RECONCILIATIONS, DEFAULT_METRICS_PORT,
    DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS, DEFAULT_RESOURCE_CLASS,
};
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have defaults and can be overridden via environment variables.
/// Values that are missing or fail to parse fall back to the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Class of `ManagedResource`s this instance is responsible for
    pub resource_class: String,
    /// How long to wait before retrying a failed reconciliation (seconds)
    /// Failed finalizer patches use their own fixed delay
    pub reconciliation_error_requeue_secs: u64,
    /// Port of the metrics and probe server
    pub metrics_port: u16,
    /// Maximum number of secrets reconciled at the same time
    pub max_concurrent_reconciliations: u16,
    /// Log filter used when `RUST_LOG` is not set
    pub log_level: String,
    /// Restrict watches to one namespace; all namespaces when unset
    pub watch_namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            resource_class: DEFAULT_RESOURCE_CLASS.to_string(),
            reconciliation_error_requeue_secs: DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            watch_namespace: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            resource_class: var_or_default_str(&lookup, "RESOURCE_CLASS", DEFAULT_RESOURCE_CLASS),
            reconciliation_error_requeue_secs: var_or_default(
                &lookup,
                "RECONCILIATION_ERROR_REQUEUE_SECS",
                DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
            ),
            metrics_port: var_or_default(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT),
            max_concurrent_reconciliations: var_or_default(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            log_level: var_or_default_str(&lookup, "LOG_LEVEL", DEFAULT_LOG_LEVEL),
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
        }
    }

    /// Get reconciliation error requeue duration
    #[must_use]
    pub fn reconciliation_error_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.reconciliation_error_requeue_secs)
    }
}

/// Read a variable or return the default value
fn var_or_default<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read a non-empty variable as string or return the default
fn var_or_default_str(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> String {
    lookup(key)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
