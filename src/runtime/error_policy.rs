//! # Error Policy
//!
//! Requeue decisions for failed reconciliations and logging of controller
//! stream errors.

use crate::controller::reconciler::{ReconcilerError, SecretReconciler};
use k8s_openapi::api::core::v1::Secret;
use kube_runtime::controller::{self, Action};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Requeue a failed reconciliation
///
/// Errors with a fixed delay (failed finalizer writes) use it, everything
/// else waits for the configured error interval.
pub fn handle_reconciliation_error(
    secret: Arc<Secret>,
    error: &ReconcilerError,
    ctx: Arc<SecretReconciler>,
) -> Action {
    let delay = error.requeue_after().unwrap_or(ctx.error_requeue);
    error!(
        secret.name = secret.metadata.name.as_deref().unwrap_or("unknown"),
        secret.namespace = secret.metadata.namespace.as_deref().unwrap_or("default"),
        requeue_after = ?delay,
        "Reconciliation failed: {}",
        error
    );
    Action::requeue(delay)
}

/// Log one item of the controller output stream
pub fn log_controller_result<T: std::fmt::Debug, QueueErr: std::error::Error + 'static>(
    result: &Result<T, controller::Error<ReconcilerError, QueueErr>>,
) {
    match result {
        Ok(object) => debug!(?object, "Reconciled"),
        // Already logged by the error policy
        Err(controller::Error::ReconcilerFailed(_, _)) => {}
        Err(controller::Error::ObjectNotFound(object)) => {
            debug!(%object, "Object vanished before it was reconciled");
        }
        Err(err) => warn!("Controller stream error: {}", err),
    }
}
