//! # Types
//!
//! Core types for the secret reconciler.

use crate::constants::FINALIZER_FAILURE_REQUEUE;
use crate::controller::cancel::CancellationSignal;
use crate::controller::mutator::{Mutator, MutatorError};
use crate::controller::reconciler::ClassFilter;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("failed to get secret {key}: {source}")]
    FetchSecret {
        key: String,
        #[source]
        source: MutatorError,
    },
    #[error("failed to list ManagedResources in namespace {namespace}: {source}")]
    ListManagedResources {
        namespace: String,
        #[source]
        source: MutatorError,
    },
    #[error("failed to add finalizer to secret {key}: {source}")]
    AddFinalizer {
        key: String,
        #[source]
        source: MutatorError,
    },
    #[error("failed to remove finalizer from secret {key}: {source}")]
    RemoveFinalizer {
        key: String,
        #[source]
        source: MutatorError,
    },
}

impl ReconcilerError {
    /// Fixed requeue delay for this error, if it has one
    ///
    /// Failed finalizer writes are retried by re-running the whole
    /// reconciliation after [`FINALIZER_FAILURE_REQUEUE`]. Failures to read
    /// the secret or list `ManagedResource`s return `None` and wait for the
    /// controller's configured error interval
    /// (`RECONCILIATION_ERROR_REQUEUE_SECS`).
    #[must_use]
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Self::AddFinalizer { .. } | Self::RemoveFinalizer { .. } => {
                Some(FINALIZER_FAILURE_REQUEUE)
            }
            Self::FetchSecret { .. } | Self::ListManagedResources { .. } => None,
        }
    }
}

/// Shared context of the secret controller
#[derive(Debug, Clone)]
pub struct SecretReconciler {
    pub mutator: Mutator,
    pub filter: ClassFilter,
    /// Requeue interval for errors without a fixed delay
    pub error_requeue: Duration,
    /// Fires on controller shutdown, abandoning in-flight store calls
    pub shutdown: CancellationSignal,
}

impl SecretReconciler {
    #[must_use]
    pub fn new(mutator: Mutator, filter: ClassFilter, error_requeue: Duration) -> Self {
        Self {
            mutator,
            filter,
            error_requeue,
            shutdown: CancellationSignal::never(),
        }
    }

    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationSignal) -> Self {
        self.shutdown = shutdown;
        self
    }
}
