//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use managed_resource_controller::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Store boundary
pub use crate::controller::store::{MergePatch, ObjectKey, ObjectStore, StoreError, StoreObject};

// Mutation helpers
pub use crate::controller::backoff::RetryPolicy;
pub use crate::controller::cancel::{cancellation, CancellationHandle, CancellationSignal};
pub use crate::controller::mutator::{Mutator, MutatorError, OperationResult, Sleeper};

// Reconciler types
pub use crate::controller::reconciler::{
    reconcile_secret, ClassFilter, ReconcilerError, SecretReconciler,
};

pub use crate::config::ControllerConfig;
