//! # Reconciler
//!
//! Secret reconciliation for `ManagedResource` references.
//!
//! - `filter`: Class filter and reference predicates
//! - `secret`: The reconcile function driven by the controller
//! - `types`: Reconciler context and errors

pub mod filter;
pub mod secret;
pub mod types;

pub use filter::{ClassFilter, ReferencesSecret};
pub use secret::reconcile_secret;
pub use types::{ReconcilerError, SecretReconciler};
