//! # Controller
//!
//! Core controller modules.
//!
//! - `backoff`: Retry policy and exponential backoff with jitter
//! - `cancel`: Cancellation signal for store calls and sleeps
//! - `kube_store`: Object store backed by the Kubernetes API
//! - `mutator`: Optimistic writes with conflict retry
//! - `predicate`: Object filters
//! - `reconciler`: Secret finalizer reconciliation
//! - `registry`: Concrete types for known kinds
//! - `store`: Object store boundary and typed helpers

pub mod backoff;
pub mod cancel;
pub mod kube_store;
pub mod mutator;
pub mod predicate;
pub mod reconciler;
pub mod registry;
pub mod store;
