//! # Custom Resource Definitions
//!
//! CRD types watched by the controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `ManagedResource` specification and secret references
//! - `status.rs` - Status types for tracking reconciliation state

mod spec;
mod status;

// Re-export all public types
pub use spec::{ManagedResource, ManagedResourceSpec, SecretReference};
pub use status::{Condition, ManagedResourceStatus};
