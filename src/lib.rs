//! Managed Resource Controller Library
//!
//! Keeps a protective finalizer on every secret that a `ManagedResource` of
//! the controller's class references, and provides the conflict-aware
//! mutation helpers the reconciler is built on.
//!
//! ## Quick Start
//!
//! ```rust
//! use managed_resource_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod server;
