//! # CRD Generator
//!
//! Prints the `ManagedResource` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/managedresource.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use anyhow::{Context, Result};
use kube::core::CustomResourceExt;
use managed_resource_controller::crd::ManagedResource;

fn main() -> Result<()> {
    let crd = serde_yaml::to_string(&ManagedResource::crd())
        .context("Failed to serialize ManagedResource CRD")?;
    print!("{crd}");
    Ok(())
}
