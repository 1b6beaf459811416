//! # Managed Resource Controller
//!
//! A Kubernetes controller that protects secrets referenced by
//! `ManagedResource`s from deletion.
//!
//! ## Overview
//!
//! For every secret the controller checks whether a `ManagedResource` of its
//! class in the same namespace lists the secret in `spec.secretRefs`:
//!
//! 1. **Referenced** - the class finalizer is added to the secret
//! 2. **Not referenced** - the class finalizer is removed again
//!
//! Changes to `ManagedResource`s re-trigger the secrets they reference.
//!
//! ## Configuration
//!
//! Settings come from environment variables (see [`ControllerConfig`]);
//! command line flags override them.

use anyhow::Result;
use clap::Parser;
use managed_resource_controller::config::ControllerConfig;
use managed_resource_controller::runtime::{initialization, watch_loop};

/// Keeps class finalizers on secrets referenced by ManagedResources
#[derive(Parser, Debug)]
#[command(name = "managed-resource-controller", version, about, long_about = None)]
struct Args {
    /// Resource class this instance is responsible for
    #[arg(long)]
    resource_class: Option<String>,

    /// Port for the metrics and probe server
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,

    /// Only watch this namespace
    #[arg(long)]
    namespace: Option<String>,
}

impl Args {
    fn apply(self, mut config: ControllerConfig) -> ControllerConfig {
        if let Some(class) = self.resource_class {
            config.resource_class = class;
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if self.namespace.is_some() {
            config.watch_namespace = self.namespace;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().apply(ControllerConfig::from_env());

    let init = initialization::initialize(config).await?;
    watch_loop::run_watch_loop(init).await
}
