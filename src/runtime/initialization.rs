//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and Kubernetes client setup.

use crate::config::ControllerConfig;
use crate::controller::cancel::{cancellation, CancellationHandle};
use crate::controller::kube_store::KubeStore;
use crate::controller::mutator::Mutator;
use crate::controller::reconciler::{ClassFilter, SecretReconciler};
use crate::crd::ManagedResource;
use crate::observability;
use crate::server::{start_server, ServerState};
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    pub config: ControllerConfig,
    /// API for the reconciled secrets
    pub secrets: Api<Secret>,
    /// API for the watched `ManagedResource`s
    pub managed_resources: Api<ManagedResource>,
    /// Reconciler context
    pub reconciler: Arc<SecretReconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Cancels in-flight store calls on shutdown
    pub shutdown: CancellationHandle,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("config", &self.config)
            .field("server_ready", &self.server_state.ready())
            .finish_non_exhaustive()
    }
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins over the configured level.
pub fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("Tracing subscriber already initialized: {e}");
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Reconciler setup
///
/// # Errors
///
/// Fails if metrics cannot be registered, the server does not come up or no
/// Kubernetes client can be built.
pub async fn initialize(config: ControllerConfig) -> Result<InitializationResult> {
    // Must run before any TLS connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    init_tracing(&config.log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        class = %config.resource_class,
        "Starting managed resource controller"
    );

    observability::metrics::register_metrics().context("Failed to register metrics")?;

    let server_state = Arc::new(ServerState::new());
    let server_handle = {
        let server_state = server_state.clone();
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_server(port, server_state).await {
                error!("HTTP server error: {}", e);
            }
        })
    };
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let (secrets, managed_resources) = match &config.watch_namespace {
        Some(namespace) => {
            info!(namespace = %namespace, "Watching a single namespace");
            (
                Api::namespaced(client.clone(), namespace),
                Api::namespaced(client.clone(), namespace),
            )
        }
        None => (Api::all(client.clone()), Api::all(client.clone())),
    };

    let (shutdown, shutdown_signal) = cancellation();
    let filter = ClassFilter::new(&config.resource_class);
    info!(
        class = filter.resource_class(),
        finalizer = filter.finalizer_name(),
        "Resource class configured"
    );
    let reconciler = Arc::new(
        SecretReconciler::new(
            Mutator::new(Arc::new(KubeStore::new(client))),
            filter,
            config.reconciliation_error_requeue_duration(),
        )
        .with_shutdown(shutdown_signal),
    );

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        config,
        secrets,
        managed_resources,
        reconciler,
        server_state,
        shutdown,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
    const POLL_INTERVAL: Duration = Duration::from_millis(50);
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > STARTUP_TIMEOUT {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                STARTUP_TIMEOUT.as_secs()
            ));
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
