//! # Watch Loop
//!
//! Controller watch loop over secrets. A `ManagedResource` change triggers a
//! reconciliation of every secret it references, plus every cached secret in
//! its namespace that still carries the class finalizer. The mapper only sees
//! the new object, so the finalizer is what finds secrets whose reference was
//! just dropped.

use crate::controller::reconciler::reconcile_secret;
use crate::crd::ManagedResource;
use crate::runtime::error_policy::{handle_reconciliation_error, log_controller_result};
use crate::runtime::initialization::InitializationResult;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube_runtime::controller::{self, Controller};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use std::sync::Arc;
use tracing::info;

/// Secrets referenced by a `ManagedResource`, in its namespace
#[must_use]
pub fn referenced_secrets(managed_resource: &ManagedResource) -> Vec<ObjectRef<Secret>> {
    let Some(namespace) = managed_resource.metadata.namespace.as_deref() else {
        return Vec::new();
    };
    managed_resource
        .spec
        .secret_refs
        .iter()
        .map(|secret_ref| ObjectRef::new(&secret_ref.name).within(namespace))
        .collect()
}

/// Secrets to reconcile after a `ManagedResource` event
///
/// The referenced secrets, followed by every secret in `cached` from the
/// same namespace that carries `finalizer_name`. Each secret appears once.
#[must_use]
pub fn secrets_to_reconcile(
    managed_resource: &ManagedResource,
    cached: &[Arc<Secret>],
    finalizer_name: &str,
) -> Vec<ObjectRef<Secret>> {
    let mut refs = referenced_secrets(managed_resource);
    let Some(namespace) = managed_resource.metadata.namespace.as_deref() else {
        return refs;
    };
    let finalized = cached
        .iter()
        .filter(|secret| secret.metadata.namespace.as_deref() == Some(namespace))
        .filter(|secret| {
            secret
                .metadata
                .finalizers
                .as_ref()
                .is_some_and(|finalizers| finalizers.iter().any(|f| f == finalizer_name))
        })
        .map(|secret| ObjectRef::from_obj(secret.as_ref()));
    for secret_ref in finalized {
        if !refs.contains(&secret_ref) {
            refs.push(secret_ref);
        }
    }
    refs
}

/// Run the controller until a shutdown signal arrives
///
/// # Errors
///
/// Currently always returns `Ok` once the controller has drained.
pub async fn run_watch_loop(init: InitializationResult) -> Result<(), anyhow::Error> {
    let InitializationResult {
        config,
        secrets,
        managed_resources,
        reconciler,
        server_state,
        shutdown,
    } = init;

    let shutdown_server_state = server_state.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_server_state.set_ready(false);
        shutdown.cancel();
    });

    info!(
        concurrency = config.max_concurrent_reconciliations,
        "Starting controller watch loop..."
    );

    let controller = Controller::new(secrets, watcher::Config::default().any_semantic());
    let secret_cache = controller.store();
    let finalizer_name = reconciler.filter.finalizer_name().to_string();

    controller
        .watches(managed_resources, watcher::Config::default(), move |mr| {
            secrets_to_reconcile(&mr, &secret_cache.state(), &finalizer_name)
        })
        .with_config(controller::Config::default().concurrency(config.max_concurrent_reconciliations))
        .shutdown_on_signal()
        .run(reconcile_secret, handle_reconciliation_error, reconciler)
        .for_each(|result| {
            log_controller_result(&result);
            futures::future::ready(())
        })
        .await;

    server_state.set_ready(false);
    info!("Controller stopped gracefully");
    Ok(())
}
