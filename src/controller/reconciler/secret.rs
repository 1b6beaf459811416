//! # Secret Reconciliation
//!
//! Keeps the class finalizer on a secret exactly while a `ManagedResource`
//! of the same class in the same namespace references it.

use crate::controller::cancel::CancellationSignal;
use crate::controller::predicate::eval_predicates;
use crate::controller::reconciler::types::{ReconcilerError, SecretReconciler};
use crate::controller::reconciler::ReferencesSecret;
use crate::controller::store::ObjectKey;
use crate::crd::ManagedResource;
use crate::observability;
use k8s_openapi::api::core::v1::Secret;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Entry point for the controller: reconcile one secret
///
/// # Errors
///
/// See [`SecretReconciler::reconcile`].
pub async fn reconcile_secret(
    secret: Arc<Secret>,
    ctx: Arc<SecretReconciler>,
) -> Result<Action, ReconcilerError> {
    let key = ObjectKey::from_object(secret.as_ref());
    let start = Instant::now();
    observability::increment_reconciliations();

    let shutdown = ctx.shutdown.clone();
    let result = ctx.reconcile(&key, &shutdown).await;

    observability::observe_reconciliation_duration(start.elapsed().as_secs_f64());
    if result.is_err() {
        observability::increment_reconciliation_errors();
    }
    result
}

impl SecretReconciler {
    /// Add or remove the class finalizer on the secret behind `key`
    ///
    /// A secret that no longer exists needs no work.
    ///
    /// # Errors
    ///
    /// - [`ReconcilerError::FetchSecret`] if the secret cannot be read
    /// - [`ReconcilerError::ListManagedResources`] if the namespace cannot be listed
    /// - [`ReconcilerError::AddFinalizer`] / [`ReconcilerError::RemoveFinalizer`]
    ///   if the finalizer patch fails
    #[instrument(skip(self, key, cancel), fields(secret = %key))]
    pub async fn reconcile(
        &self,
        key: &ObjectKey,
        cancel: &CancellationSignal,
    ) -> Result<Action, ReconcilerError> {
        let secret: Secret = match self.mutator.get(cancel, key).await {
            Ok(secret) => secret,
            Err(err) if err.is_not_found() => {
                debug!("Secret is gone, nothing to do");
                return Ok(Action::await_change());
            }
            Err(source) => {
                return Err(ReconcilerError::FetchSecret {
                    key: key.to_string(),
                    source,
                })
            }
        };

        let namespace = key.namespace.clone().unwrap_or_default();
        let managed_resources: Vec<ManagedResource> = self
            .mutator
            .list(cancel, &namespace)
            .await
            .map_err(|source| ReconcilerError::ListManagedResources {
                namespace: namespace.clone(),
                source,
            })?;

        let references = ReferencesSecret::new(&key.name);
        let referenced = managed_resources
            .iter()
            .any(|mr| eval_predicates(mr, &[&self.filter, &references]));

        let finalizer = self.filter.finalizer_name();
        let has_finalizer = secret
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|finalizers| finalizers.iter().any(|f| f == finalizer));

        match (referenced, has_finalizer) {
            (true, false) => {
                info!(finalizer, "Secret is referenced, adding finalizer");
                self.mutator
                    .ensure_finalizer::<Secret>(cancel, key, finalizer)
                    .await
                    .map_err(|source| ReconcilerError::AddFinalizer {
                        key: key.to_string(),
                        source,
                    })?;
                observability::increment_finalizers_added();
            }
            (false, true) => {
                info!(finalizer, "Secret is no longer referenced, removing finalizer");
                self.mutator
                    .delete_finalizer::<Secret>(cancel, key, finalizer)
                    .await
                    .map_err(|source| ReconcilerError::RemoveFinalizer {
                        key: key.to_string(),
                        source,
                    })?;
                observability::increment_finalizers_removed();
            }
            _ => debug!(referenced, "Finalizer already in desired state"),
        }

        Ok(Action::await_change())
    }
}
