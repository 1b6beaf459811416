//! # Retrying Mutator
//!
//! Optimistic-concurrency-safe writes against an [`ObjectStore`].
//!
//! - [`Mutator::ensure_finalizer`] / [`Mutator::delete_finalizer`] send a
//!   single merge patch guarded by the fetched resourceVersion. Conflicts are
//!   returned to the caller, which requeues the whole reconciliation.
//! - [`Mutator::try_update`] / [`Mutator::try_update_status`] re-read,
//!   transform and write in a loop, backing off between conflicting attempts.
//! - [`Mutator::typed_create_or_update`] creates or updates a generic object,
//!   reading it through its concrete type when the kind is registered.
//!
//! Every store call and every backoff sleep races against a
//! [`CancellationSignal`].

use crate::controller::backoff::{Backoff, RetryPolicy};
use crate::controller::cancel::CancellationSignal;
use crate::controller::registry::{gvk_of, KindRegistry};
use crate::controller::store::{
    self, from_dynamic, to_dynamic, MergePatch, ObjectKey, ObjectStore, StoreError, StoreObject,
};
use crate::observability::metrics;
use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject};
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Sleeps between retry attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Outcome of [`Mutator::typed_create_or_update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// The stored object already matched
    None,
    Created,
    Updated,
}

impl OperationResult {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "unchanged",
            Self::Created => "created",
            Self::Updated => "updated",
        }
    }
}

impl std::fmt::Display for OperationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum MutatorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("transforming {key} failed: {source}")]
    Transform {
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("updating {key} still conflicted after {steps} attempts")]
    DeadlineExceeded { key: String, steps: u32 },
    #[error("operation on {key} was canceled")]
    Canceled { key: String },
    #[error("unsupported object: {0}")]
    UnsupportedObject(String),
}

impl MutatorError {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_conflict())
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_not_found())
    }

    fn transform(key: &ObjectKey, source: anyhow::Error) -> Self {
        Self::Transform {
            key: key.to_string(),
            source,
        }
    }
}

impl From<serde_json::Error> for MutatorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(StoreError::Conversion(err))
    }
}

#[must_use]
pub fn has_finalizer(obj: &DynamicObject, finalizer: &str) -> bool {
    obj.metadata
        .finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == finalizer))
}

#[derive(Debug, Clone, Copy)]
enum WriteTarget {
    Object,
    Status,
}

#[derive(Clone)]
pub struct Mutator {
    store: Arc<dyn ObjectStore>,
    sleeper: Arc<dyn Sleeper>,
    registry: Arc<KindRegistry>,
}

impl std::fmt::Debug for Mutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutator")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Mutator {
    /// Mutator sleeping on the tokio timer and knowing the built-in kinds
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            sleeper: Arc::new(TokioSleeper),
            registry: Arc::new(KindRegistry::with_defaults()),
        }
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Arc<KindRegistry>) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Typed get, abandoned when `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns the store error, or [`MutatorError::Canceled`].
    pub async fn get<K: StoreObject>(
        &self,
        cancel: &CancellationSignal,
        key: &ObjectKey,
    ) -> Result<K, MutatorError> {
        self.guarded(cancel, key, store::get::<K>(self.store.as_ref(), key))
            .await
    }

    /// Typed list of a namespace, abandoned when `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns the store error, or [`MutatorError::Canceled`].
    pub async fn list<K: StoreObject>(
        &self,
        cancel: &CancellationSignal,
        namespace: &str,
    ) -> Result<Vec<K>, MutatorError> {
        let key = ObjectKey::new(namespace, "*");
        self.guarded(cancel, &key, store::list::<K>(self.store.as_ref(), namespace))
            .await
    }

    /// Add `finalizer` to the object unless it is already present
    ///
    /// # Errors
    ///
    /// Fails if the object cannot be read (including when it does not exist)
    /// or if the patch is rejected. A conflicting write is not retried.
    pub async fn ensure_finalizer<K: StoreObject>(
        &self,
        cancel: &CancellationSignal,
        key: &ObjectKey,
        finalizer: &str,
    ) -> Result<(), MutatorError> {
        let resource = K::api_resource();
        let obj = self.guarded(cancel, key, self.store.get(&resource, key)).await?;
        if has_finalizer(&obj, finalizer) {
            return Ok(());
        }

        let mut finalizers = obj.metadata.finalizers.clone().unwrap_or_default();
        finalizers.push(finalizer.to_string());
        let patch = MergePatch::new(
            json!({ "metadata": { "finalizers": finalizers } }),
            obj.metadata.resource_version.clone(),
        );

        debug!(kind = %resource.kind, key = %key, finalizer, "Adding finalizer");
        self.patch(cancel, &resource, key, &patch).await
    }

    /// Remove `finalizer` from the object if present
    ///
    /// An object that is already gone counts as done.
    ///
    /// # Errors
    ///
    /// Fails if the read or the patch fails for any reason but absence. A
    /// conflicting write is not retried.
    pub async fn delete_finalizer<K: StoreObject>(
        &self,
        cancel: &CancellationSignal,
        key: &ObjectKey,
        finalizer: &str,
    ) -> Result<(), MutatorError> {
        let resource = K::api_resource();
        let obj = match self.guarded(cancel, key, self.store.get(&resource, key)).await {
            Ok(obj) => obj,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        };
        if !has_finalizer(&obj, finalizer) {
            return Ok(());
        }

        let remaining: Vec<String> = obj
            .metadata
            .finalizers
            .iter()
            .flatten()
            .filter(|f| *f != finalizer)
            .cloned()
            .collect();
        let finalizers = if remaining.is_empty() {
            Value::Null
        } else {
            json!(remaining)
        };
        let patch = MergePatch::new(
            json!({ "metadata": { "finalizers": finalizers } }),
            obj.metadata.resource_version.clone(),
        );

        debug!(kind = %resource.kind, key = %key, finalizer, "Removing finalizer");
        match self.patch(cancel, &resource, key, &patch).await {
            Err(err) if err.is_not_found() => Ok(()),
            result => result,
        }
    }

    /// Read the object, apply `transform` and write it back, retrying on
    /// conflicts according to `policy`
    ///
    /// Nothing is written when the transform leaves the object unchanged.
    ///
    /// # Errors
    ///
    /// - [`MutatorError::Transform`] if the transform fails (never retried)
    /// - [`MutatorError::DeadlineExceeded`] once `policy.steps` attempts conflicted
    /// - [`MutatorError::Canceled`] if `cancel` fires
    /// - [`MutatorError::Store`] for any other store failure
    pub async fn try_update<K, F>(
        &self,
        cancel: &CancellationSignal,
        policy: &RetryPolicy,
        key: &ObjectKey,
        transform: F,
    ) -> Result<K, MutatorError>
    where
        K: StoreObject,
        F: FnMut(&mut K) -> anyhow::Result<()> + Send,
    {
        self.update_loop(cancel, policy, key, transform, WriteTarget::Object)
            .await
    }

    /// Like [`Mutator::try_update`], writing through the status subresource
    ///
    /// # Errors
    ///
    /// Same as [`Mutator::try_update`].
    pub async fn try_update_status<K, F>(
        &self,
        cancel: &CancellationSignal,
        policy: &RetryPolicy,
        key: &ObjectKey,
        transform: F,
    ) -> Result<K, MutatorError>
    where
        K: StoreObject,
        F: FnMut(&mut K) -> anyhow::Result<()> + Send,
    {
        self.update_loop(cancel, policy, key, transform, WriteTarget::Status)
            .await
    }

    /// Create `obj` if it does not exist, otherwise update it
    ///
    /// The kind comes from the object's `apiVersion` and `kind`. Registered
    /// kinds are read through their concrete type, anything else as a
    /// generic object. On return `obj` holds the stored state.
    ///
    /// # Errors
    ///
    /// - [`MutatorError::UnsupportedObject`] if the object has no kind
    /// - [`MutatorError::Transform`] if `mutate` fails
    /// - [`MutatorError::Canceled`] if `cancel` fires
    /// - [`MutatorError::Store`] for store failures, conflicts included
    pub async fn typed_create_or_update<F>(
        &self,
        cancel: &CancellationSignal,
        obj: &mut DynamicObject,
        always_update: bool,
        mutate: F,
    ) -> Result<OperationResult, MutatorError>
    where
        F: FnOnce(&mut DynamicObject) -> anyhow::Result<()> + Send,
    {
        let key = ObjectKey::from_object(&*obj);
        let Some(gvk) = gvk_of(obj) else {
            return Err(MutatorError::UnsupportedObject(format!(
                "{key} has no apiVersion or kind"
            )));
        };
        let resource = self.registry.api_resource(&gvk);

        let existing = match self.registry.lookup(&gvk) {
            Some(kind) => {
                self.guarded(cancel, &key, kind.get(self.store.as_ref(), &key))
                    .await
            }
            None => {
                debug!(kind = %gvk.kind, key = %key, "Kind not registered, reading generic object");
                self.guarded(cancel, &key, self.store.get(&resource, &key))
                    .await
            }
        };

        let current = match existing {
            Ok(current) => current,
            Err(err) if err.is_not_found() => {
                mutate(obj).map_err(|source| MutatorError::transform(&key, source))?;
                let created = self
                    .guarded(cancel, &key, self.store.create(&resource, obj))
                    .await?;
                *obj = created;
                debug!(kind = %gvk.kind, key = %key, "Created object");
                return Ok(OperationResult::Created);
            }
            Err(err) => return Err(err),
        };

        let before = serde_json::to_value(&current)?;
        *obj = current;
        mutate(obj).map_err(|source| MutatorError::transform(&key, source))?;
        if !always_update && serde_json::to_value(&*obj)? == before {
            return Ok(OperationResult::None);
        }

        let updated = self
            .guarded(cancel, &key, self.store.update(&resource, obj))
            .await
            .inspect_err(|err| record_conflict(&resource, err))?;
        *obj = updated;
        debug!(kind = %gvk.kind, key = %key, "Updated object");
        Ok(OperationResult::Updated)
    }

    async fn update_loop<K, F>(
        &self,
        cancel: &CancellationSignal,
        policy: &RetryPolicy,
        key: &ObjectKey,
        mut transform: F,
        target: WriteTarget,
    ) -> Result<K, MutatorError>
    where
        K: StoreObject,
        F: FnMut(&mut K) -> anyhow::Result<()> + Send,
    {
        let resource = K::api_resource();
        let mut backoff = Backoff::new(policy);

        while backoff.start_attempt() {
            let current = self.guarded(cancel, key, self.store.get(&resource, key)).await?;
            let mut obj: K = from_dynamic(current)?;
            let before = snapshot(&obj)?;

            transform(&mut obj).map_err(|source| MutatorError::transform(key, source))?;
            if snapshot(&obj)? == before {
                return Ok(obj);
            }

            let updated = to_dynamic(&obj)?;
            let write = match target {
                WriteTarget::Object => self.store.update(&resource, &updated),
                WriteTarget::Status => self.store.update_status(&resource, &updated),
            };
            match self.guarded(cancel, key, write).await {
                Ok(written) => return Ok(from_dynamic(written)?),
                Err(err) if err.is_conflict() => {
                    record_conflict(&resource, &err);
                    let Some(delay) = backoff.next_delay() else {
                        break;
                    };
                    debug!(kind = %resource.kind, key = %key, ?delay, "Update conflicted, backing off");
                    if cancel.run(self.sleeper.sleep(delay)).await.is_none() {
                        return Err(MutatorError::Canceled {
                            key: key.to_string(),
                        });
                    }
                }
                Err(err) => return Err(err),
            }
        }

        warn!(kind = %resource.kind, key = %key, steps = policy.steps, "Giving up on conflicting update");
        Err(MutatorError::DeadlineExceeded {
            key: key.to_string(),
            steps: policy.steps,
        })
    }

    async fn patch(
        &self,
        cancel: &CancellationSignal,
        resource: &ApiResource,
        key: &ObjectKey,
        patch: &MergePatch,
    ) -> Result<(), MutatorError> {
        self.guarded(cancel, key, self.store.patch(resource, key, patch))
            .await
            .inspect_err(|err| record_conflict(resource, err))?;
        Ok(())
    }

    /// Await a store call unless `cancel` fires first
    async fn guarded<T, Fut>(
        &self,
        cancel: &CancellationSignal,
        key: &ObjectKey,
        fut: Fut,
    ) -> Result<T, MutatorError>
    where
        Fut: Future<Output = Result<T, StoreError>>,
    {
        match cancel.run(fut).await {
            Some(result) => Ok(result?),
            None => Err(MutatorError::Canceled {
                key: key.to_string(),
            }),
        }
    }
}

fn record_conflict(resource: &ApiResource, err: &MutatorError) {
    if err.is_conflict() {
        metrics::increment_update_conflicts(&resource.kind);
    }
}

fn snapshot<K: Serialize>(obj: &K) -> Result<Value, MutatorError> {
    Ok(serde_json::to_value(obj)?)
}
