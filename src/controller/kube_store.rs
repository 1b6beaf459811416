//! # Kubernetes Store
//!
//! [`ObjectStore`] backed by the Kubernetes API server through
//! `kube::Api<DynamicObject>`.

use crate::constants::FIELD_MANAGER;
use crate::controller::store::{MergePatch, ObjectKey, ObjectStore, StoreError};
use async_trait::async_trait;
use kube::api::{Api, ApiResource, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::{json, Map, Value};
use tracing::debug;

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        }
    }
}

/// Map a kube error onto the store taxonomy
fn classify(err: kube::Error, resource: &ApiResource, key: &ObjectKey) -> StoreError {
    match err {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::not_found(resource, key),
        kube::Error::Api(api_err) if api_err.code == 409 && api_err.reason == "AlreadyExists" => {
            StoreError::already_exists(resource, key)
        }
        kube::Error::Api(api_err) if api_err.code == 409 => {
            StoreError::conflict(resource, key, api_err.message.clone())
        }
        other => StoreError::Other(format!(
            "{} {} request failed: {}",
            resource.kind, key, other
        )),
    }
}

fn key_of(obj: &DynamicObject) -> ObjectKey {
    ObjectKey {
        namespace: obj.metadata.namespace.clone(),
        name: obj.metadata.name.clone().unwrap_or_default(),
    }
}

/// Merge patch that replaces the status of `current` with the status of `obj`
///
/// Top-level status fields missing from the new status are nulled so the
/// result matches a replacement. The patch carries the resourceVersion of
/// `obj` to keep the write optimistic.
fn status_replacement(obj: &DynamicObject) -> MergePatch {
    let status = obj.data.get("status").cloned().unwrap_or(Value::Null);
    MergePatch::new(json!({ "status": status }), obj.metadata.resource_version.clone())
}

fn null_removed_fields(previous: &Value, patch: &mut Value) {
    let (Some(previous), Some(next)) = (previous.as_object(), patch.as_object_mut()) else {
        return;
    };
    let removed: Map<String, Value> = previous
        .keys()
        .filter(|field| !next.contains_key(*field))
        .map(|field| (field.clone(), Value::Null))
        .collect();
    next.extend(removed);
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(
        &self,
        resource: &ApiResource,
        key: &ObjectKey,
    ) -> Result<DynamicObject, StoreError> {
        self.api(resource, key.namespace.as_deref())
            .get(&key.name)
            .await
            .map_err(|e| classify(e, resource, key))
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let list = self
            .api(resource, Some(namespace))
            .list(&ListParams::default())
            .await
            .map_err(|e| StoreError::Other(format!("listing {} in {}: {}", resource.plural, namespace, e)))?;
        Ok(list.items)
    }

    async fn patch(
        &self,
        resource: &ApiResource,
        key: &ObjectKey,
        patch: &MergePatch,
    ) -> Result<DynamicObject, StoreError> {
        let body = patch.to_body();
        debug!(kind = %resource.kind, key = %key, "Sending merge patch");
        self.api(resource, key.namespace.as_deref())
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(&body))
            .await
            .map_err(|e| classify(e, resource, key))
    }

    async fn update(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let key = key_of(obj);
        self.api(resource, key.namespace.as_deref())
            .replace(&key.name, &Self::post_params(), obj)
            .await
            .map_err(|e| classify(e, resource, &key))
    }

    async fn update_status(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let key = key_of(obj);
        let api = self.api(resource, key.namespace.as_deref());
        let current = api
            .get_status(&key.name)
            .await
            .map_err(|e| classify(e, resource, &key))?;

        let patch = status_replacement(obj);
        let mut body = patch.to_body();
        if let (Some(previous), Some(next)) = (current.data.get("status"), body.get_mut("status")) {
            null_removed_fields(previous, next);
        }

        api.patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&body))
            .await
            .map_err(|e| classify(e, resource, &key))
    }

    async fn create(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let key = key_of(obj);
        self.api(resource, key.namespace.as_deref())
            .create(&Self::post_params(), obj)
            .await
            .map_err(|e| classify(e, resource, &key))
    }
}
