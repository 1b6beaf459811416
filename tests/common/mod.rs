//! Shared test fixtures: an in-memory object store with optimistic locking,
//! fault injection and call counters, plus a recording sleeper.

#![allow(dead_code, reason = "not every test binary uses every helper")]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{ApiResource, DynamicObject, ObjectMeta};
use managed_resource_controller::controller::cancel::CancellationHandle;
use managed_resource_controller::controller::mutator::Sleeper;
use managed_resource_controller::controller::store::{
    from_dynamic, to_dynamic, MergePatch, ObjectKey, ObjectStore, StoreError, StoreObject,
};
use managed_resource_controller::crd::{ManagedResource, ManagedResourceSpec, SecretReference};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

pub const NAMESPACE: &str = "mr-ns";
pub const SECRET_NAME: &str = "mr-secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    List,
    Patch,
    Update,
    UpdateStatus,
    Create,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, Value>,
    resource_version: u64,
    next_faults: HashMap<Op, VecDeque<StoreError>>,
    persistent_faults: HashMap<Op, String>,
    calls: HashMap<Op, usize>,
    patches: Vec<Value>,
}

impl State {
    fn bump(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn enter(&mut self, op: Op) -> Result<(), StoreError> {
        *self.calls.entry(op).or_default() += 1;
        if let Some(err) = self.next_faults.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        if let Some(message) = self.persistent_faults.get(&op) {
            return Err(StoreError::Other(message.clone()));
        }
        Ok(())
    }
}

/// In-memory [`ObjectStore`] keyed by plural, namespace and name
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

fn storage_key(resource: &ApiResource, key: &ObjectKey) -> String {
    format!(
        "{}/{}/{}",
        resource.plural,
        key.namespace.as_deref().unwrap_or_default(),
        key.name
    )
}

fn key_of(obj: &Value) -> ObjectKey {
    let metadata = &obj["metadata"];
    ObjectKey {
        namespace: metadata["namespace"].as_str().map(str::to_string),
        name: metadata["name"].as_str().unwrap_or_default().to_string(),
    }
}

fn resource_version_of(obj: &Value) -> Option<&str> {
    obj["metadata"]["resourceVersion"].as_str()
}

fn set_resource_version(obj: &mut Value, resource_version: String) {
    obj["metadata"]["resourceVersion"] = Value::String(resource_version);
}

fn set_types(obj: &mut Value, resource: &ApiResource) {
    if obj.get("apiVersion").is_none() {
        obj["apiVersion"] = Value::String(resource.api_version.clone());
    }
    if obj.get("kind").is_none() {
        obj["kind"] = Value::String(resource.kind.clone());
    }
}

/// JSON merge patch (RFC 7396)
fn merge(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(target_fields) = target else {
        return;
    };
    for (field, value) in fields {
        if value.is_null() {
            target_fields.remove(field);
        } else {
            merge(target_fields.entry(field.clone()).or_insert(Value::Null), value);
        }
    }
}

fn to_object(value: Value) -> Result<DynamicObject, StoreError> {
    Ok(serde_json::from_value(value)?)
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a typed object, assigning a fresh resourceVersion
    pub fn insert<K: StoreObject>(&self, obj: &K) {
        let value = serde_json::to_value(to_dynamic(obj).unwrap()).unwrap();
        self.insert_value(&K::api_resource(), value);
    }

    /// Store a raw object of any kind
    pub fn insert_value(&self, resource: &ApiResource, mut value: Value) {
        let mut state = self.state.lock().unwrap();
        set_types(&mut value, resource);
        let resource_version = state.bump();
        set_resource_version(&mut value, resource_version);
        let key = storage_key(resource, &key_of(&value));
        state.objects.insert(key, value);
    }

    pub fn object<K: StoreObject>(&self, namespace: &str, name: &str) -> Option<K> {
        self.value(&K::api_resource(), namespace, name)
            .map(|value| from_dynamic(serde_json::from_value(value).unwrap()).unwrap())
    }

    pub fn value(&self, resource: &ApiResource, namespace: &str, name: &str) -> Option<Value> {
        let key = storage_key(resource, &ObjectKey::new(namespace, name));
        self.state.lock().unwrap().objects.get(&key).cloned()
    }

    /// Simulate a concurrent writer by bumping the stored resourceVersion
    pub fn touch<K: StoreObject>(&self, namespace: &str, name: &str) {
        let key = storage_key(&K::api_resource(), &ObjectKey::new(namespace, name));
        let mut state = self.state.lock().unwrap();
        let resource_version = state.bump();
        if let Some(obj) = state.objects.get_mut(&key) {
            set_resource_version(obj, resource_version);
        }
    }

    /// Fail the next call of `op` with `err`; queued errors are used in order
    pub fn fail_next(&self, op: Op, err: StoreError) {
        self.state
            .lock()
            .unwrap()
            .next_faults
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Fail every call of `op` with a generic error carrying `message`
    pub fn fail_always(&self, op: Op, message: &str) {
        self.state
            .lock()
            .unwrap()
            .persistent_faults
            .insert(op, message.to_string());
    }

    pub fn calls(&self, op: Op) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(&op)
            .copied()
            .unwrap_or_default()
    }

    /// Calls of all writing operations
    pub fn writes(&self) -> usize {
        [Op::Patch, Op::Update, Op::UpdateStatus, Op::Create]
            .into_iter()
            .map(|op| self.calls(op))
            .sum()
    }

    /// Bodies of all patches received, including rejected ones
    pub fn patches(&self) -> Vec<Value> {
        self.state.lock().unwrap().patches.clone()
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn get(
        &self,
        resource: &ApiResource,
        key: &ObjectKey,
    ) -> Result<DynamicObject, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.enter(Op::Get)?;
        let value = state
            .objects
            .get(&storage_key(resource, key))
            .cloned()
            .ok_or_else(|| StoreError::not_found(resource, key))?;
        to_object(value)
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.enter(Op::List)?;
        let prefix = format!("{}/{}/", resource.plural, namespace);
        state
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, value)| to_object(value.clone()))
            .collect()
    }

    async fn patch(
        &self,
        resource: &ApiResource,
        key: &ObjectKey,
        patch: &MergePatch,
    ) -> Result<DynamicObject, StoreError> {
        let mut state = self.state.lock().unwrap();
        let body = patch.to_body();
        state.patches.push(body.clone());
        state.enter(Op::Patch)?;

        let storage = storage_key(resource, key);
        let stored = state
            .objects
            .get(&storage)
            .cloned()
            .ok_or_else(|| StoreError::not_found(resource, key))?;
        if let Some(expected) = resource_version_of(&body) {
            if resource_version_of(&stored) != Some(expected) {
                return Err(StoreError::conflict(resource, key, "resourceVersion mismatch"));
            }
        }

        let mut updated = stored;
        merge(&mut updated, &body);
        let resource_version = state.bump();
        set_resource_version(&mut updated, resource_version);
        state.objects.insert(storage, updated.clone());
        to_object(updated)
    }

    async fn update(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.enter(Op::Update)?;
        let mut value = serde_json::to_value(obj)?;
        let key = key_of(&value);
        let storage = storage_key(resource, &key);
        let stored = state
            .objects
            .get(&storage)
            .cloned()
            .ok_or_else(|| StoreError::not_found(resource, &key))?;
        if let Some(expected) = resource_version_of(&value) {
            if resource_version_of(&stored) != Some(expected) {
                return Err(StoreError::conflict(resource, &key, "resourceVersion mismatch"));
            }
        }

        // Status is only written through the status subresource
        match stored.get("status") {
            Some(status) => value["status"] = status.clone(),
            None => {
                if let Some(fields) = value.as_object_mut() {
                    fields.remove("status");
                }
            }
        }
        set_types(&mut value, resource);
        let resource_version = state.bump();
        set_resource_version(&mut value, resource_version);
        state.objects.insert(storage, value.clone());
        to_object(value)
    }

    async fn update_status(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.enter(Op::UpdateStatus)?;
        let value = serde_json::to_value(obj)?;
        let key = key_of(&value);
        let storage = storage_key(resource, &key);
        let mut stored = state
            .objects
            .get(&storage)
            .cloned()
            .ok_or_else(|| StoreError::not_found(resource, &key))?;
        if let Some(expected) = resource_version_of(&value) {
            if resource_version_of(&stored) != Some(expected) {
                return Err(StoreError::conflict(resource, &key, "resourceVersion mismatch"));
            }
        }

        stored["status"] = value.get("status").cloned().unwrap_or(Value::Null);
        let resource_version = state.bump();
        set_resource_version(&mut stored, resource_version);
        state.objects.insert(storage, stored.clone());
        to_object(stored)
    }

    async fn create(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.enter(Op::Create)?;
        let mut value = serde_json::to_value(obj)?;
        let key = key_of(&value);
        let storage = storage_key(resource, &key);
        if state.objects.contains_key(&storage) {
            return Err(StoreError::already_exists(resource, &key));
        }

        set_types(&mut value, resource);
        let resource_version = state.bump();
        set_resource_version(&mut value, resource_version);
        state.objects.insert(storage, value.clone());
        to_object(value)
    }
}

/// Sleeper that records requested delays without waiting
///
/// When armed with a cancellation handle it fires the handle on the first
/// sleep and then never wakes up.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
    cancel_on_sleep: Option<CancellationHandle>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling(handle: CancellationHandle) -> Self {
        Self {
            delays: Mutex::default(),
            cancel_on_sleep: Some(handle),
        }
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
        if let Some(handle) = &self.cancel_on_sleep {
            handle.cancel();
            std::future::pending::<()>().await;
        }
    }
}

pub fn secret(namespace: &str, name: &str, finalizers: &[&str]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            namespace: Some(namespace.to_string()),
            name: Some(name.to_string()),
            finalizers: if finalizers.is_empty() {
                None
            } else {
                Some(finalizers.iter().map(|f| (*f).to_string()).collect())
            },
            ..ObjectMeta::default()
        },
        ..Secret::default()
    }
}

pub fn managed_resource(
    namespace: &str,
    name: &str,
    class: Option<&str>,
    secret_refs: &[&str],
) -> ManagedResource {
    let mut mr = ManagedResource::new(
        name,
        ManagedResourceSpec {
            class: class.map(str::to_string),
            secret_refs: secret_refs.iter().map(|r| SecretReference::new(*r)).collect(),
            ..ManagedResourceSpec::default()
        },
    );
    mr.metadata.namespace = Some(namespace.to_string());
    mr
}

pub fn finalizers_of(secret: &Secret) -> Vec<String> {
    secret.metadata.finalizers.clone().unwrap_or_default()
}
