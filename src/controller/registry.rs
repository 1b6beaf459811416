//! # Kind Registry
//!
//! Maps group/version/kind to the concrete Rust types the controller knows
//! about.
//!
//! Reads of a registered kind decode into the concrete type and back, which
//! normalises the object to the type's schema before it is diffed. Kinds
//! without a registration fall back to the generic [`DynamicObject`].

use crate::controller::store::{self, to_dynamic, ObjectKey, ObjectStore, StoreError, StoreObject};
use crate::crd::ManagedResource;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Reader for one registered kind
#[async_trait]
pub trait TypedKind: Send + Sync {
    fn api_resource(&self) -> ApiResource;

    /// Read the object through its concrete type and return it in generic form
    async fn get(&self, store: &dyn ObjectStore, key: &ObjectKey) -> Result<DynamicObject, StoreError>;
}

struct Registered<K>(PhantomData<fn() -> K>);

#[async_trait]
impl<K: StoreObject> TypedKind for Registered<K> {
    fn api_resource(&self) -> ApiResource {
        K::api_resource()
    }

    async fn get(&self, store: &dyn ObjectStore, key: &ObjectKey) -> Result<DynamicObject, StoreError> {
        let typed: K = store::get(store, key).await?;
        to_dynamic(&typed)
    }
}

#[derive(Clone, Default)]
pub struct KindRegistry {
    kinds: HashMap<GroupVersionKind, Arc<dyn TypedKind>>,
}

impl std::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<String> = self
            .kinds
            .keys()
            .map(|gvk| format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind))
            .collect();
        kinds.sort();
        f.debug_struct("KindRegistry").field("kinds", &kinds).finish()
    }
}

impl KindRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the kinds this controller works with
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register::<Secret>()
            .register::<ConfigMap>()
            .register::<ManagedResource>();
        registry
    }

    pub fn register<K: StoreObject>(&mut self) -> &mut Self {
        let resource = K::api_resource();
        self.kinds
            .insert(gvk_of_resource(&resource), Arc::new(Registered::<K>(PhantomData)));
        self
    }

    #[must_use]
    pub fn lookup(&self, gvk: &GroupVersionKind) -> Option<Arc<dyn TypedKind>> {
        self.kinds.get(gvk).cloned()
    }

    #[must_use]
    pub fn is_registered(&self, gvk: &GroupVersionKind) -> bool {
        self.kinds.contains_key(gvk)
    }

    /// API resource for a kind, guessing the plural for unregistered kinds
    #[must_use]
    pub fn api_resource(&self, gvk: &GroupVersionKind) -> ApiResource {
        self.kinds
            .get(gvk)
            .map_or_else(|| ApiResource::from_gvk(gvk), |kind| kind.api_resource())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Group/version/kind of a generic object, read from its `apiVersion` and `kind`
#[must_use]
pub fn gvk_of(obj: &DynamicObject) -> Option<GroupVersionKind> {
    let types = obj.types.as_ref()?;
    if types.kind.is_empty() || types.api_version.is_empty() {
        return None;
    }
    let (group, version) = types
        .api_version
        .split_once('/')
        .unwrap_or(("", types.api_version.as_str()));
    Some(GroupVersionKind::gvk(group, version, &types.kind))
}

fn gvk_of_resource(resource: &ApiResource) -> GroupVersionKind {
    GroupVersionKind::gvk(&resource.group, &resource.version, &resource.kind)
}
