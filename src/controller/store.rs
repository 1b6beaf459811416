//! # Object Store
//!
//! Boundary between the controller and the remote object store.
//!
//! The store speaks [`DynamicObject`] only, which keeps the trait object-safe
//! and lets one implementation serve every kind. Typed access goes through
//! [`get`] and [`list`], which convert with serde.
//!
//! Every object carries its concurrency token in `metadata.resourceVersion`.
//! Writes that carry a stale token fail with [`StoreError::Conflict`].

use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject, TypeMeta};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Namespace and name of an object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Key of an existing object, read from its metadata
    #[must_use]
    pub fn from_object<K: Resource>(obj: &K) -> Self {
        let meta = obj.meta();
        Self {
            namespace: meta.namespace.clone(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{}", namespace, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Errors reported by an [`ObjectStore`], classified once at the source
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: String },
    #[error("conflict writing {kind} {key}: {message}")]
    Conflict {
        kind: String,
        key: String,
        message: String,
    },
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: String, key: String },
    #[error("object conversion failed: {0}")]
    Conversion(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    #[must_use]
    pub fn not_found(resource: &ApiResource, key: &ObjectKey) -> Self {
        Self::NotFound {
            kind: resource.kind.clone(),
            key: key.to_string(),
        }
    }

    #[must_use]
    pub fn conflict(resource: &ApiResource, key: &ObjectKey, message: impl Into<String>) -> Self {
        Self::Conflict {
            kind: resource.kind.clone(),
            key: key.to_string(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn already_exists(resource: &ApiResource, key: &ObjectKey) -> Self {
        Self::AlreadyExists {
            kind: resource.kind.clone(),
            key: key.to_string(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// JSON merge patch guarded by the resourceVersion observed when the
/// patched state was read
#[derive(Debug, Clone, PartialEq)]
pub struct MergePatch {
    pub body: Value,
    pub resource_version: Option<String>,
}

impl MergePatch {
    #[must_use]
    pub fn new(body: Value, resource_version: Option<String>) -> Self {
        Self {
            body,
            resource_version,
        }
    }

    /// Patch body with the resourceVersion written into `metadata`
    ///
    /// The API server rejects the patch with a conflict when the stored
    /// version no longer matches.
    #[must_use]
    pub fn to_body(&self) -> Value {
        let mut body = self.body.clone();
        let Some(resource_version) = &self.resource_version else {
            return body;
        };
        if let Some(fields) = body.as_object_mut() {
            let metadata = fields
                .entry("metadata")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(metadata) = metadata.as_object_mut() {
                metadata.insert(
                    "resourceVersion".to_string(),
                    Value::String(resource_version.clone()),
                );
            }
        }
        body
    }
}

/// Remote object store with optimistic concurrency
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(
        &self,
        resource: &ApiResource,
        key: &ObjectKey,
    ) -> Result<DynamicObject, StoreError>;

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, StoreError>;

    /// Apply a merge patch, failing with a conflict on a stale resourceVersion
    async fn patch(
        &self,
        resource: &ApiResource,
        key: &ObjectKey,
        patch: &MergePatch,
    ) -> Result<DynamicObject, StoreError>;

    /// Replace the object, keyed by the resourceVersion it carries
    async fn update(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    /// Replace only the status subresource
    async fn update_status(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    async fn create(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;
}

/// Concrete object type that can be read and written through an [`ObjectStore`]
pub trait StoreObject:
    Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static
{
    fn api_resource() -> ApiResource {
        ApiResource::erase::<Self>(&())
    }

    fn type_meta() -> TypeMeta {
        TypeMeta {
            api_version: Self::api_version(&()).into_owned(),
            kind: Self::kind(&()).into_owned(),
        }
    }
}

impl<K> StoreObject for K where
    K: Resource<DynamicType = ()>
        + Clone
        + Serialize
        + DeserializeOwned
        + fmt::Debug
        + Send
        + Sync
        + 'static
{
}

/// Convert a typed object into its generic representation
///
/// # Errors
///
/// Returns [`StoreError::Conversion`] if the object does not serialize.
pub fn to_dynamic<K: StoreObject>(obj: &K) -> Result<DynamicObject, StoreError> {
    let mut dynamic: DynamicObject = serde_json::from_value(serde_json::to_value(obj)?)?;
    if dynamic.types.is_none() {
        dynamic.types = Some(K::type_meta());
    }
    Ok(dynamic)
}

/// Convert a generic object into a concrete type
///
/// List items often come back without `apiVersion`/`kind`; they are filled
/// in from `K` before decoding.
///
/// # Errors
///
/// Returns [`StoreError::Conversion`] if the object does not match `K`.
pub fn from_dynamic<K: StoreObject>(mut obj: DynamicObject) -> Result<K, StoreError> {
    if obj.types.is_none() {
        obj.types = Some(K::type_meta());
    }
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Typed get
///
/// # Errors
///
/// Propagates store errors and conversion failures.
pub async fn get<K: StoreObject>(store: &dyn ObjectStore, key: &ObjectKey) -> Result<K, StoreError> {
    let obj = store.get(&K::api_resource(), key).await?;
    from_dynamic(obj)
}

/// Typed list of all objects of kind `K` in a namespace
///
/// # Errors
///
/// Propagates store errors and conversion failures.
pub async fn list<K: StoreObject>(
    store: &dyn ObjectStore,
    namespace: &str,
) -> Result<Vec<K>, StoreError> {
    store
        .list(&K::api_resource(), namespace)
        .await?
        .into_iter()
        .map(from_dynamic)
        .collect()
}
