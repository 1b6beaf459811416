//! # ManagedResource Spec
//!
//! A `ManagedResource` bundles objects stored in Secrets of its own
//! namespace. The controller only reads the class and the secret references.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ManagedResource Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: resources.gardener.cloud/v1alpha1
/// kind: ManagedResource
/// metadata:
///   name: monitoring
///   namespace: shoot--dev--core
/// spec:
///   class: seed
///   secretRefs:
///     - name: managedresource-monitoring
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ManagedResource",
    group = "resources.gardener.cloud",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::ManagedResourceStatus",
    shortname = "mr",
    printcolumn = r#"{"name":"Class", "type":"string", "jsonPath":".spec.class"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedResourceSpec {
    /// Resource class; selects the controller instance responsible for this resource
    /// Resources without a class belong to the default class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Secrets in the same namespace holding the objects to manage
    #[serde(default)]
    pub secret_refs: Vec<SecretReference>,
    /// Labels injected into every managed object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inject_labels: Option<BTreeMap<String, String>>,
    /// Keep managed objects when the resource is deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_objects: Option<bool>,
}

/// Reference to a Secret by name within the resource's namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct SecretReference {
    pub name: String,
}

impl SecretReference {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ManagedResourceSpec {
    /// Whether the secret with the given name is referenced
    #[must_use]
    pub fn references_secret(&self, name: &str) -> bool {
        self.secret_refs.iter().any(|r| r.name == name)
    }
}
