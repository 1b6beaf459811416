//! # Create-or-Update Tests
//!
//! Tests for `Mutator::typed_create_or_update` with registered and
//! unregistered kinds.

mod common;

use common::{FakeStore, Op, NAMESPACE};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use managed_resource_controller::controller::cancel::CancellationSignal;
use managed_resource_controller::controller::mutator::{Mutator, MutatorError, OperationResult};
use managed_resource_controller::controller::registry::KindRegistry;
use managed_resource_controller::controller::store::StoreObject;
use serde_json::{json, Value};
use std::sync::Arc;

fn dynamic(value: Value) -> DynamicObject {
    serde_json::from_value(value).unwrap()
}

fn config_map_object() -> DynamicObject {
    dynamic(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": "settings", "namespace": NAMESPACE}
    }))
}

fn widget_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk("example.com", "v1", "Widget"))
}

fn widget_object() -> DynamicObject {
    dynamic(json!({
        "apiVersion": "example.com/v1",
        "kind": "Widget",
        "metadata": {"name": "gadget", "namespace": NAMESPACE}
    }))
}

fn set_data(value: &'static str) -> impl FnOnce(&mut DynamicObject) -> anyhow::Result<()> + Send {
    move |obj: &mut DynamicObject| {
        obj.data["data"] = json!({ "key": value });
        Ok(())
    }
}

#[tokio::test]
async fn test_creates_missing_object() {
    let store = Arc::new(FakeStore::new());
    let mutator = Mutator::new(store.clone());
    let mut obj = config_map_object();

    let result = mutator
        .typed_create_or_update(&CancellationSignal::never(), &mut obj, false, set_data("v1"))
        .await
        .unwrap();

    assert_eq!(result, OperationResult::Created);
    assert_eq!(store.calls(Op::Create), 1);
    assert!(obj.metadata.resource_version.is_some());
    let stored: ConfigMap = store.object(NAMESPACE, "settings").unwrap();
    assert_eq!(stored.data.unwrap()["key"], "v1");
}

#[tokio::test]
async fn test_updates_changed_object() {
    let store = Arc::new(FakeStore::new());
    store.insert_value(
        &ConfigMap::api_resource(),
        json!({
            "metadata": {"name": "settings", "namespace": NAMESPACE},
            "data": {"key": "v1"}
        }),
    );
    let mutator = Mutator::new(store.clone());
    let mut obj = config_map_object();

    let result = mutator
        .typed_create_or_update(&CancellationSignal::never(), &mut obj, false, set_data("v2"))
        .await
        .unwrap();

    assert_eq!(result, OperationResult::Updated);
    assert_eq!(store.calls(Op::Update), 1);
    let stored: ConfigMap = store.object(NAMESPACE, "settings").unwrap();
    assert_eq!(stored.data.unwrap()["key"], "v2");
    assert_eq!(obj.metadata.resource_version, stored.metadata.resource_version);
}

#[tokio::test]
async fn test_unchanged_object_is_not_written() {
    let store = Arc::new(FakeStore::new());
    store.insert_value(
        &ConfigMap::api_resource(),
        json!({
            "metadata": {"name": "settings", "namespace": NAMESPACE},
            "data": {"key": "v1"}
        }),
    );
    let mutator = Mutator::new(store.clone());
    let mut obj = config_map_object();

    let result = mutator
        .typed_create_or_update(&CancellationSignal::never(), &mut obj, false, set_data("v1"))
        .await
        .unwrap();

    assert_eq!(result, OperationResult::None);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_always_update_writes_unchanged_object() {
    let store = Arc::new(FakeStore::new());
    store.insert_value(
        &ConfigMap::api_resource(),
        json!({
            "metadata": {"name": "settings", "namespace": NAMESPACE},
            "data": {"key": "v1"}
        }),
    );
    let mutator = Mutator::new(store.clone());
    let mut obj = config_map_object();

    let result = mutator
        .typed_create_or_update(&CancellationSignal::never(), &mut obj, true, set_data("v1"))
        .await
        .unwrap();

    assert_eq!(result, OperationResult::Updated);
    assert_eq!(store.calls(Op::Update), 1);
}

#[tokio::test]
async fn test_unregistered_kind_uses_generic_object() {
    let store = Arc::new(FakeStore::new());
    store.insert_value(
        &widget_resource(),
        json!({
            "metadata": {"name": "gadget", "namespace": NAMESPACE},
            "spec": {"size": 1}
        }),
    );
    let mutator = Mutator::new(store.clone()).with_registry(Arc::new(KindRegistry::with_defaults()));
    let mut obj = widget_object();

    let result = mutator
        .typed_create_or_update(&CancellationSignal::never(), &mut obj, false, |obj| {
            obj.data["spec"]["size"] = json!(3);
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(result, OperationResult::Updated);
    let stored = store.value(&widget_resource(), NAMESPACE, "gadget").unwrap();
    assert_eq!(stored["spec"]["size"], 3);
}

#[tokio::test]
async fn test_unregistered_kind_is_created() {
    let store = Arc::new(FakeStore::new());
    let mutator = Mutator::new(store.clone());
    let mut obj = widget_object();

    let result = mutator
        .typed_create_or_update(&CancellationSignal::never(), &mut obj, false, |obj| {
            obj.data["spec"] = json!({"size": 1});
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(result, OperationResult::Created);
    assert!(store.value(&widget_resource(), NAMESPACE, "gadget").is_some());
}

#[tokio::test]
async fn test_object_without_kind_is_rejected() {
    let store = Arc::new(FakeStore::new());
    let mutator = Mutator::new(store.clone());
    let mut obj = dynamic(json!({"metadata": {"name": "nameless", "namespace": NAMESPACE}}));

    let err = mutator
        .typed_create_or_update(&CancellationSignal::never(), &mut obj, false, |_| Ok(()))
        .await
        .unwrap_err();

    assert!(matches!(err, MutatorError::UnsupportedObject(_)));
    assert_eq!(store.calls(Op::Get), 0);
}

#[tokio::test]
async fn test_mutate_error_prevents_create() {
    let store = Arc::new(FakeStore::new());
    let mutator = Mutator::new(store.clone());
    let mut obj = config_map_object();

    let err = mutator
        .typed_create_or_update(&CancellationSignal::never(), &mut obj, false, |_| {
            Err(anyhow::anyhow!("cannot render"))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, MutatorError::Transform { .. }));
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_read_errors_are_surfaced() {
    let store = Arc::new(FakeStore::new());
    store.fail_always(Op::Get, "apiserver unavailable");
    let mutator = Mutator::new(store.clone());
    let mut obj = config_map_object();

    let err = mutator
        .typed_create_or_update(&CancellationSignal::never(), &mut obj, false, set_data("v1"))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("apiserver unavailable"));
    assert_eq!(store.writes(), 0);
}
