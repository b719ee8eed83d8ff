//! Ingress reconciliation tests
//!
//! Drives the watch subscription and status reconciler together against the
//! in-memory store, the way the controller binary wires them.
//!
//! Run with: cargo test --test ingress_reconcile_test

#![allow(clippy::expect_used, clippy::panic)]

use control::apis::ingress::resource::INGRESS_CLASS_ANNOTATION;
use control::apis::ingress::schema::NetworkingV1;
use control::apis::ingress::{
    list_owned, subscribe, update_status, IngressEvent, IngressHandlerFns, IngressKey,
    IngressResource, IngressSchema, LoadBalancerEndpoint, MemoryIngressStore, OwnershipPolicy,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

fn ingress(name: &str, class: Option<&str>, host: &str) -> IngressResource {
    let annotations = class.map(|c| {
        let mut annotations = BTreeMap::new();
        annotations.insert(INGRESS_CLASS_ANNOTATION.to_string(), c.to_string());
        annotations
    });

    IngressResource {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            annotations,
            ..Default::default()
        },
        spec: json!({
            "rules": [{
                "host": host,
                "http": {
                    "paths": [{
                        "path": "/",
                        "pathType": "Prefix",
                        "backend": { "service": { "name": "web", "port": { "number": 80 } } }
                    }]
                }
            }]
        }),
        status: vec![],
    }
}

fn seed(store: &MemoryIngressStore, ingress: &IngressResource) {
    store.apply(NetworkingV1.encode(ingress).expect("Should encode Ingress"));
}

/// Subscribes a handler that queues owned Ingresses needing `desired`
fn queue_owned(
    store: &MemoryIngressStore,
    policy: OwnershipPolicy,
    desired: Vec<LoadBalancerEndpoint>,
) -> mpsc::UnboundedReceiver<IngressKey> {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = IngressHandlerFns::from_events(move |event| {
        if let IngressEvent::Deleted(_) = event {
            return;
        }
        if event.resource().status() != desired.as_slice() {
            tx.send(event.resource().key()).expect("receiver alive");
        }
    });
    subscribe(store, Arc::new(NetworkingV1), policy, Arc::new(handler));
    rx
}

#[tokio::test]
async fn test_owned_ingresses_get_published_status() {
    let store = MemoryIngressStore::default();
    let desired = vec![LoadBalancerEndpoint::ip("203.0.113.10")];
    let mut queue = queue_owned(&store, OwnershipPolicy::new("rauta", false), desired.clone());

    seed(&store, &ingress("shop", Some("rauta"), "shop.example.com"));
    seed(&store, &ingress("blog", None, "blog.example.com"));
    seed(&store, &ingress("legacy", Some("nginx"), "legacy.example.com"));

    // Drain the queue like the status worker does; our own writes come back
    // as Updates that already carry the desired status and are not re-queued.
    let mut written = Vec::new();
    while let Ok(key) = queue.try_recv() {
        let updated = update_status(&store, &key, &desired)
            .await
            .expect("Status update should succeed");
        assert_eq!(updated.status, desired);
        written.push(key.name);
    }
    written.sort();

    assert_eq!(written, vec!["blog", "shop"]);
    assert_eq!(store.status_writes(), 2);

    let foreign = store.object("default", "legacy").expect("Should exist");
    assert_eq!(
        foreign.data["status"]["loadBalancer"]["ingress"],
        json!([]),
        "Ingress owned by another controller must not be touched"
    );
    assert_eq!(foreign.metadata.resource_version.as_deref(), Some("3"));
}

#[tokio::test]
async fn test_status_write_preserves_spec() {
    let store = MemoryIngressStore::default();
    let original = ingress("shop", None, "a.com");
    seed(&store, &original);

    let updated = update_status(
        &store,
        &IngressKey::new("default", "shop"),
        &[LoadBalancerEndpoint::ip("1.2.3.4")],
    )
    .await
    .expect("Status update should succeed");

    assert_eq!(updated.hosts(), vec!["a.com"]);
    assert_eq!(updated.spec, original.spec);
    assert_eq!(updated.status, vec![LoadBalancerEndpoint::ip("1.2.3.4")]);
}

#[tokio::test]
async fn test_deleted_between_list_and_update() {
    let store = MemoryIngressStore::default();
    seed(&store, &ingress("shop", None, "a.com"));

    let policy = OwnershipPolicy::new("rauta", false);
    let snapshot = list_owned(&store, &NetworkingV1, &policy);
    assert_eq!(snapshot.len(), 1);

    store.delete("default", "shop");

    let err = update_status(
        &store,
        &snapshot[0].key(),
        &[LoadBalancerEndpoint::ip("1.2.3.4")],
    )
    .await
    .expect_err("Deleted Ingress should not be updated");

    assert!(err.is_not_found(), "got: {}", err);
    assert_eq!(store.status_writes(), 0);
}

#[tokio::test]
async fn test_update_uses_fresh_revision_not_snapshot() {
    let store = MemoryIngressStore::default();
    seed(&store, &ingress("shop", None, "a.com"));

    let policy = OwnershipPolicy::new("rauta", false);
    let stale = list_owned(&store, &NetworkingV1, &policy)
        .pop()
        .expect("Should list Ingress");

    // Another actor edits the spec after our snapshot was taken
    seed(&store, &ingress("shop", None, "b.com"));

    let updated = update_status(&store, &stale.key(), &[LoadBalancerEndpoint::ip("1.2.3.4")])
        .await
        .expect("Re-fetch should avoid a conflict");

    assert_eq!(updated.hosts(), vec!["b.com"]);
    assert_ne!(updated.resource_version(), stale.resource_version());
}

#[test]
fn test_class_change_away_is_not_delivered() {
    let store = MemoryIngressStore::default();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    subscribe(
        &store,
        Arc::new(NetworkingV1),
        OwnershipPolicy::new("rauta", true),
        Arc::new(IngressHandlerFns::from_events(move |event| {
            sink.lock().expect("lock").push(event);
        })),
    );

    seed(&store, &ingress("shop", Some("rauta"), "a.com"));
    seed(&store, &ingress("shop", Some("nginx"), "a.com"));

    let events = events.lock().expect("lock");
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], IngressEvent::Added(_)));
}
