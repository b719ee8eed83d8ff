//! Authoritative Ingress reads and status writes
//!
//! `IngressStore` is the read/write seam used by the status reconciler.
//! Implementations must read from the authoritative path (never an informer
//! cache) and must reject a status write whose `resourceVersion` is stale.
//!
//! - `KubeIngressStore`: Kubernetes API server (status subresource PUT)
//! - `MemoryIngressStore`: in-process store and informer for tests

use super::informer::{IngressInformer, Listener, Notification};
use super::resource::{IngressKey, IngressResource};
use super::schema::{IngressSchema, NetworkingV1};
use crate::error::StoreError;
use async_trait::async_trait;
use kube::api::PostParams;
use kube::core::DynamicObject;
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

/// Store read/write API consumed by the status reconciler
#[async_trait]
pub trait IngressStore: Send + Sync {
    /// Fetch the current revision of an Ingress
    async fn get(&self, namespace: &str, name: &str) -> Result<IngressResource, StoreError>;

    /// Write the status of `ingress`, conditional on its `resourceVersion`.
    ///
    /// Only the status sub-object is persisted. Returns the stored object with
    /// its new revision.
    async fn update_status(
        &self,
        ingress: &IngressResource,
    ) -> Result<IngressResource, StoreError>;
}

/// Map API errors onto the store error kinds
fn classify(err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(ref ae) if ae.code == 404 => StoreError::NotFound,
        kube::Error::Api(ref ae) if ae.code == 409 => StoreError::Conflict,
        other => StoreError::Kube(other),
    }
}

/// Ingress store backed by the Kubernetes API server
pub struct KubeIngressStore {
    client: Client,
    schema: Arc<dyn IngressSchema>,
}

impl KubeIngressStore {
    pub fn new(client: Client, schema: Arc<dyn IngressSchema>) -> Self {
        Self { client, schema }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.schema.api_resource())
    }

    fn decode(&self, obj: &DynamicObject) -> Result<IngressResource, StoreError> {
        self.schema.decode(obj).ok_or_else(|| {
            StoreError::Malformed(format!(
                "{}/{} is not a {} Ingress",
                obj.metadata.namespace.as_deref().unwrap_or_default(),
                obj.metadata.name.as_deref().unwrap_or_default(),
                self.schema.api_resource().api_version
            ))
        })
    }
}

#[async_trait]
impl IngressStore for KubeIngressStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<IngressResource, StoreError> {
        let obj = self.api(namespace).get(name).await.map_err(classify)?;
        self.decode(&obj)
    }

    async fn update_status(
        &self,
        ingress: &IngressResource,
    ) -> Result<IngressResource, StoreError> {
        let obj = self.schema.encode(ingress)?;
        let data = serde_json::to_vec(&obj)?;

        let updated = self
            .api(ingress.namespace())
            .replace_status(ingress.name(), &PostParams::default(), data)
            .await
            .map_err(classify)?;
        self.decode(&updated)
    }
}

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<IngressKey, DynamicObject>,
    revision: u64,
}

impl MemoryState {
    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }
}

fn key_of(obj: &DynamicObject) -> IngressKey {
    IngressKey::new(
        obj.metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string()),
        obj.metadata.name.clone().unwrap_or_default(),
    )
}

/// In-memory Ingress store with informer semantics
///
/// Every mutation bumps a store-wide revision counter and is announced to
/// listeners in mutation order. Listeners must not mutate the store from
/// inside the callback.
pub struct MemoryIngressStore {
    schema: Arc<dyn IngressSchema>,
    state: RwLock<MemoryState>,
    listeners: RwLock<Vec<Listener>>,
    /// Serializes delivery so listeners observe mutations in order
    delivery: Mutex<()>,
    failing_reads: RwLock<Option<String>>,
    status_writes: AtomicUsize,
}

impl Default for MemoryIngressStore {
    fn default() -> Self {
        Self::new(Arc::new(NetworkingV1))
    }
}

impl MemoryIngressStore {
    pub fn new(schema: Arc<dyn IngressSchema>) -> Self {
        Self {
            schema,
            state: RwLock::new(MemoryState::default()),
            listeners: RwLock::new(Vec::new()),
            delivery: Mutex::new(()),
            failing_reads: RwLock::new(None),
            status_writes: AtomicUsize::new(0),
        }
    }

    /// Create or replace an object unconditionally (another actor's write)
    pub fn apply(&self, mut obj: DynamicObject) -> DynamicObject {
        let key = key_of(&obj);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        obj.metadata.resource_version = Some(state.next_revision());
        let old = state.objects.insert(key, obj.clone());

        let notification = match old {
            Some(old) => Notification::Update(Arc::new(old), Arc::new(obj.clone())),
            None => Notification::Add(Arc::new(obj.clone())),
        };
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        drop(state);
        self.notify(&notification);

        obj
    }

    /// Remove an object, announcing the deletion
    pub fn delete(&self, namespace: &str, name: &str) -> Option<DynamicObject> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let removed = state.objects.remove(&IngressKey::new(namespace, name))?;

        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        drop(state);
        self.notify(&Notification::Delete(Arc::new(removed.clone())));

        Some(removed)
    }

    /// Raw object as currently stored
    pub fn object(&self, namespace: &str, name: &str) -> Option<DynamicObject> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.objects.get(&IngressKey::new(namespace, name)).cloned()
    }

    /// Make every subsequent `get` fail with `StoreError::Unavailable`
    pub fn fail_reads(&self, reason: Option<&str>) {
        *self.failing_reads.write().unwrap_or_else(PoisonError::into_inner) =
            reason.map(str::to_string);
    }

    /// Number of accepted status writes
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    fn notify(&self, notification: &Notification) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(notification);
        }
    }
}

impl IngressInformer for MemoryIngressStore {
    fn add_listener(&self, listener: Listener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    fn list(&self) -> Vec<Arc<DynamicObject>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.objects.values().cloned().map(Arc::new).collect()
    }
}

#[async_trait]
impl IngressStore for MemoryIngressStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<IngressResource, StoreError> {
        if let Some(reason) = self
            .failing_reads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(StoreError::Unavailable(reason));
        }

        let obj = self.object(namespace, name).ok_or(StoreError::NotFound)?;
        self.schema.decode(&obj).ok_or_else(|| {
            StoreError::Malformed(format!("{}/{} is not an Ingress", namespace, name))
        })
    }

    async fn update_status(
        &self,
        ingress: &IngressResource,
    ) -> Result<IngressResource, StoreError> {
        let encoded = self.schema.encode(ingress)?;
        let key = ingress.key();

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let current = state.objects.get(&key).cloned().ok_or(StoreError::NotFound)?;

        if current.metadata.resource_version.as_deref() != ingress.resource_version() {
            debug!(
                "Rejecting status write for {}: resourceVersion {:?} != {:?}",
                key,
                ingress.resource_version(),
                current.metadata.resource_version
            );
            return Err(StoreError::Conflict);
        }

        // Status subresource: everything but status comes from the stored object
        let mut updated = current.clone();
        updated.data["status"] = encoded.data["status"].clone();
        updated.metadata.resource_version = Some(state.next_revision());
        state.objects.insert(key.clone(), updated.clone());
        self.status_writes.fetch_add(1, Ordering::SeqCst);

        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        drop(state);
        self.notify(&Notification::Update(
            Arc::new(current),
            Arc::new(updated.clone()),
        ));

        self.schema
            .decode(&updated)
            .ok_or_else(|| StoreError::Malformed(format!("{} is not an Ingress", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::ingress::resource::LoadBalancerEndpoint;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::core::{ErrorResponse, TypeMeta};
    use serde_json::json;

    fn ingress_object(name: &str) -> DynamicObject {
        DynamicObject {
            types: Some(TypeMeta {
                api_version: "networking.k8s.io/v1".to_string(),
                kind: "Ingress".to_string(),
            }),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            data: json!({ "spec": { "rules": [{ "host": "a.com" }] } }),
        }
    }

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn test_classify_api_errors() {
        assert!(matches!(classify(api_error(404)), StoreError::NotFound));
        assert!(matches!(classify(api_error(409)), StoreError::Conflict));
        assert!(matches!(classify(api_error(500)), StoreError::Kube(_)));
    }

    #[test]
    fn test_apply_assigns_increasing_revisions() {
        let store = MemoryIngressStore::default();
        let first = store.apply(ingress_object("a"));
        let second = store.apply(ingress_object("a"));

        assert_eq!(first.metadata.resource_version.as_deref(), Some("1"));
        assert_eq!(second.metadata.resource_version.as_deref(), Some("2"));
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_listeners_see_add_update_delete() {
        let store = MemoryIngressStore::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.add_listener(Arc::new(move |n: &Notification| {
            let kind = match n {
                Notification::Add(_) => "add",
                Notification::Update(_, _) => "update",
                Notification::Delete(_) => "delete",
            };
            sink.lock().unwrap().push(kind);
        }));

        store.apply(ingress_object("a"));
        store.apply(ingress_object("a"));
        store.delete("default", "a");
        assert!(store.delete("default", "a").is_none());

        assert_eq!(*seen.lock().unwrap(), vec!["add", "update", "delete"]);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryIngressStore::default();
        assert!(matches!(
            store.get("default", "missing").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_get_mistyped_object_is_malformed() {
        let store = MemoryIngressStore::default();
        let mut obj = ingress_object("svc");
        obj.types = Some(TypeMeta {
            api_version: "v1".to_string(),
            kind: "Service".to_string(),
        });
        store.apply(obj);

        assert!(matches!(
            store.get("default", "svc").await,
            Err(StoreError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_failing_reads() {
        let store = MemoryIngressStore::default();
        store.apply(ingress_object("a"));
        store.fail_reads(Some("etcd timeout"));

        match store.get("default", "a").await {
            Err(StoreError::Unavailable(reason)) => assert_eq!(reason, "etcd timeout"),
            other => panic!("expected Unavailable, got {:?}", other),
        }

        store.fail_reads(None);
        assert!(store.get("default", "a").await.is_ok());
    }

    #[tokio::test]
    async fn test_status_write_rejects_stale_revision() {
        let store = MemoryIngressStore::default();
        store.apply(ingress_object("a"));
        let mut stale = store.get("default", "a").await.expect("Should get");
        store.apply(ingress_object("a"));

        stale.status = vec![LoadBalancerEndpoint::ip("1.2.3.4")];
        assert!(matches!(
            store.update_status(&stale).await,
            Err(StoreError::Conflict)
        ));
        assert_eq!(store.status_writes(), 0);
    }

    #[tokio::test]
    async fn test_status_write_ignores_non_status_changes() {
        let store = MemoryIngressStore::default();
        store.apply(ingress_object("a"));
        let mut ingress = store.get("default", "a").await.expect("Should get");

        ingress.spec = json!({ "rules": [{ "host": "evil.com" }] });
        ingress.status = vec![LoadBalancerEndpoint::ip("1.2.3.4")];
        let updated = store.update_status(&ingress).await.expect("Should write");

        assert_eq!(updated.hosts(), vec!["a.com"]);
        assert_eq!(updated.status, vec![LoadBalancerEndpoint::ip("1.2.3.4")]);
        assert_eq!(updated.resource_version(), Some("2"));
        assert_eq!(store.status_writes(), 1);
    }
}
