//! Ingress informer: watch stream plus local read cache
//!
//! An `IngressInformer` delivers raw add/update/delete notifications and keeps
//! a best-effort local snapshot of every Ingress it has seen.
//!
//! ## Ordering
//!
//! Notifications for the same namespace/name are delivered in the order the
//! store observed the changes. Notifications for different keys carry no
//! ordering guarantee, and listeners may be called concurrently for them.
//! Delivery is at-least-once: a relist re-announces every object.
//!
//! `KubeInformer` runs a kube-rs watcher, mirrors it into a reflector store,
//! and turns watcher events into informer-style notifications:
//! - `Apply` of a cached key -> `Update(old, new)`, otherwise `Add`
//! - `Delete` -> `Delete`
//! - after a relist, cached keys that did not reappear -> `Delete`

use super::resource::IngressKey;
use super::schema::IngressSchema;
use crate::error::StoreError;
use futures::StreamExt;
use kube::core::{ApiResource, DynamicObject};
use kube::runtime::reflector::store::Writer;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::watcher;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::WatchStreamExt;
use kube::{Api, Client};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Raw, loosely-typed change notification
#[derive(Debug, Clone)]
pub enum Notification {
    Add(Arc<DynamicObject>),
    Update(Arc<DynamicObject>, Arc<DynamicObject>),
    Delete(Arc<DynamicObject>),
}

/// Callback registered on an informer
pub type Listener = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Watch and cache capability consumed by the subscription
pub trait IngressInformer: Send + Sync {
    /// Register a listener for all future notifications
    fn add_listener(&self, listener: Listener);

    /// Snapshot of the local cache (match-everything selector, no server round trip)
    fn list(&self) -> Vec<Arc<DynamicObject>>;
}

fn object_key(obj: &DynamicObject) -> IngressKey {
    IngressKey::new(
        obj.metadata.namespace.clone().unwrap_or_default(),
        obj.metadata.name.clone().unwrap_or_default(),
    )
}

/// Applies watcher events to the reflector cache and derives notifications
pub(crate) struct Relay {
    api_resource: ApiResource,
    writer: Writer<DynamicObject>,
    reader: Store<DynamicObject>,
    /// Keys re-announced during the current relist
    relisted: Option<HashSet<IngressKey>>,
}

impl Relay {
    pub(crate) fn new(api_resource: ApiResource) -> Self {
        let writer = Writer::new(api_resource.clone());
        let reader = writer.as_reader();
        Self {
            api_resource,
            writer,
            reader,
            relisted: None,
        }
    }

    pub(crate) fn reader(&self) -> Store<DynamicObject> {
        self.reader.clone()
    }

    fn applied(&self, obj: &DynamicObject) -> Notification {
        let object_ref = ObjectRef::from_obj_with(obj, self.api_resource.clone());
        let new = Arc::new(obj.clone());
        match self.reader.get(&object_ref) {
            Some(old) => Notification::Update(old, new),
            None => Notification::Add(new),
        }
    }

    /// Derive notifications for one watcher event, then apply it to the cache
    pub(crate) fn process(&mut self, event: watcher::Event<DynamicObject>) -> Vec<Notification> {
        let notifications = match &event {
            watcher::Event::Apply(obj) => vec![self.applied(obj)],
            watcher::Event::Delete(obj) => vec![Notification::Delete(Arc::new(obj.clone()))],
            watcher::Event::Init => {
                debug!("Ingress informer relist started");
                self.relisted = Some(HashSet::new());
                vec![]
            }
            watcher::Event::InitApply(obj) => {
                if let Some(relisted) = self.relisted.as_mut() {
                    relisted.insert(object_key(obj));
                }
                vec![self.applied(obj)]
            }
            watcher::Event::InitDone => {
                let relisted = self.relisted.take().unwrap_or_default();
                let vanished: Vec<Notification> = self
                    .reader
                    .state()
                    .into_iter()
                    .filter(|obj| !relisted.contains(&object_key(obj)))
                    .map(Notification::Delete)
                    .collect();
                info!(
                    "Ingress informer sync complete ({} objects, {} vanished)",
                    relisted.len(),
                    vanished.len()
                );
                vanished
            }
        };

        self.writer.apply_watcher_event(&event);
        notifications
    }
}

/// Informer backed by the Kubernetes API
pub struct KubeInformer {
    api: Api<DynamicObject>,
    reader: Store<DynamicObject>,
    relay: Mutex<Option<Relay>>,
    listeners: RwLock<Vec<Listener>>,
}

impl KubeInformer {
    /// Watch Ingresses of the schema's API version, in one namespace or cluster-wide
    pub fn new(client: Client, schema: &dyn IngressSchema, namespace: Option<&str>) -> Self {
        let api_resource = schema.api_resource();
        let api = match namespace {
            Some(ns) => Api::namespaced_with(client, ns, &api_resource),
            None => Api::all_with(client, &api_resource),
        };
        let relay = Relay::new(api_resource);

        Self {
            api,
            reader: relay.reader(),
            relay: Mutex::new(Some(relay)),
            listeners: RwLock::new(Vec::new()),
        }
    }

    fn notify(&self, notification: &Notification) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(notification);
        }
    }

    /// Wait for the first full listing to land in the cache
    pub async fn wait_until_synced(&self) -> Result<(), StoreError> {
        self.reader
            .wait_until_ready()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Ingress informer stopped: {}", e)))
    }

    /// Run the watch loop. Call it once, in a tokio::spawn() task.
    pub async fn run(&self) -> Result<(), StoreError> {
        let mut relay = self
            .relay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| {
                StoreError::Unavailable("Ingress informer already running".to_string())
            })?;

        let stream = watcher(self.api.clone(), WatcherConfig::default()).default_backoff();
        futures::pin_mut!(stream);

        info!("Starting Ingress informer");

        while let Some(event) = stream.next().await {
            match event {
                Ok(event) => {
                    for notification in relay.process(event) {
                        self.notify(&notification);
                    }
                }
                Err(e) => {
                    warn!("Ingress watcher error: {}", e);
                }
            }
        }

        Ok(())
    }
}

impl IngressInformer for KubeInformer {
    fn add_listener(&self, listener: Listener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    fn list(&self) -> Vec<Arc<DynamicObject>> {
        self.reader.state()
    }
}
