//! Ingress watch subscription
//!
//! Adapts raw informer notifications into typed, ownership-filtered Ingress
//! events. Payloads that do not decode as an Ingress of the configured API
//! version are dropped; they belong to a resource kind this controller does
//! not handle.
//!
//! Update notifications are gated on the *new* object only. An Ingress whose
//! class annotation moves away from this controller is therefore not
//! delivered at all, and no Delete is synthesized for it; callers that track
//! owned Ingresses must compare ownership of old and new themselves.

use super::informer::{IngressInformer, Notification};
use super::ownership::{is_owned, OwnershipPolicy};
use super::resource::IngressResource;
use super::schema::IngressSchema;
use crate::apis::metrics::{record_ingress_event, record_ingress_event_dropped};
use kube::core::DynamicObject;
use std::sync::Arc;
use tracing::debug;

/// Typed, owned Ingress change
#[derive(Debug, Clone, PartialEq)]
pub enum IngressEvent {
    Added(IngressResource),
    Updated(IngressResource, IngressResource),
    Deleted(IngressResource),
}

impl IngressEvent {
    /// The most recent state of the Ingress this event refers to
    pub fn resource(&self) -> &IngressResource {
        match self {
            IngressEvent::Added(ingress)
            | IngressEvent::Updated(_, ingress)
            | IngressEvent::Deleted(ingress) => ingress,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            IngressEvent::Added(_) => "added",
            IngressEvent::Updated(_, _) => "updated",
            IngressEvent::Deleted(_) => "deleted",
        }
    }
}

/// Receives owned Ingress changes
///
/// Called on the informer's delivery path: implementations should return
/// promptly and hand slow work (such as status writes) to a worker.
pub trait IngressHandler: Send + Sync {
    fn on_add(&self, ingress: IngressResource);

    fn on_update(&self, old: IngressResource, new: IngressResource);

    fn on_delete(&self, ingress: IngressResource);

    fn handle(&self, event: IngressEvent) {
        match event {
            IngressEvent::Added(ingress) => self.on_add(ingress),
            IngressEvent::Updated(old, new) => self.on_update(old, new),
            IngressEvent::Deleted(ingress) => self.on_delete(ingress),
        }
    }
}

type AddFn = Box<dyn Fn(IngressResource) + Send + Sync>;
type UpdateFn = Box<dyn Fn(IngressResource, IngressResource) + Send + Sync>;

/// `IngressHandler` built from three closures
pub struct IngressHandlerFns {
    pub add: AddFn,
    pub update: UpdateFn,
    pub delete: AddFn,
}

impl IngressHandlerFns {
    pub fn new(
        add: impl Fn(IngressResource) + Send + Sync + 'static,
        update: impl Fn(IngressResource, IngressResource) + Send + Sync + 'static,
        delete: impl Fn(IngressResource) + Send + Sync + 'static,
    ) -> Self {
        Self {
            add: Box::new(add),
            update: Box::new(update),
            delete: Box::new(delete),
        }
    }

    /// Route every event kind through a single closure
    pub fn from_events(f: impl Fn(IngressEvent) + Send + Sync + 'static) -> Self {
        let f = Arc::new(f);
        let (on_update, on_delete) = (f.clone(), f.clone());
        Self::new(
            move |ingress| f(IngressEvent::Added(ingress)),
            move |old, new| on_update(IngressEvent::Updated(old, new)),
            move |ingress| on_delete(IngressEvent::Deleted(ingress)),
        )
    }
}

impl IngressHandler for IngressHandlerFns {
    fn on_add(&self, ingress: IngressResource) {
        (self.add)(ingress)
    }

    fn on_update(&self, old: IngressResource, new: IngressResource) {
        (self.update)(old, new)
    }

    fn on_delete(&self, ingress: IngressResource) {
        (self.delete)(ingress)
    }
}

fn decode_payload(schema: &dyn IngressSchema, obj: &DynamicObject) -> Option<IngressResource> {
    let decoded = schema.decode(obj);
    if decoded.is_none() {
        debug!(
            "Dropping non-Ingress payload {}/{}",
            obj.metadata.namespace.as_deref().unwrap_or_default(),
            obj.metadata.name.as_deref().unwrap_or_default()
        );
        record_ingress_event_dropped("decode");
    }
    decoded
}

/// Decode a raw notification and apply the ownership filter
///
/// Returns `None` when a payload fails to decode or the Ingress is not owned.
pub fn filter_notification(
    schema: &dyn IngressSchema,
    policy: &OwnershipPolicy,
    notification: &Notification,
) -> Option<IngressEvent> {
    let event = match notification {
        Notification::Add(obj) => IngressEvent::Added(decode_payload(schema, obj)?),
        Notification::Update(old, new) => IngressEvent::Updated(
            decode_payload(schema, old)?,
            decode_payload(schema, new)?,
        ),
        Notification::Delete(obj) => IngressEvent::Deleted(decode_payload(schema, obj)?),
    };

    if !is_owned(policy, event.resource()) {
        debug!(
            "Ignoring Ingress {} with class '{}'",
            event.resource().key(),
            event.resource().class_annotation()
        );
        record_ingress_event_dropped("not_owned");
        return None;
    }

    record_ingress_event(event.label());
    Some(event)
}

/// Register `handler` for owned Ingress changes on `informer`
pub fn subscribe(
    informer: &dyn IngressInformer,
    schema: Arc<dyn IngressSchema>,
    policy: OwnershipPolicy,
    handler: Arc<dyn IngressHandler>,
) {
    informer.add_listener(Arc::new(move |notification: &Notification| {
        if let Some(event) = filter_notification(schema.as_ref(), &policy, notification) {
            handler.handle(event);
        }
    }));
}

/// Owned Ingresses currently in the informer cache
///
/// Served from the local cache, so it may lag the watch stream.
pub fn list_owned(
    informer: &dyn IngressInformer,
    schema: &dyn IngressSchema,
    policy: &OwnershipPolicy,
) -> Vec<IngressResource> {
    informer
        .list()
        .iter()
        .filter_map(|obj| schema.decode(obj))
        .filter(|ingress| is_owned(policy, ingress))
        .collect()
}
