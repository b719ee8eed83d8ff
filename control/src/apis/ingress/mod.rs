//! Ingress support (networking.k8s.io)
//!
//! - Watch subscription: typed, ownership-filtered Ingress events
//! - Ownership filter: `kubernetes.io/ingress.class` routing
//! - Status reconciler: `status.loadBalancer.ingress` read-modify-write
//! - Informer and store bindings for the Kubernetes API

pub mod informer;
pub mod ownership;
pub mod resource;
pub mod schema;
pub mod status;
pub mod store;
pub mod watch;

pub use informer::{IngressInformer, KubeInformer, Notification};
pub use ownership::{is_owned, OwnershipPolicy};
pub use resource::{IngressKey, IngressResource, LoadBalancerEndpoint};
pub use schema::{IngressApiVersion, IngressSchema};
pub use status::{update_owned_status, update_status};
pub use store::{IngressStore, KubeIngressStore, MemoryIngressStore};
pub use watch::{list_owned, subscribe, IngressEvent, IngressHandler, IngressHandlerFns};
