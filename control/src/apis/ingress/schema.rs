//! Ingress API-version adapters
//!
//! Watch payloads arrive as loosely-typed `DynamicObject`s. An `IngressSchema`
//! decides whether a payload is an Ingress of the version it handles, decodes
//! it into an `IngressResource`, and encodes it back for status writes.
//!
//! - `NetworkingV1`: `networking.k8s.io/v1` (default)
//! - `NetworkingV1Beta1`: legacy `networking.k8s.io/v1beta1`

use super::resource::{IngressResource, LoadBalancerEndpoint};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind, TypeMeta};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

pub const INGRESS_GROUP: &str = "networking.k8s.io";
pub const INGRESS_KIND: &str = "Ingress";

/// Adapter between raw watch payloads and `IngressResource`
pub trait IngressSchema: Send + Sync {
    /// Group/version/kind served by this schema
    fn group_version_kind(&self) -> GroupVersionKind;

    fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk(&self.group_version_kind())
    }

    /// Decode a raw payload. Returns `None` when the payload is not an Ingress
    /// of this version or its status cannot be read.
    fn decode(&self, obj: &DynamicObject) -> Option<IngressResource> {
        let ar = self.api_resource();
        let types = obj.types.as_ref()?;
        if types.kind != ar.kind || types.api_version != ar.api_version {
            return None;
        }

        let spec = obj
            .data
            .get("spec")
            .cloned()
            .unwrap_or_else(|| json!({}));

        let status = match obj.data.pointer("/status/loadBalancer/ingress") {
            None | Some(Value::Null) => Vec::new(),
            Some(endpoints) => serde_json::from_value(endpoints.clone()).ok()?,
        };

        Some(IngressResource {
            metadata: obj.metadata.clone(),
            spec,
            status,
        })
    }

    /// Serialize status endpoints in this version's shape
    fn encode_endpoints(
        &self,
        endpoints: &[LoadBalancerEndpoint],
    ) -> Result<Value, serde_json::Error> {
        serde_json::to_value(endpoints)
    }

    /// Encode an Ingress back into a payload suitable for the status subresource
    fn encode(&self, ingress: &IngressResource) -> Result<DynamicObject, serde_json::Error> {
        let ar = self.api_resource();
        let endpoints = self.encode_endpoints(&ingress.status)?;

        Ok(DynamicObject {
            types: Some(TypeMeta {
                api_version: ar.api_version,
                kind: ar.kind,
            }),
            metadata: ingress.metadata.clone(),
            data: json!({
                "spec": ingress.spec,
                "status": {
                    "loadBalancer": {
                        "ingress": endpoints,
                    }
                }
            }),
        })
    }
}

/// `networking.k8s.io/v1`
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkingV1;

impl IngressSchema for NetworkingV1 {
    fn group_version_kind(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(INGRESS_GROUP, "v1", INGRESS_KIND)
    }
}

/// `networking.k8s.io/v1beta1`
///
/// Endpoint `ports` did not exist in this version and are dropped on encode.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkingV1Beta1;

impl IngressSchema for NetworkingV1Beta1 {
    fn group_version_kind(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(INGRESS_GROUP, "v1beta1", INGRESS_KIND)
    }

    fn encode_endpoints(
        &self,
        endpoints: &[LoadBalancerEndpoint],
    ) -> Result<Value, serde_json::Error> {
        let legacy: Vec<LoadBalancerEndpoint> = endpoints
            .iter()
            .map(|endpoint| LoadBalancerEndpoint {
                ports: None,
                ..endpoint.clone()
            })
            .collect();
        serde_json::to_value(legacy)
    }
}

/// Ingress API version selected by configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngressApiVersion {
    #[default]
    V1,
    V1beta1,
}

impl IngressApiVersion {
    pub fn schema(self) -> Arc<dyn IngressSchema> {
        match self {
            IngressApiVersion::V1 => Arc::new(NetworkingV1),
            IngressApiVersion::V1beta1 => Arc::new(NetworkingV1Beta1),
        }
    }
}

impl std::str::FromStr for IngressApiVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "v1" => Ok(IngressApiVersion::V1),
            "v1beta1" => Ok(IngressApiVersion::V1beta1),
            other => Err(format!(
                "unsupported Ingress API version '{}' (expected v1 or v1beta1)",
                other
            )),
        }
    }
}

impl fmt::Display for IngressApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngressApiVersion::V1 => write!(f, "v1"),
            IngressApiVersion::V1beta1 => write!(f, "v1beta1"),
        }
    }
}
