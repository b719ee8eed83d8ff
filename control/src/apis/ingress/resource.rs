//! Ingress data model
//!
//! `IngressResource` is a transient, decoded view of an Ingress object as served
//! by the API server. The spec is kept as opaque JSON so that writing status
//! back never rewrites fields this controller does not understand.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Annotation used to route an Ingress to a controller instance
pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

/// Identity of an Ingress: namespace and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IngressKey {
    pub namespace: String,
    pub name: String,
}

impl IngressKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for IngressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Port status reported for a load-balancer endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointPortStatus {
    pub port: i32,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A single entry of `status.loadBalancer.ingress`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<EndpointPortStatus>>,
}

impl LoadBalancerEndpoint {
    pub fn ip(ip: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            ..Default::default()
        }
    }

    pub fn hostname(hostname: impl Into<String>) -> Self {
        Self {
            hostname: Some(hostname.into()),
            ..Default::default()
        }
    }

    /// Build an endpoint from a published address: IP literals become `ip`,
    /// anything else is treated as a hostname.
    pub fn from_address(address: &str) -> Self {
        let address = address.trim();
        match address.parse::<IpAddr>() {
            Ok(ip) => Self::ip(ip.to_string()),
            Err(_) => Self::hostname(address),
        }
    }
}

/// Decoded Ingress object
#[derive(Debug, Clone, PartialEq)]
pub struct IngressResource {
    pub metadata: ObjectMeta,
    /// `spec`, untouched
    pub spec: serde_json::Value,
    /// `status.loadBalancer.ingress`
    pub status: Vec<LoadBalancerEndpoint>,
}

impl IngressResource {
    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or("default")
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn key(&self) -> IngressKey {
        IngressKey::new(self.namespace(), self.name())
    }

    /// Revision token assigned by the store
    pub fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }

    /// Value of the `kubernetes.io/ingress.class` annotation ("" when missing)
    pub fn class_annotation(&self) -> &str {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(INGRESS_CLASS_ANNOTATION))
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Hosts declared in `spec.rules[].host`
    pub fn hosts(&self) -> Vec<&str> {
        self.spec
            .get("rules")
            .and_then(|rules| rules.as_array())
            .map(|rules| {
                rules
                    .iter()
                    .filter_map(|rule| rule.get("host").and_then(|h| h.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn status(&self) -> &[LoadBalancerEndpoint] {
        &self.status
    }
}
