//! Configuration for the RAUTA Ingress controller
//!
//! Provided once at startup and immutable for the process lifetime.

use crate::apis::ingress::{IngressApiVersion, LoadBalancerEndpoint, OwnershipPolicy};
use serde::{Deserialize, Serialize};
use std::env;

/// Controller configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Ingress class handled by this instance
    #[serde(default = "default_class_name")]
    pub class_name: String,

    /// Ignore Ingresses without a class annotation (default: false)
    #[serde(default = "default_false")]
    pub class_name_required: bool,

    /// Ingress API version to watch (default: v1)
    #[serde(default)]
    pub api_version: IngressApiVersion,

    /// Namespace to watch; all namespaces when unset
    #[serde(default)]
    pub watch_namespace: Option<String>,

    /// Addresses published in the status of owned Ingresses
    #[serde(default)]
    pub publish_addresses: Vec<String>,

    /// Listen address for the Prometheus scrape endpoint
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,

    /// Delay before re-queueing a status write that hit a conflict (default: 1s)
    #[serde(default = "default_conflict_requeue")]
    pub conflict_requeue_secs: u64,
}

fn default_class_name() -> String {
    "rauta".to_string()
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_false() -> bool {
    false
}

fn default_conflict_requeue() -> u64 {
    1
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            class_name: default_class_name(),
            class_name_required: default_false(),
            api_version: IngressApiVersion::default(),
            watch_namespace: None,
            publish_addresses: Vec::new(),
            metrics_addr: default_metrics_addr(),
            conflict_requeue_secs: default_conflict_requeue(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::default();

        if let Some(val) = lookup("RAUTA_INGRESS_CLASS") {
            config.class_name = val;
        }

        if let Some(val) = lookup("RAUTA_INGRESS_CLASS_REQUIRED") {
            config.class_name_required = val
                .parse::<bool>()
                .map_err(|e| format!("Invalid RAUTA_INGRESS_CLASS_REQUIRED '{}': {}", val, e))?;
        }

        if let Some(val) = lookup("RAUTA_INGRESS_API_VERSION") {
            config.api_version = val.parse()?;
        }

        if let Some(val) = lookup("RAUTA_WATCH_NAMESPACE") {
            if !val.trim().is_empty() {
                config.watch_namespace = Some(val.trim().to_string());
            }
        }

        if let Some(val) = lookup("RAUTA_PUBLISH_ADDRESSES") {
            config.publish_addresses = val
                .split(',')
                .map(str::trim)
                .filter(|addr| !addr.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(val) = lookup("RAUTA_METRICS_ADDR") {
            config.metrics_addr = val;
        }

        if let Some(val) = lookup("RAUTA_CONFLICT_REQUEUE_SECS") {
            config.conflict_requeue_secs = val
                .parse()
                .map_err(|e| format!("Invalid RAUTA_CONFLICT_REQUEUE_SECS '{}': {}", val, e))?;
        }

        Ok(config)
    }

    pub fn ownership_policy(&self) -> OwnershipPolicy {
        OwnershipPolicy::new(self.class_name.clone(), self.class_name_required)
    }

    /// Status endpoints built from the published addresses
    pub fn publish_endpoints(&self) -> Vec<LoadBalancerEndpoint> {
        self.publish_addresses
            .iter()
            .map(|addr| LoadBalancerEndpoint::from_address(addr))
            .collect()
    }
}
