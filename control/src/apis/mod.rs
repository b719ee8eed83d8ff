//! Kubernetes API integrations
//!
//! This module contains watchers and handlers for Kubernetes Ingress resources.

pub mod ingress;
pub mod metrics;
