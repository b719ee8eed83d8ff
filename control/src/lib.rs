//! RAUTA Ingress Control Library
//!
//! Exposes the Ingress watch subscription, ownership filter and status
//! reconciler for the binary and tests

pub mod apis;
pub mod config;
pub mod error;
pub mod metrics_server;
