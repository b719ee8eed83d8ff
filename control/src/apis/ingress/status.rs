//! Ingress status reconciler
//!
//! Writes load-balancer endpoints into `status.loadBalancer.ingress` with a
//! read-modify-write cycle:
//! 1. Re-fetch the Ingress from the store (never from the informer cache)
//! 2. Replace only the endpoint list on the fetched object
//! 3. Submit a status-only update, conditional on the fetched revision
//!
//! `update_owned_status` additionally checks ownership on the fetched object,
//! so an Ingress handed to another controller after it was queued is left
//! alone.
//!
//! No retries happen here. `NotFound` and `Conflict` are expected under
//! concurrent deletion and concurrent writers; the caller decides whether to
//! try again with a fresh read.

use super::ownership::{is_owned, OwnershipPolicy};
use super::resource::{IngressKey, IngressResource, LoadBalancerEndpoint};
use super::store::IngressStore;
use crate::apis::metrics::record_ingress_status_update;
use crate::error::IngressError;
use std::time::Instant;
use tracing::debug;

/// Set the load-balancer endpoints of an Ingress
///
/// Returns the Ingress as stored after the write, with its new revision.
pub async fn update_status(
    store: &dyn IngressStore,
    key: &IngressKey,
    desired: &[LoadBalancerEndpoint],
) -> Result<IngressResource, IngressError> {
    timed(key, read_modify_write(store, None, key, desired)).await
}

/// Set the load-balancer endpoints of an Ingress this controller owns
///
/// Ownership is decided on the freshly read revision. An Ingress that no
/// longer belongs to `policy` fails with `IngressError::NotOwned` and is
/// not written.
pub async fn update_owned_status(
    store: &dyn IngressStore,
    policy: &OwnershipPolicy,
    key: &IngressKey,
    desired: &[LoadBalancerEndpoint],
) -> Result<IngressResource, IngressError> {
    timed(key, read_modify_write(store, Some(policy), key, desired)).await
}

async fn timed(
    key: &IngressKey,
    update: impl std::future::Future<Output = Result<IngressResource, IngressError>>,
) -> Result<IngressResource, IngressError> {
    let start = Instant::now();
    let result = update.await;

    let outcome = match &result {
        Ok(_) => "success",
        Err(e) => e.reason(),
    };
    record_ingress_status_update(&key.namespace, start.elapsed().as_secs_f64(), outcome);

    result
}

async fn read_modify_write(
    store: &dyn IngressStore,
    policy: Option<&OwnershipPolicy>,
    key: &IngressKey,
    desired: &[LoadBalancerEndpoint],
) -> Result<IngressResource, IngressError> {
    let IngressKey { namespace, name } = key;

    let mut current = store
        .get(namespace, name)
        .await
        .map_err(|e| IngressError::from_store(namespace, name, e))?;

    if let Some(policy) = policy {
        if !is_owned(policy, &current) {
            debug!(
                "Ingress {}/{} now has class {:?}, skipping status update",
                namespace,
                name,
                current.class_annotation()
            );
            return Err(IngressError::NotOwned {
                namespace: namespace.clone(),
                name: name.clone(),
            });
        }
    }

    debug!(
        "updating Ingress {}/{} status from {:?} to {:?}",
        namespace, name, current.status, desired
    );
    current.status = desired.to_vec();

    store
        .update_status(&current)
        .await
        .map_err(|e| IngressError::from_store(namespace, name, e))
}
