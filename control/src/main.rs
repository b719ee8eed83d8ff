use anyhow::Result;
use control::apis::ingress::{
    list_owned, subscribe, update_owned_status, IngressHandlerFns, IngressInformer, IngressKey,
    IngressStore, KubeInformer, KubeIngressStore, LoadBalancerEndpoint, OwnershipPolicy,
};
use control::config::ControllerConfig;
use control::metrics_server::serve_metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// RAUTA Ingress controller
///
/// Watches owned Ingresses and publishes the configured addresses in their status.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (needed for Kubernetes TLS client)
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok(); // Ignore error if already installed

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("🦀 RAUTA Ingress controller");

    let config = ControllerConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    let policy = config.ownership_policy();
    let endpoints = config.publish_endpoints();

    info!(
        "   IngressClass: {} (required: {})",
        policy.class_name, policy.class_name_required
    );
    info!("   API version: networking.k8s.io/{}", config.api_version);
    info!(
        "   Namespace: {}",
        config.watch_namespace.as_deref().unwrap_or("<all>")
    );

    let client = kube::Client::try_default().await?;
    let schema = config.api_version.schema();

    let informer = Arc::new(KubeInformer::new(
        client.clone(),
        schema.as_ref(),
        config.watch_namespace.as_deref(),
    ));
    let store: Arc<dyn IngressStore> = Arc::new(KubeIngressStore::new(client, schema.clone()));

    let mut handles = vec![];

    let metrics_addr = config.metrics_addr.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = serve_metrics(&metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    }));

    if endpoints.is_empty() {
        warn!("RAUTA_PUBLISH_ADDRESSES is empty - Ingress status publishing disabled");
        subscribe(
            informer.as_ref(),
            schema.clone(),
            policy.clone(),
            Arc::new(IngressHandlerFns::from_events(|event| {
                debug!("Ingress event: {:?}", event.resource().key());
            })),
        );
    } else {
        info!("   Publishing: {:?}", config.publish_addresses);

        let (tx, rx) = mpsc::unbounded_channel::<IngressKey>();
        subscribe(
            informer.as_ref(),
            schema.clone(),
            policy.clone(),
            Arc::new(status_handler(tx.clone(), endpoints.clone())),
        );

        let requeue = Duration::from_secs(config.conflict_requeue_secs);
        handles.push(tokio::spawn(run_status_worker(
            store.clone(),
            policy.clone(),
            rx,
            tx,
            endpoints,
            requeue,
        )));
    }

    let watch = informer.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = watch.run().await {
            error!("Ingress informer error: {}", e);
        }
    }));

    tokio::select! {
        synced = informer.wait_until_synced() => {
            synced?;
            let owned = list_owned(informer.as_ref(), schema.as_ref(), &policy);
            info!(
                "✅ Ingress informer synced: {} owned of {} cached",
                owned.len(),
                informer.list().len()
            );
        }
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            return shutdown(handles);
        }
    }

    info!("Press Ctrl-C to exit.");
    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    shutdown(handles)
}

fn shutdown(handles: Vec<tokio::task::JoinHandle<()>>) -> Result<()> {
    for handle in handles {
        handle.abort();
    }
    Ok(())
}

/// Queue owned Ingresses whose status differs from the published endpoints
///
/// Runs on the informer's delivery path, so it only enqueues keys.
fn status_handler(
    tx: mpsc::UnboundedSender<IngressKey>,
    endpoints: Vec<LoadBalancerEndpoint>,
) -> IngressHandlerFns {
    let (on_add, on_update) = (tx.clone(), tx);
    let (add_endpoints, update_endpoints) = (endpoints.clone(), endpoints);

    IngressHandlerFns::new(
        move |ingress| {
            if ingress.status() != add_endpoints.as_slice() {
                let _ = on_add.send(ingress.key());
            }
        },
        move |_old, new| {
            if new.status() != update_endpoints.as_slice() {
                let _ = on_update.send(new.key());
            }
        },
        |ingress| {
            debug!("Ingress {} deleted", ingress.key());
        },
    )
}

/// What the status worker does with a key after one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Written,
    Dropped,
    Requeue,
}

/// Write the published endpoints to one queued Ingress
///
/// Ownership is checked again on the fresh read; the key may have been queued
/// before the Ingress moved to another class.
async fn reconcile_key(
    store: &dyn IngressStore,
    policy: &OwnershipPolicy,
    key: &IngressKey,
    endpoints: &[LoadBalancerEndpoint],
) -> Outcome {
    match update_owned_status(store, policy, key, endpoints).await {
        Ok(ingress) => {
            info!(
                "Updated Ingress {} status (resourceVersion {})",
                key,
                ingress.resource_version().unwrap_or("?")
            );
            Outcome::Written
        }
        Err(e) if e.is_not_found() => {
            debug!("Ingress {} is gone, skipping status update", key);
            Outcome::Dropped
        }
        Err(e) if e.is_not_owned() => {
            debug!("Ingress {} changed owner, skipping status update", key);
            Outcome::Dropped
        }
        Err(e) if e.is_retryable() => {
            warn!("Failed to update Ingress {} status: {} (retrying)", key, e);
            Outcome::Requeue
        }
        Err(e) => {
            error!("Failed to update Ingress {} status: {} (giving up)", key, e);
            Outcome::Dropped
        }
    }
}

/// Apply published endpoints to queued Ingresses
///
/// Conflicts and transient store errors are re-queued after `requeue`.
/// Ingresses that were deleted, changed owner or cannot be decoded are dropped.
async fn run_status_worker(
    store: Arc<dyn IngressStore>,
    policy: OwnershipPolicy,
    mut rx: mpsc::UnboundedReceiver<IngressKey>,
    tx: mpsc::UnboundedSender<IngressKey>,
    endpoints: Vec<LoadBalancerEndpoint>,
    requeue: Duration,
) {
    info!("Starting Ingress status worker");

    while let Some(key) = rx.recv().await {
        if reconcile_key(store.as_ref(), &policy, &key, &endpoints).await == Outcome::Requeue {
            let tx = tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(requeue).await;
                let _ = tx.send(key);
            });
        }
    }
}
