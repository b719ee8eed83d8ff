//! Controller metrics
//!
//! Ingress event and status-write metrics in a dedicated registry, served on
//! `/metrics` by [`crate::metrics_server`].

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    /// Controller metrics registry
    pub static ref CONTROLLER_METRICS_REGISTRY: Registry = Registry::new();

    /// Ingress events delivered to handlers
    static ref INGRESS_EVENTS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "ingress_events_total",
            "Total number of owned Ingress events delivered to handlers",
        );
        let counter = IntCounterVec::new(opts, &["event"])
            .expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Ingress notifications filtered out before delivery
    static ref INGRESS_EVENTS_DROPPED_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "ingress_events_dropped_total",
            "Total number of Ingress notifications dropped before delivery",
        );
        let counter = IntCounterVec::new(opts, &["reason"])
            .expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Ingress status update duration
    static ref INGRESS_STATUS_UPDATE_DURATION: HistogramVec = {
        let opts = HistogramOpts::new(
            "ingress_status_update_duration_seconds",
            "Ingress status update duration in seconds",
        );
        let histogram = HistogramVec::new(opts, &["namespace"])
            .expect("Failed to create histogram");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(histogram.clone()))
            .expect("Failed to register histogram");
        histogram
    };

    /// Ingress status updates total
    static ref INGRESS_STATUS_UPDATES_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "ingress_status_updates_total",
            "Total number of Ingress status updates",
        );
        let counter = IntCounterVec::new(opts, &["namespace", "result"])
            .expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };
}

/// Record an Ingress event delivered to a handler
pub fn record_ingress_event(event: &str) {
    INGRESS_EVENTS_TOTAL.with_label_values(&[event]).inc();
}

/// Record a notification dropped by decoding or ownership filtering
pub fn record_ingress_event_dropped(reason: &str) {
    INGRESS_EVENTS_DROPPED_TOTAL.with_label_values(&[reason]).inc();
}

/// Record an Ingress status update
pub fn record_ingress_status_update(namespace: &str, duration_secs: f64, result: &str) {
    INGRESS_STATUS_UPDATE_DURATION
        .with_label_values(&[namespace])
        .observe(duration_secs);

    INGRESS_STATUS_UPDATES_TOTAL
        .with_label_values(&[namespace, result])
        .inc();
}

/// Gather controller metrics
pub fn gather_controller_metrics() -> Result<String, String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = CONTROLLER_METRICS_REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert to UTF-8: {}", e))
}
