//! Prometheus metrics for the webhook server
//!
//! Exposes webhook traffic and cluster-operation activity:
//! - Event counts by kind and outcome
//! - Apply/diff counts and durations

use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Shared handle to the metrics registry
pub type SharedMetrics = Arc<Metrics>;

/// Metrics registry
///
/// Thread-safe; clone the Arc handle freely.
pub struct Metrics {
    registry: Registry,
    /// Webhook events by kind and outcome (ok, ignored, error, forbidden)
    pub webhook_events_total: IntCounterVec,
    /// Cluster operations by operation (diff, apply) and result
    pub cluster_operations_total: IntCounterVec,
    /// Cluster operation duration in seconds
    pub cluster_operation_duration_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let webhook_events_total = IntCounterVec::new(
            Opts::new(
                "kubeapply_webhook_events_total",
                "Total number of webhook events received",
            ),
            &["event", "result"],
        )?;
        registry.register(Box::new(webhook_events_total.clone()))?;

        let cluster_operations_total = IntCounterVec::new(
            Opts::new(
                "kubeapply_cluster_operations_total",
                "Total number of cluster operations",
            ),
            &["operation", "result"],
        )?;
        registry.register(Box::new(cluster_operations_total.clone()))?;

        let cluster_operation_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "kubeapply_cluster_operation_duration_seconds",
                "Duration of cluster operations in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["operation"],
        )?;
        registry.register(Box::new(cluster_operation_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            webhook_events_total,
            cluster_operations_total,
            cluster_operation_duration_seconds,
        })
    }

    /// Record one webhook event outcome
    pub fn record_event(&self, event: &str, result: &str) {
        self.webhook_events_total
            .with_label_values(&[event, result])
            .inc();
    }

    /// Record one cluster operation and its duration
    pub fn record_operation(&self, operation: &str, ok: bool, duration_secs: f64) {
        let result = if ok { "success" } else { "error" };
        self.cluster_operations_total
            .with_label_values(&[operation, result])
            .inc();
        self.cluster_operation_duration_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    /// Encode all metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

/// Create the shared registry
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    Ok(Arc::new(Metrics::new()?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "metrics_test.rs"]
mod tests;
