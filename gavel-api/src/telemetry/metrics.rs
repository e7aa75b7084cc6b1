//! Prometheus Metrics Definitions
//!
//! Defines all Gavel metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_histogram_vec,
    CounterVec, Encoder, Gauge, Histogram, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Critical-section latency buckets (seconds). Anything near the lock TTL is
/// a problem.
const CRITICAL_SECTION_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.002, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<GavelMetrics>> = Lazy::new(GavelMetrics::new);

/// The registered metrics, or `None` if registration failed.
pub fn metrics() -> Option<&'static GavelMetrics> {
    METRICS.as_ref().ok()
}

/// Container for all Gavel metrics.
#[derive(Clone)]
pub struct GavelMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Bid outcomes - labels: outcome
    pub bids_total: CounterVec,

    /// Time spent holding an auction lock
    pub critical_section_duration_seconds: Histogram,

    /// Lock releases - labels: result (released, expired)
    pub lock_releases_total: CounterVec,

    /// Write-back results - labels: status (success, failure)
    pub persist_total: CounterVec,

    /// Bids never handed to a persistence lane - labels: reason
    pub persist_dropped_total: CounterVec,

    /// Auctions whose durable price is behind the cache
    pub price_drift_auctions: Gauge,

    /// Price updates published on the channel - labels: status
    pub broadcast_published_total: CounterVec,

    /// Per-connection deliveries - labels: status (delivered, dropped)
    pub broadcast_deliveries_total: CounterVec,

    /// Current active WebSocket connections
    pub websocket_connections: Gauge,
}

impl GavelMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "gavel_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "gavel_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            bids_total: register_counter_vec!(
                "gavel_bids_total",
                "Bid attempts by outcome",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register bids_total: {}", e)))?,

            critical_section_duration_seconds: register_histogram!(
                "gavel_critical_section_duration_seconds",
                "Time between acquiring and releasing an auction lock",
                CRITICAL_SECTION_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register critical_section_duration_seconds: {}", e)))?,

            lock_releases_total: register_counter_vec!(
                "gavel_lock_releases_total",
                "Auction lock releases by result",
                &["result"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register lock_releases_total: {}", e)))?,

            persist_total: register_counter_vec!(
                "gavel_persist_total",
                "Write-back persistence attempts by status",
                &["status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register persist_total: {}", e)))?,

            persist_dropped_total: register_counter_vec!(
                "gavel_persist_dropped_total",
                "Accepted bids that never reached a persistence lane",
                &["reason"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register persist_dropped_total: {}", e)))?,

            price_drift_auctions: register_gauge!(
                "gavel_price_drift_auctions",
                "Auctions whose last write-back failed"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register price_drift_auctions: {}", e)))?,

            broadcast_published_total: register_counter_vec!(
                "gavel_broadcast_published_total",
                "Price updates published on the shared channel",
                &["status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register broadcast_published_total: {}", e)))?,

            broadcast_deliveries_total: register_counter_vec!(
                "gavel_broadcast_deliveries_total",
                "Price updates handed to observer connections",
                &["status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register broadcast_deliveries_total: {}", e)))?,

            websocket_connections: register_gauge!(
                "gavel_websocket_connections",
                "Current number of active WebSocket connections"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register websocket_connections: {}", e)))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record the outcome of one bid attempt.
    pub fn record_bid(&self, outcome: &str) {
        self.bids_total.with_label_values(&[outcome]).inc();
    }

    /// Record how long a lock was held.
    pub fn record_critical_section(&self, duration_secs: f64) {
        self.critical_section_duration_seconds.observe(duration_secs);
    }

    /// Record a release; `false` means the lock had already expired or changed hands.
    pub fn record_lock_release(&self, released: bool) {
        let result = if released { "released" } else { "expired" };
        self.lock_releases_total.with_label_values(&[result]).inc();
    }

    /// Record a write-back attempt.
    pub fn record_persist(&self, success: bool) {
        let status = if success { "success" } else { "failure" };
        self.persist_total.with_label_values(&[status]).inc();
    }

    /// Record a bid that was accepted but could not be queued for persistence.
    pub fn record_persist_dropped(&self, reason: &str) {
        self.persist_dropped_total.with_label_values(&[reason]).inc();
    }

    pub fn set_price_drift(&self, auctions: usize) {
        self.price_drift_auctions.set(auctions as f64);
    }

    pub fn record_publish(&self, success: bool) {
        let status = if success { "success" } else { "failure" };
        self.broadcast_published_total
            .with_label_values(&[status])
            .inc();
    }

    pub fn record_deliveries(&self, delivered: usize, dropped: usize) {
        self.broadcast_deliveries_total
            .with_label_values(&["delivered"])
            .inc_by(delivered as f64);
        self.broadcast_deliveries_total
            .with_label_values(&["dropped"])
            .inc_by(dropped as f64);
    }

    /// Increment WebSocket connection count.
    pub fn ws_connected(&self) {
        self.websocket_connections.inc();
    }

    /// Decrement WebSocket connection count.
    pub fn ws_disconnected(&self) {
        self.websocket_connections.dec();
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler() -> impl IntoResponse {
    // Make sure every metric is registered before the first scrape.
    let _ = metrics();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        assert!(!metrics.http_requests_total.desc().is_empty());
        Ok(())
    }

    #[test]
    fn test_record_bid_outcomes() -> Result<(), String> {
        let metrics = metrics().ok_or("Metrics init failed")?;
        let before = metrics.bids_total.with_label_values(&["bid_too_low"]).get();
        metrics.record_bid("bid_too_low");
        let after = metrics.bids_total.with_label_values(&["bid_too_low"]).get();
        assert!(after >= before + 1.0);
        Ok(())
    }

    #[test]
    fn test_record_deliveries() -> Result<(), String> {
        let metrics = metrics().ok_or("Metrics init failed")?;
        let before = metrics
            .broadcast_deliveries_total
            .with_label_values(&["dropped"])
            .get();
        metrics.record_deliveries(3, 2);
        let after = metrics
            .broadcast_deliveries_total
            .with_label_values(&["dropped"])
            .get();
        assert!(after >= before + 2.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_metrics_handler_exposes_gavel_metrics() {
        let _ = metrics();
        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("gavel_websocket_connections"));
    }
}
