//! Axum Middleware for HTTP Request Tracing and Metrics
//!
//! Wraps every request in an `http_request` span, records Prometheus
//! metrics and logs completion.

use axum::{extract::Request, middleware::Next, response::Response};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Instant;
use tracing::{info_span, Instrument};

use super::metrics::metrics;

static UUID_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}").ok()
});

static ID_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"/\d+(/|$)").ok());

/// Normalize path for metrics/spans (replace UUIDs and IDs with placeholders).
///
/// This prevents high-cardinality label explosion in Prometheus.
fn normalize_path(path: &str) -> String {
    let mut result = path.to_string();
    if let Some(uuid) = UUID_PATTERN.as_ref() {
        result = uuid.replace_all(&result, "{id}").into_owned();
    }
    if let Some(id) = ID_PATTERN.as_ref() {
        // Adjacent numeric segments share a slash, so one pass can miss every
        // other one.
        while id.is_match(&result) {
            result = id.replace_all(&result, "/{id}$1").into_owned();
        }
    }
    result
}

/// Observability middleware for Axum.
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let normalized_path = normalize_path(&path);

    let span = info_span!(
        "http_request",
        http.method = %method,
        http.target = %path,
        http.route = %normalized_path,
    );

    let response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    let status = response.status();

    if let Some(m) = metrics() {
        m.record_http_request(
            method.as_str(),
            &normalized_path,
            status.as_u16(),
            duration.as_secs_f64(),
        );
    }

    if status.is_server_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis(),
            "Request failed"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis(),
            "Request completed"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_numeric_id() {
        assert_eq!(normalize_path("/api/v1/auctions/42"), "/api/v1/auctions/{id}");
    }

    #[test]
    fn test_normalize_path_nested_ids() {
        assert_eq!(
            normalize_path("/api/v1/auctions/42/bids"),
            "/api/v1/auctions/{id}/bids"
        );
    }

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/things/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/things/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/v1/bid"), "/api/v1/bid");
        assert_eq!(normalize_path("/health/ready"), "/health/ready");
    }

    #[test]
    fn test_normalize_path_keeps_version_segment() {
        // "v1" is not purely numeric.
        assert_eq!(normalize_path("/api/v1/auctions"), "/api/v1/auctions");
    }
}
