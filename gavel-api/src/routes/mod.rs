//! REST API Routes Module
//!
//! Includes:
//! - Bid placement under /api/v1/bid
//! - User and auction create/read under /api/v1
//! - The observer WebSocket at /api/v1/ws
//! - Health check endpoints (Kubernetes-compatible)
//! - Prometheus metrics and the OpenAPI document
//! - CORS support for browser-based clients

pub mod auction;
pub mod bid;
pub mod health;
pub mod user;

use std::time::Duration;

use axum::{
    http::{header, Method},
    middleware::from_fn,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};
use crate::types::RootResponse;
use crate::ws;

pub use auction::create_router as auction_router;
pub use bid::create_router as bid_router;
pub use health::create_router as health_router;
pub use user::create_router as user_router;

// ============================================================================
// ROOT AND OPENAPI ENDPOINTS
// ============================================================================

/// GET / - Service banner
#[utoipa::path(
    get,
    path = "/",
    tag = "Health",
    responses(
        (status = 200, description = "Server is running", body = RootResponse),
    ),
)]
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        status: "ok".to_string(),
        message: "Auction server is running".to_string(),
    })
}

/// Handler for /openapi.json endpoint.
#[cfg(feature = "openapi")]
async fn openapi_json() -> impl IntoResponse {
    use utoipa::OpenApi;
    Json(crate::openapi::ApiDoc::openapi())
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, only allows configured origins.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any).allow_headers(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let origins: Vec<header::HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the complete router.
///
/// - `/api/v1/bid`, `/api/v1/users`, `/api/v1/auctions/*`, `/api/v1/ws`
/// - `/health/*`, `/metrics`, `/openapi.json`, `/`
///
/// Execution order: CORS -> Observability -> Handler
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let api_routes = Router::new()
        .merge(bid::create_router())
        .merge(user::create_router())
        .merge(auction::create_router())
        .route("/ws", get(ws::ws_handler));

    let router = Router::new()
        .route("/", get(root))
        .nest("/api/v1", api_routes)
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler));

    #[cfg(feature = "openapi")]
    let router = router.route("/openapi.json", get(openapi_json));

    router
        .layer(from_fn(observability_middleware))
        .layer(build_cors_layer(config))
        .with_state(state)
}
