//! OpenAPI Specification for the Gavel API
//!
//! Generated with utoipa from route annotations and the request/response
//! types. Served at `/openapi.json`.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::health::{ComponentHealth, HealthDetails, HealthResponse, HealthStatus};
use crate::routes::{self, auction, bid, health, user};
use crate::telemetry::metrics;
use crate::types::*;

use gavel_core::{Auction, Bid, PriceUpdate, User};

/// OpenAPI document for the Gavel API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Gavel API",
        version = "0.1.0",
        description = "Concurrent auction bidding with a distributed lock, cache-aside prices and live price updates",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8000", description = "Local Development")
    ),
    tags(
        (name = "Bids", description = "Bid placement through the per-auction critical section"),
        (name = "Auctions", description = "Auction items and their bid logs"),
        (name = "Users", description = "Bidder registration"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        bid::place_bid,
        user::create_user,
        auction::create_auction,
        auction::list_auctions,
        auction::get_auction,
        auction::list_auction_bids,
        routes::root,
        health::ping,
        health::liveness,
        health::readiness,
        metrics::metrics_handler,
    ),
    components(
        schemas(
            ApiError,
            ErrorCode,
            PlaceBidRequest,
            BidResponse,
            CreateUserRequest,
            CreateAuctionRequest,
            RootResponse,
            User,
            Auction,
            Bid,
            PriceUpdate,
            HealthResponse,
            HealthStatus,
            HealthDetails,
            ComponentHealth,
        )
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_generation() {
        let openapi = ApiDoc::openapi();
        assert_eq!(openapi.info.title, "Gavel API");
        assert!(openapi.paths.paths.contains_key("/api/v1/bid"));
        assert!(openapi.paths.paths.contains_key("/api/v1/auctions/{id}/bids"));
        assert!(openapi.paths.paths.contains_key("/health/ready"));
    }

    #[test]
    fn test_openapi_json_is_valid() -> Result<(), String> {
        let json = ApiDoc::to_json().map_err(|e| format!("Failed to serialize OpenAPI: {}", e))?;
        serde_json::from_str::<serde_json::Value>(&json)
            .map_err(|e| format!("Generated JSON invalid: {}", e))?;
        assert!(json.contains("PlaceBidRequest"));
        Ok(())
    }
}
