//! Request and response bodies for the REST API.

use gavel_core::{AuctionId, Price, UserId};
use serde::{Deserialize, Serialize};

// ============================================================================
// BIDS
// ============================================================================

/// Body of `POST /api/v1/bid`.
///
/// Accepts both camelCase and snake_case field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PlaceBidRequest {
    #[serde(rename = "bidderId", alias = "user_id", alias = "bidder_id")]
    pub bidder_id: UserId,
    #[serde(rename = "auctionId", alias = "auction_id")]
    pub auction_id: AuctionId,
    pub amount: Price,
}

/// Success body of `POST /api/v1/bid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BidResponse {
    /// Always `"success"`
    pub status: String,
    #[serde(rename = "newPrice")]
    pub new_price: Price,
}

impl BidResponse {
    pub fn success(new_price: Price) -> Self {
        Self {
            status: "success".to_string(),
            new_price,
        }
    }
}

// ============================================================================
// USERS AND AUCTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateUserRequest {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateAuctionRequest {
    pub item_name: String,
    /// Starting price; defaults to 0
    #[serde(default)]
    pub current_price: Price,
}

// ============================================================================
// SERVICE ROOT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RootResponse {
    pub status: String,
    pub message: String,
}
