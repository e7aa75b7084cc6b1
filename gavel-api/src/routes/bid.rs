//! Bid REST API Route
//!
//! `POST /api/v1/bid` runs one bid through the critical section.
//! Rejections map to 429 (lock contended), 404 (unknown auction) and
//! 400 (bid too low, with the current price in the message).

use axum::{extract::State, routing::post, Json, Router};

use crate::error::{ApiError, ApiResult};
use crate::services::{BidOutcome, BidService};
use crate::state::AppState;
use crate::types::{BidResponse, PlaceBidRequest};

/// POST /api/v1/bid - Place a bid
#[utoipa::path(
    post,
    path = "/api/v1/bid",
    tag = "Bids",
    request_body = PlaceBidRequest,
    responses(
        (status = 200, description = "Bid accepted", body = BidResponse),
        (status = 400, description = "Bid not higher than the current price", body = ApiError),
        (status = 404, description = "Auction not found", body = ApiError),
        (status = 429, description = "Another bid on this auction is in progress", body = ApiError),
        (status = 503, description = "Cache or database unavailable", body = ApiError),
    ),
)]
pub async fn place_bid(
    State(bids): State<BidService>,
    Json(req): Json<PlaceBidRequest>,
) -> ApiResult<Json<BidResponse>> {
    match bids
        .place_bid(req.auction_id, req.bidder_id, req.amount)
        .await?
    {
        BidOutcome::Accepted { new_price } => Ok(Json(BidResponse::success(new_price))),
        BidOutcome::Rejected(rejection) => Err(rejection.into_api_error(req.auction_id)),
    }
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/bid", post(place_bid))
}
