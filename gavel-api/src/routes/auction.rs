//! Auction REST API Routes
//!
//! Plain create/read over the repository. Prices change only through
//! `POST /api/v1/bid`.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use gavel_core::{Auction, AuctionId, Bid};
use gavel_storage::AuctionRepository;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, Repository};
use crate::types::CreateAuctionRequest;

/// POST /api/v1/auctions - Create an auction item
#[utoipa::path(
    post,
    path = "/api/v1/auctions",
    tag = "Auctions",
    request_body = CreateAuctionRequest,
    responses(
        (status = 200, description = "Auction created", body = Auction),
        (status = 400, description = "Invalid input", body = ApiError),
    ),
)]
pub async fn create_auction(
    State(repo): State<Repository>,
    Json(req): Json<CreateAuctionRequest>,
) -> ApiResult<Json<Auction>> {
    let item_name = req.item_name.trim();
    if item_name.is_empty() {
        return Err(ApiError::validation_failed("item_name must not be empty"));
    }
    if req.current_price < 0 {
        return Err(ApiError::invalid_input("current_price must not be negative"));
    }

    let auction = repo.create_auction(item_name, req.current_price).await?;
    tracing::info!(
        auction_id = auction.id,
        item_name = %auction.item_name,
        current_price = auction.current_price,
        "Auction created"
    );
    Ok(Json(auction))
}

/// GET /api/v1/auctions - List all auctions
#[utoipa::path(
    get,
    path = "/api/v1/auctions",
    tag = "Auctions",
    responses(
        (status = 200, description = "All auctions ordered by id", body = Vec<Auction>),
    ),
)]
pub async fn list_auctions(State(repo): State<Repository>) -> ApiResult<Json<Vec<Auction>>> {
    Ok(Json(repo.list_auctions().await?))
}

/// GET /api/v1/auctions/{id} - Get one auction
#[utoipa::path(
    get,
    path = "/api/v1/auctions/{id}",
    tag = "Auctions",
    params(("id" = i64, Path, description = "Auction ID")),
    responses(
        (status = 200, description = "Auction", body = Auction),
        (status = 404, description = "Auction not found", body = ApiError),
    ),
)]
pub async fn get_auction(
    State(repo): State<Repository>,
    Path(auction_id): Path<AuctionId>,
) -> ApiResult<Json<Auction>> {
    repo.get_auction(auction_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::auction_not_found(auction_id))
}

/// GET /api/v1/auctions/{id}/bids - Durable bid log, newest first
#[utoipa::path(
    get,
    path = "/api/v1/auctions/{id}/bids",
    tag = "Auctions",
    params(("id" = i64, Path, description = "Auction ID")),
    responses(
        (status = 200, description = "Persisted bids, newest first", body = Vec<Bid>),
        (status = 404, description = "Auction not found", body = ApiError),
    ),
)]
pub async fn list_auction_bids(
    State(repo): State<Repository>,
    Path(auction_id): Path<AuctionId>,
) -> ApiResult<Json<Vec<Bid>>> {
    if repo.get_auction(auction_id).await?.is_none() {
        return Err(ApiError::auction_not_found(auction_id));
    }
    Ok(Json(repo.list_bids(auction_id).await?))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/auctions", get(list_auctions).post(create_auction))
        .route("/auctions/:id", get(get_auction))
        .route("/auctions/:id/bids", get(list_auction_bids))
}
