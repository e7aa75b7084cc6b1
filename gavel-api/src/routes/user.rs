//! User REST API Routes

use axum::{extract::State, routing::post, Json, Router};
use gavel_core::User;
use gavel_storage::AuctionRepository;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, Repository};
use crate::types::CreateUserRequest;

const MAX_USERNAME_LEN: usize = 50;

/// POST /api/v1/users - Register a bidder
#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "Users",
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "User created", body = User),
        (status = 400, description = "Invalid or duplicate username", body = ApiError),
    ),
)]
pub async fn create_user(
    State(repo): State<Repository>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<Json<User>> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(ApiError::validation_failed("username must not be empty"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(ApiError::invalid_range("username length", 1, MAX_USERNAME_LEN));
    }

    let user = repo.create_user(username).await?;
    tracing::info!(user_id = user.id, username = %user.username, "User created");
    Ok(Json(user))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/users", post(create_user))
}
