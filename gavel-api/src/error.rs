//! Error Types for the Gavel API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gavel_core::{EntityType, GavelError, Price, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code and represents
/// a category of error that can occur during API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Client Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Bid is not strictly higher than the current price
    BidTooLow,

    /// Entity with the same identifier already exists
    EntityAlreadyExists,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    /// Requested auction does not exist
    AuctionNotFound,

    /// Requested user does not exist
    UserNotFound,

    // ========================================================================
    // Contention (429)
    // ========================================================================
    /// Another bid holds the auction's lock; retry later
    LockContended,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Database operation failed
    DatabaseError,

    /// Key-value store (lock and price cache) is unreachable
    CacheUnavailable,

    /// Service is temporarily unavailable
    ServiceUnavailable,

    /// Database connection pool exhausted
    ConnectionPoolExhausted,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::BidTooLow
            | ErrorCode::EntityAlreadyExists => StatusCode::BAD_REQUEST,

            ErrorCode::EntityNotFound | ErrorCode::AuctionNotFound | ErrorCode::UserNotFound => {
                StatusCode::NOT_FOUND
            }

            ErrorCode::LockContended => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::CacheUnavailable
            | ErrorCode::ServiceUnavailable
            | ErrorCode::ConnectionPoolExhausted => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input",
            ErrorCode::BidTooLow => "Bid must be higher than the current price",
            ErrorCode::EntityAlreadyExists => "Entity already exists",
            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::AuctionNotFound => "Auction not found",
            ErrorCode::UserNotFound => "User not found",
            ErrorCode::LockContended => "Another bid is in progress, please retry",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::CacheUnavailable => "Cache service unavailable",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::ConnectionPoolExhausted => "Connection pool exhausted",
        }
    }

    /// Expected business outcomes that are not faults of the service.
    pub fn is_business_outcome(&self) -> bool {
        matches!(
            self,
            ErrorCode::LockContended | ErrorCode::BidTooLow | ErrorCode::AuctionNotFound
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn invalid_range(field: &str, min: impl fmt::Display, max: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::ValidationFailed,
            format!("{} must be between {} and {}", field, min, max),
        )
    }

    /// The current price is part of the message so bidders can re-bid.
    pub fn bid_too_low(current_price: Price) -> Self {
        Self::new(
            ErrorCode::BidTooLow,
            format!(
                "Bid must be higher than the current price. Current price: {}",
                current_price
            ),
        )
        .with_details(serde_json::json!({ "currentPrice": current_price }))
    }

    pub fn entity_already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EntityAlreadyExists, message)
    }

    pub fn entity_not_found(entity_type: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EntityNotFound,
            format!("{} with id {} not found", entity_type, id),
        )
    }

    pub fn auction_not_found(auction_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::AuctionNotFound,
            format!("Auction {} not found", auction_id),
        )
    }

    pub fn user_not_found(user_id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::UserNotFound, format!("User {} not found", user_id))
    }

    pub fn lock_contended() -> Self {
        Self::from_code(ErrorCode::LockContended)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn cache_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CacheUnavailable, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn connection_pool_exhausted() -> Self {
        Self::from_code(ErrorCode::ConnectionPoolExhausted)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Implement IntoResponse for ApiError to enable automatic error handling in Axum.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

/// Convert domain errors, keeping infrastructure details out of responses.
impl From<GavelError> for ApiError {
    fn from(err: GavelError) -> Self {
        match err {
            GavelError::Storage(storage) => storage.into(),
            GavelError::Config(e) => {
                tracing::error!(error = %e, "Configuration error");
                ApiError::internal_error("Service misconfigured")
            }
            GavelError::Serialization { reason } => {
                tracing::error!(reason = %reason, "Serialization error");
                ApiError::internal_error("Serialization failed")
            }
            GavelError::TaskFailed { reason } => {
                tracing::error!(reason = %reason, "Background task failed");
                ApiError::internal_error("Bid processing failed")
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::KeyValueUnavailable { reason } => {
                tracing::error!(reason = %reason, "Key-value store unavailable");
                ApiError::cache_unavailable("Cache service unavailable")
            }
            StorageError::RelationalUnavailable { reason } => {
                tracing::error!(reason = %reason, "Relational store unavailable");
                ApiError::service_unavailable("Database unavailable")
            }
            StorageError::NotFound { entity_type, id } => match entity_type {
                EntityType::Auction => ApiError::auction_not_found(id),
                EntityType::User => ApiError::user_not_found(id),
                EntityType::Bid => ApiError::entity_not_found("Bid", id),
            },
            StorageError::AlreadyExists {
                entity_type: EntityType::User,
                ..
            } => ApiError::entity_already_exists("User may already exist."),
            StorageError::AlreadyExists { entity_type, key } => {
                ApiError::entity_already_exists(format!("{:?} {} already exists", entity_type, key))
            }
            StorageError::TransactionFailed { reason } => {
                tracing::error!(reason = %reason, "Transaction failed");
                ApiError::database_error("Database operation failed")
            }
            StorageError::CorruptValue { key, reason } => {
                tracing::error!(key = %key, reason = %reason, "Corrupt stored value");
                ApiError::internal_error("Stored value is corrupt")
            }
            StorageError::LockPoisoned => ApiError::internal_error("Storage lock poisoned"),
        }
    }
}

/// Convert from tokio_postgres::Error to ApiError.
impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        // Log the full error for debugging
        tracing::error!("Database error: {:?}", err);

        // Return a generic database error to avoid leaking internal details
        ApiError::database_error("Database operation failed")
    }
}

/// Convert from deadpool_postgres::PoolError to ApiError.
impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);

        match err {
            deadpool_postgres::PoolError::Timeout(_) => ApiError::connection_pool_exhausted(),
            deadpool_postgres::PoolError::Closed => {
                ApiError::service_unavailable("Database connection pool is closed")
            }
            _ => ApiError::database_error("Failed to acquire database connection"),
        }
    }
}

/// Convert from redis::RedisError to ApiError.
impl From<redis::RedisError> for ApiError {
    fn from(err: redis::RedisError) -> Self {
        tracing::error!("Redis error: {:?}", err);
        ApiError::cache_unavailable("Cache service unavailable")
    }
}

/// Convert from serde_json::Error to ApiError.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {:?}", err);
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::LockContended.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorCode::AuctionNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::BidTooLow.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::EntityAlreadyExists.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::CacheUnavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ErrorCode::DatabaseError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_bid_too_low_cites_current_price() {
        let err = ApiError::bid_too_low(150);
        assert_eq!(err.code, ErrorCode::BidTooLow);
        assert!(err.message.contains("150"));
        assert_eq!(
            err.details,
            Some(serde_json::json!({ "currentPrice": 150 }))
        );
    }

    #[test]
    fn test_storage_error_mapping() {
        let err: ApiError = GavelError::from(StorageError::KeyValueUnavailable {
            reason: "connection refused".to_string(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::CacheUnavailable);
        assert!(!err.message.contains("refused"), "details must not leak");

        let err: ApiError = StorageError::NotFound {
            entity_type: EntityType::Auction,
            id: 9,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.message.contains('9'));

        let err: ApiError = StorageError::AlreadyExists {
            entity_type: EntityType::User,
            key: "alice".to_string(),
        }
        .into();
        assert_eq!(err.message, "User may already exist.");
    }

    #[test]
    fn test_api_error_serialization() {
        let err = ApiError::lock_contended();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "LOCK_CONTENDED");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn test_business_outcomes() {
        assert!(ErrorCode::LockContended.is_business_outcome());
        assert!(ErrorCode::BidTooLow.is_business_outcome());
        assert!(!ErrorCode::CacheUnavailable.is_business_outcome());
    }

    #[test]
    fn test_task_failure_is_internal() {
        let err: ApiError = GavelError::TaskFailed {
            reason: "task panicked".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(!err.message.contains("panicked"));
    }
}
