//! Gavel API - Concurrent Auction Bidding Service
//!
//! REST and WebSocket surface over the bid critical section. Bids are
//! serialized per auction by a lock in the shared key-value store, checked
//! against a cache-aside price, written back to PostgreSQL off the request
//! path, and broadcast to every connected observer through pub/sub.

pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod macros;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod persister;
pub mod redis_store;
pub mod routes;
pub mod runtime;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod ws;

// Re-export commonly used types
pub use broadcast::{ChangePublisher, ConnectionRegistry, PublisherHandle};
pub use config::{ApiConfig, RedisConfig};
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use persister::{PersisterHandle, PersisterStats, WriteBackPersister};
pub use redis_store::RedisStore;
pub use routes::create_router;
pub use runtime::GavelRuntime;
pub use services::{BidOutcome, BidRejection, BidService, LockService, PriceCache};
pub use state::AppState;
pub use types::*;
