//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use gavel_storage::{AuctionRepository, KeyValueStore};

use crate::broadcast::ConnectionRegistry;
use crate::services::BidService;

/// Durable store handle used by the CRUD routes.
pub type Repository = Arc<dyn AuctionRepository>;

/// Key-value store handle, used by readiness checks.
pub type KvStore = Arc<dyn KeyValueStore>;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub bids: BidService,
    pub repo: Repository,
    pub kv: KvStore,
    /// Live observer connections.
    pub registry: Arc<ConnectionRegistry>,
    pub start_time: Instant,
}

crate::impl_from_ref!(BidService, bids);
crate::impl_from_ref!(Repository, repo);
crate::impl_from_ref!(KvStore, kv);
crate::impl_from_ref!(Arc<ConnectionRegistry>, registry);
