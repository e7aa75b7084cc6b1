//! Gavel Storage - Storage Traits and In-Memory Implementation
//!
//! Three seams separate the bidding logic from its backing services:
//!
//! - [`KeyValueStore`]: atomic test-and-set with expiry, plain get/set and an
//!   ownership-checked delete. Backs the lock service and the price cache.
//! - [`MessageBus`]: one-to-many publish/subscribe on named channels.
//! - [`AuctionRepository`]: the relational store of users, auctions and bids.
//!
//! The Redis and PostgreSQL implementations live in gavel-api; the in-memory
//! ones here back tests and local runs.

pub mod memory;

pub use memory::{InMemoryAuctionRepository, InMemoryKvStore};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use gavel_core::{AcceptedBid, Auction, AuctionId, Bid, GavelResult, Price, User};
use std::time::Duration;

// ============================================================================
// KEY-VALUE STORE
// ============================================================================

/// Shared key-value store with atomic primitives.
///
/// Every method must fail with a storage error when the store cannot be
/// reached. Callers rely on that to tell "key absent" apart from "unknown".
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Set `key` to `value` with expiry `ttl`, only if `key` is absent.
    ///
    /// Returns `true` when this call created the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> GavelResult<bool>;

    /// Read a key.
    async fn get(&self, key: &str) -> GavelResult<Option<String>>;

    /// Unconditionally overwrite a key, without expiry.
    async fn set(&self, key: &str, value: &str) -> GavelResult<()>;

    /// Delete `key` only if it currently holds `expected`, as one atomic step.
    ///
    /// Returns `true` when the key was deleted.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> GavelResult<bool>;

    /// Round-trip check used by readiness probes.
    async fn ping(&self) -> GavelResult<()>;
}

// ============================================================================
// MESSAGE BUS
// ============================================================================

/// Publish/subscribe over named channels carrying string payloads.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a payload, returning how many subscribers received it.
    async fn publish(&self, channel: &str, payload: &str) -> GavelResult<usize>;

    /// Subscribe to a channel.
    ///
    /// The stream ends when the subscription is lost; callers resubscribe.
    async fn subscribe(&self, channel: &str) -> GavelResult<BoxStream<'static, String>>;
}

// ============================================================================
// RELATIONAL REPOSITORY
// ============================================================================

/// Durable store of users, auctions and the bid log.
#[async_trait]
pub trait AuctionRepository: Send + Sync {
    /// Durable current price, or `None` when the auction does not exist.
    async fn current_price(&self, auction_id: AuctionId) -> GavelResult<Option<Price>>;

    /// Append a bid row and raise the auction's current price, in one
    /// transaction.
    ///
    /// The price update never lowers a stored price, so replaying an older
    /// bid after a newer one leaves the newer price in place.
    async fn persist_bid(&self, bid: &AcceptedBid) -> GavelResult<Bid>;

    /// Create a user. Duplicate usernames fail with `AlreadyExists`.
    async fn create_user(&self, username: &str) -> GavelResult<User>;

    /// Create an auction with a starting price.
    async fn create_auction(&self, item_name: &str, starting_price: Price) -> GavelResult<Auction>;

    async fn get_auction(&self, auction_id: AuctionId) -> GavelResult<Option<Auction>>;

    /// All auctions ordered by id.
    async fn list_auctions(&self) -> GavelResult<Vec<Auction>>;

    /// Bid log of one auction, newest first.
    async fn list_bids(&self, auction_id: AuctionId) -> GavelResult<Vec<Bid>>;

    /// Round-trip check used by readiness probes.
    async fn ping(&self) -> GavelResult<()>;
}
