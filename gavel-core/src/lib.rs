//! Gavel Core - Entity Types
//!
//! Plain data shared by every other crate in the workspace: identifiers,
//! the durable auction/bid/user records, the events emitted by an accepted
//! bid, and the key naming used in the shared key-value store.
//! This crate contains ONLY data types - no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;
pub mod keys;

pub use error::{ConfigError, GavelError, GavelResult, StorageError};
pub use keys::{lock_key, lock_name, price_key, DEFAULT_PRICE_CHANNEL, LOCK_KEY_PREFIX};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Auction identifier (relational serial id).
pub type AuctionId = i64;

/// User (bidder) identifier.
pub type UserId = i64;

/// Bid identifier.
pub type BidId = i64;

/// Prices are whole currency units.
pub type Price = i64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Kinds of durable entity, used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum EntityType {
    User,
    Auction,
    Bid,
}

// ============================================================================
// DURABLE RECORDS
// ============================================================================

/// A registered bidder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct User {
    pub id: UserId,
    pub username: String,
}

/// An auction item and its durable current price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Auction {
    pub id: AuctionId,
    pub item_name: String,
    /// Non-decreasing once any bid has been accepted.
    pub current_price: Price,
}

/// One row of the append-only bid log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Bid {
    pub id: BidId,
    pub user_id: UserId,
    pub auction_id: AuctionId,
    pub price: Price,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

// ============================================================================
// BID EVENTS
// ============================================================================

/// A bid that won the critical section and is now reflected in the cache.
///
/// Handed to the write-back persister; it becomes a [`Bid`] row once durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedBid {
    pub auction_id: AuctionId,
    pub bidder_id: UserId,
    pub amount: Price,
}

/// Price change published on the shared channel and sent verbatim to
/// every observer connection.
///
/// Wire format: `{"auctionId":1,"newPrice":150}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    pub auction_id: AuctionId,
    pub new_price: Price,
}

impl PriceUpdate {
    pub fn new(auction_id: AuctionId, new_price: Price) -> Self {
        Self {
            auction_id,
            new_price,
        }
    }

    /// Encode as the channel payload.
    pub fn to_payload(&self) -> GavelResult<String> {
        serde_json::to_string(self).map_err(|e| GavelError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Decode a channel payload.
    pub fn from_payload(payload: &str) -> GavelResult<Self> {
        serde_json::from_str(payload).map_err(|e| GavelError::Serialization {
            reason: e.to_string(),
        })
    }
}

impl From<AcceptedBid> for PriceUpdate {
    fn from(bid: AcceptedBid) -> Self {
        Self::new(bid.auction_id, bid.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_update_wire_format() {
        let update = PriceUpdate::new(1, 150);
        let payload = update.to_payload().unwrap();
        assert_eq!(payload, r#"{"auctionId":1,"newPrice":150}"#);
    }

    #[test]
    fn test_price_update_rejects_garbage() {
        let err = PriceUpdate::from_payload("12000").unwrap_err();
        assert!(matches!(err, GavelError::Serialization { .. }));
    }

    #[test]
    fn test_price_update_from_accepted_bid() {
        let bid = AcceptedBid {
            auction_id: 7,
            bidder_id: 3,
            amount: 900,
        };
        assert_eq!(PriceUpdate::from(bid), PriceUpdate::new(7, 900));
    }

    #[cfg(feature = "openapi")]
    #[test]
    fn test_bid_schema_documents_timestamp_as_date_time() {
        use utoipa::PartialSchema;

        let schema = serde_json::to_value(Bid::schema()).unwrap();
        let created_at = &schema["properties"]["created_at"];
        assert_eq!(created_at["type"], "string");
        assert_eq!(created_at["format"], "date-time");
    }
}
