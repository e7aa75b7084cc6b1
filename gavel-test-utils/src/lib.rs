//! Gavel Test Utilities
//!
//! Centralized test infrastructure for the Gavel workspace:
//! - In-memory backends re-exported from gavel-storage
//! - Fixtures that seed a repository with a bidder and an auction
//! - Proptest generators for prices, usernames and bid sequences

// Re-export in-memory storage from its source crate
pub use gavel_storage::{InMemoryAuctionRepository, InMemoryKvStore};

// Re-export core types for convenience
pub use gavel_core::{
    AcceptedBid, Auction, AuctionId, Bid, GavelError, GavelResult, Price, PriceUpdate,
    StorageError, User, UserId,
};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// Any realistic price, including zero.
    pub fn arb_price() -> impl Strategy<Value = Price> {
        0i64..1_000_000
    }

    /// Usernames that pass request validation.
    pub fn arb_username() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{2,15}"
    }

    /// Bid amounts in arrival order. Unsorted and with repeats, so some
    /// are expected to lose.
    pub fn arb_bid_sequence(max_len: usize) -> impl Strategy<Value = Vec<Price>> {
        prop::collection::vec(1i64..10_000, 1..=max_len.max(1))
    }

    pub fn arb_accepted_bid() -> impl Strategy<Value = AcceptedBid> {
        (1i64..100, 1i64..100, arb_price()).prop_map(|(auction_id, bidder_id, amount)| {
            AcceptedBid {
                auction_id,
                bidder_id,
                amount,
            }
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use gavel_storage::AuctionRepository;
    use std::sync::Arc;

    /// Repository holding one bidder (`alice`, id 1) and one auction
    /// (`Vintage Watch`, id 1) at `starting_price`.
    pub async fn seeded_repository(
        starting_price: Price,
    ) -> GavelResult<Arc<InMemoryAuctionRepository>> {
        let repo = Arc::new(InMemoryAuctionRepository::new());
        repo.create_user("alice").await?;
        repo.create_auction("Vintage Watch", starting_price).await?;
        Ok(repo)
    }

    /// Add another bidder and return its id.
    pub async fn add_bidder(repo: &InMemoryAuctionRepository, username: &str) -> GavelResult<UserId> {
        Ok(repo.create_user(username).await?.id)
    }

    /// Add another auction and return its id.
    pub async fn add_auction(
        repo: &InMemoryAuctionRepository,
        item_name: &str,
        starting_price: Price,
    ) -> GavelResult<AuctionId> {
        Ok(repo.create_auction(item_name, starting_price).await?.id)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::generators::*;
    use gavel_storage::AuctionRepository;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_seeded_repository_ids() {
        let repo = seeded_repository(100).await.unwrap();
        assert_eq!(repo.current_price(1).await.unwrap(), Some(100));
        let second = add_auction(&repo, "Oil Painting", 0).await.unwrap();
        assert_eq!(second, 2);
        assert_eq!(add_bidder(&repo, "bob").await.unwrap(), 2);
    }

    proptest! {
        #[test]
        fn prop_bid_sequence_is_non_empty(seq in arb_bid_sequence(8)) {
            prop_assert!(!seq.is_empty() && seq.len() <= 8);
            prop_assert!(seq.iter().all(|p| *p >= 1));
        }
    }
}
