//! Bid Service
//!
//! The bid critical section. For one auction, at most one bid at a time
//! runs between lock acquisition and release:
//!
//! 1. take the auction lock, or reject as contended without waiting
//! 2. read the cached price, falling back to the repository on a miss
//! 3. reject unless the amount is strictly higher
//! 4. write the new price to the cache
//! 5. queue the bid for persistence and the price change for broadcast
//! 6. release the lock
//!
//! Step 5 only enqueues, so it happens under the lock. That keeps both
//! queues in acceptance order for each auction.

use dashmap::DashMap;
use gavel_core::{
    lock_name, AcceptedBid, AuctionId, GavelError, GavelResult, Price, PriceUpdate, UserId,
};
use gavel_storage::AuctionRepository;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{LockService, PriceCache};
use crate::broadcast::PublisherHandle;
use crate::error::ApiError;
use crate::persister::PersisterHandle;
use crate::telemetry::metrics;

// ============================================================================
// OUTCOMES
// ============================================================================

/// Why a bid was turned away. These are expected outcomes, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidRejection {
    /// Another bid on the same auction holds the lock. Retry later.
    LockContended,
    /// The auction does not exist.
    NotFound,
    /// The amount does not beat the current price.
    BidTooLow { current_price: Price },
}

impl BidRejection {
    fn label(&self) -> &'static str {
        match self {
            BidRejection::LockContended => "lock_contended",
            BidRejection::NotFound => "not_found",
            BidRejection::BidTooLow { .. } => "bid_too_low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidOutcome {
    Accepted { new_price: Price },
    Rejected(BidRejection),
}

impl BidOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, BidOutcome::Accepted { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            BidOutcome::Accepted { .. } => "accepted",
            BidOutcome::Rejected(rejection) => rejection.label(),
        }
    }
}

impl BidRejection {
    pub fn into_api_error(self, auction_id: AuctionId) -> ApiError {
        match self {
            BidRejection::LockContended => ApiError::lock_contended(),
            BidRejection::NotFound => ApiError::auction_not_found(auction_id),
            BidRejection::BidTooLow { current_price } => ApiError::bid_too_low(current_price),
        }
    }
}

// ============================================================================
// INSTRUMENTATION
// ============================================================================

/// Counts bids currently inside the critical section, per auction.
///
/// `max_seen` is the highest per-auction count ever observed; it stays at 1
/// as long as the lock does its job.
#[derive(Debug, Default)]
pub struct CriticalSectionProbe {
    active: DashMap<AuctionId, usize>,
    max_seen: AtomicUsize,
}

impl CriticalSectionProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_seen(&self) -> usize {
        self.max_seen.load(Ordering::SeqCst)
    }

    fn enter(&self, auction_id: AuctionId) -> ProbeGuard<'_> {
        let now = {
            let mut active = self.active.entry(auction_id).or_insert(0);
            *active += 1;
            *active
        };
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        ProbeGuard {
            probe: self,
            auction_id,
        }
    }
}

struct ProbeGuard<'a> {
    probe: &'a CriticalSectionProbe,
    auction_id: AuctionId,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.probe
            .active
            .remove_if_mut(&self.auction_id, |_, active| {
                *active = active.saturating_sub(1);
                *active == 0
            });
    }
}

// ============================================================================
// SERVICE
// ============================================================================

#[derive(Clone)]
pub struct BidService {
    locks: LockService,
    cache: PriceCache,
    repo: Arc<dyn AuctionRepository>,
    persister: PersisterHandle,
    publisher: PublisherHandle,
    lock_ttl: Duration,
    probe: Arc<CriticalSectionProbe>,
}

impl BidService {
    pub fn new(
        locks: LockService,
        cache: PriceCache,
        repo: Arc<dyn AuctionRepository>,
        persister: PersisterHandle,
        publisher: PublisherHandle,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            locks,
            cache,
            repo,
            persister,
            publisher,
            lock_ttl,
            probe: Arc::new(CriticalSectionProbe::new()),
        }
    }

    pub fn probe(&self) -> Arc<CriticalSectionProbe> {
        Arc::clone(&self.probe)
    }

    /// Place one bid.
    ///
    /// Business rejections come back as `Ok(BidOutcome::Rejected(..))`.
    /// `Err` means the key-value store or the repository could not be
    /// reached, and the bid must be treated as not placed.
    ///
    /// The critical section runs on its own task. Dropping the returned
    /// future (client gone, server shutting down) does not interrupt it, so
    /// a price written to the cache is always handed to the persister and
    /// the publisher.
    pub async fn place_bid(
        &self,
        auction_id: AuctionId,
        bidder_id: UserId,
        amount: Price,
    ) -> GavelResult<BidOutcome> {
        let service = self.clone();
        let task = tokio::spawn(async move {
            service
                .place_bid_detached(auction_id, bidder_id, amount)
                .await
        });
        task.await.map_err(|e| GavelError::TaskFailed {
            reason: e.to_string(),
        })?
    }

    async fn place_bid_detached(
        &self,
        auction_id: AuctionId,
        bidder_id: UserId,
        amount: Price,
    ) -> GavelResult<BidOutcome> {
        let result = self.run(auction_id, bidder_id, amount).await;

        if let Some(m) = metrics() {
            match &result {
                Ok(outcome) => m.record_bid(outcome.label()),
                Err(_) => m.record_bid("error"),
            }
        }
        match &result {
            Ok(BidOutcome::Accepted { new_price }) => {
                debug!(auction_id, bidder_id, new_price, "Bid accepted");
            }
            Ok(BidOutcome::Rejected(rejection)) => {
                debug!(auction_id, bidder_id, amount, ?rejection, "Bid rejected");
            }
            Err(e) => {
                error!(auction_id, bidder_id, amount, error = %e, "Bid failed");
            }
        }
        result
    }

    async fn run(
        &self,
        auction_id: AuctionId,
        bidder_id: UserId,
        amount: Price,
    ) -> GavelResult<BidOutcome> {
        let name = lock_name(auction_id);
        let Some(guard) = self.locks.try_lock(&name, self.lock_ttl).await? else {
            return Ok(BidOutcome::Rejected(BidRejection::LockContended));
        };

        let inside = self.probe.enter(auction_id);
        let result = self.critical_section(auction_id, bidder_id, amount).await;
        drop(inside);

        let held = guard.held_for();
        if let Some(m) = metrics() {
            m.record_critical_section(held.as_secs_f64());
        }

        // The outcome stands whatever happens here; an unreleased lock
        // expires on its own.
        match guard.release().await {
            Ok(released) => {
                if let Some(m) = metrics() {
                    m.record_lock_release(released);
                }
                if !released {
                    warn!(
                        auction_id,
                        held_ms = held.as_millis() as u64,
                        ttl_ms = self.lock_ttl.as_millis() as u64,
                        "Auction lock expired before release"
                    );
                }
            }
            Err(e) => {
                error!(auction_id, error = %e, "Failed to release auction lock");
            }
        }

        result
    }

    async fn critical_section(
        &self,
        auction_id: AuctionId,
        bidder_id: UserId,
        amount: Price,
    ) -> GavelResult<BidOutcome> {
        let current_price = match self.cache.get_price(auction_id).await? {
            Some(price) => price,
            None => match self.repo.current_price(auction_id).await? {
                Some(price) => {
                    self.cache.set_price(auction_id, price).await?;
                    price
                }
                None => return Ok(BidOutcome::Rejected(BidRejection::NotFound)),
            },
        };

        if amount <= current_price {
            return Ok(BidOutcome::Rejected(BidRejection::BidTooLow { current_price }));
        }

        self.cache.set_price(auction_id, amount).await?;

        let accepted = AcceptedBid {
            auction_id,
            bidder_id,
            amount,
        };
        self.persister.submit(accepted);
        self.publisher.publish(PriceUpdate::from(accepted));

        Ok(BidOutcome::Accepted { new_price: amount })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ChangePublisher;
    use crate::error::ErrorCode;
    use crate::persister::WriteBackPersister;
    use gavel_core::StorageError;
    use gavel_storage::{InMemoryAuctionRepository, InMemoryKvStore, KeyValueStore};

    struct Fixture {
        kv: Arc<InMemoryKvStore>,
        repo: Arc<InMemoryAuctionRepository>,
        service: BidService,
        _persister: WriteBackPersister,
        _publisher: ChangePublisher,
    }

    async fn fixture(starting_price: Price) -> Fixture {
        let kv = Arc::new(InMemoryKvStore::new());
        let repo = Arc::new(InMemoryAuctionRepository::new());
        repo.create_user("alice").await.unwrap();
        repo.create_auction("Vintage Watch", starting_price).await.unwrap();

        let persister = WriteBackPersister::spawn(repo.clone(), 1, 16);
        let publisher = ChangePublisher::spawn(kv.clone(), "auction_updates", 16);
        let service = BidService::new(
            LockService::new(kv.clone()),
            PriceCache::new(kv.clone()),
            repo.clone(),
            persister.handle(),
            publisher.handle(),
            Duration::from_secs(5),
        );
        Fixture {
            kv,
            repo,
            service,
            _persister: persister,
            _publisher: publisher,
        }
    }

    #[tokio::test]
    async fn test_cache_miss_falls_back_to_repository() {
        let f = fixture(100).await;
        let outcome = f.service.place_bid(1, 1, 150).await.unwrap();
        assert_eq!(outcome, BidOutcome::Accepted { new_price: 150 });
        assert_eq!(f.kv.get("auction:1:price").await.unwrap().as_deref(), Some("150"));
        assert!(!f.kv.contains_key("lock:auction:1"));
    }

    #[tokio::test]
    async fn test_tie_is_rejected() {
        let f = fixture(100).await;
        let outcome = f.service.place_bid(1, 1, 100).await.unwrap();
        assert_eq!(
            outcome,
            BidOutcome::Rejected(BidRejection::BidTooLow { current_price: 100 })
        );
        // The miss still populated the cache.
        assert_eq!(f.kv.get("auction:1:price").await.unwrap().as_deref(), Some("100"));
    }

    #[tokio::test]
    async fn test_held_lock_rejects_without_waiting() {
        let f = fixture(100).await;
        let other = LockService::new(f.kv.clone());
        let _held = other.acquire("auction:1", Duration::from_secs(5)).await.unwrap();

        let outcome = f.service.place_bid(1, 1, 150).await.unwrap();
        assert_eq!(outcome, BidOutcome::Rejected(BidRejection::LockContended));
        assert!(!f.kv.contains_key("auction:1:price"));
    }

    #[tokio::test]
    async fn test_store_outage_is_an_error() {
        let f = fixture(100).await;
        f.kv.set_available(false);
        let err = f.service.place_bid(1, 1, 150).await.unwrap_err();
        assert!(matches!(
            err,
            GavelError::Storage(StorageError::KeyValueUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_repository_outage_on_miss_is_an_error_and_releases() {
        let f = fixture(100).await;
        f.repo.set_available(false);
        let err = f.service.place_bid(1, 1, 150).await.unwrap_err();
        assert!(matches!(
            err,
            GavelError::Storage(StorageError::RelationalUnavailable { .. })
        ));
        assert!(!f.kv.contains_key("lock:auction:1"));
    }

    #[test]
    fn test_rejection_to_api_error() {
        assert_eq!(
            BidRejection::LockContended.into_api_error(1).code,
            ErrorCode::LockContended
        );
        assert_eq!(
            BidRejection::NotFound.into_api_error(9).code,
            ErrorCode::AuctionNotFound
        );
        let err = BidRejection::BidTooLow { current_price: 150 }.into_api_error(1);
        assert_eq!(err.code, ErrorCode::BidTooLow);
        assert!(err.message.contains("150"));
    }

    #[test]
    fn test_probe_tracks_per_auction_maximum() {
        let probe = CriticalSectionProbe::new();
        let a = probe.enter(1);
        let b = probe.enter(2);
        assert_eq!(probe.max_seen(), 1);
        drop(a);
        drop(b);
        let _c = probe.enter(1);
        assert_eq!(probe.max_seen(), 1);
    }
}
