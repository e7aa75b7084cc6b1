//! Property-Based Tests for the Auction Lock and Bid Ordering
//!
//! **Property 1: Owner-only release**
//!
//! A lock is only ever deleted by the holder that set it. Releasing twice,
//! or releasing after the TTL handed the lock to someone else, is a no-op.
//!
//! **Property 2: Monotonic acceptance**
//!
//! For any sequence of bids on one auction, the accepted amounts are
//! strictly increasing and the cached price ends at the highest of them.

use std::sync::Arc;
use std::time::Duration;

use gavel_api::{ApiConfig, BidOutcome, GavelRuntime, LockService};
use gavel_storage::{AuctionRepository, KeyValueStore};
use gavel_test_utils::fixtures::seeded_repository;
use gavel_test_utils::generators::arb_bid_sequence;
use gavel_test_utils::InMemoryKvStore;
use proptest::prelude::*;
use tokio::runtime::Runtime;

// ============================================================================
// LOCK OWNERSHIP
// ============================================================================

#[tokio::test]
async fn double_release_is_a_noop() {
    let kv = Arc::new(InMemoryKvStore::new());
    let locks = LockService::new(kv.clone());

    let token = locks
        .acquire("auction:1", Duration::from_secs(5))
        .await
        .unwrap()
        .expect("free lock");
    assert!(locks.release("auction:1", &token).await.unwrap());
    assert!(!locks.release("auction:1", &token).await.unwrap());
    assert!(!kv.contains_key("lock:auction:1"));
}

#[tokio::test]
async fn stale_holder_cannot_release_new_holder() {
    let kv = Arc::new(InMemoryKvStore::new());
    let locks = LockService::new(kv.clone());

    let stale = locks
        .acquire("auction:1", Duration::from_millis(30))
        .await
        .unwrap()
        .expect("free lock");
    tokio::time::sleep(Duration::from_millis(60)).await;

    let fresh = locks
        .acquire("auction:1", Duration::from_secs(5))
        .await
        .unwrap()
        .expect("expired lock is free again");
    assert_ne!(stale, fresh);

    assert!(!locks.release("auction:1", &stale).await.unwrap());
    assert_eq!(
        kv.get("lock:auction:1").await.unwrap().as_deref(),
        Some(fresh.as_str())
    );
    assert!(locks.release("auction:1", &fresh).await.unwrap());
}

#[tokio::test]
async fn guard_release_frees_lock() {
    let kv = Arc::new(InMemoryKvStore::new());
    let locks = LockService::new(kv.clone());

    let guard = locks
        .try_lock("auction:7", Duration::from_secs(5))
        .await
        .unwrap()
        .expect("free lock");
    assert_eq!(guard.name(), "auction:7");
    assert!(locks
        .try_lock("auction:7", Duration::from_secs(5))
        .await
        .unwrap()
        .is_none());
    assert!(guard.release().await.unwrap());
    assert!(!kv.contains_key("lock:auction:7"));
}

#[tokio::test]
async fn dropped_guard_releases_in_background() {
    let kv = Arc::new(InMemoryKvStore::new());
    let locks = LockService::new(kv.clone());

    let guard = locks
        .try_lock("auction:3", Duration::from_secs(30))
        .await
        .unwrap()
        .expect("free lock");
    drop(guard);

    for _ in 0..50 {
        if !kv.contains_key("lock:auction:3") {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("dropped guard never released its lock");
}

// ============================================================================
// MONOTONIC ACCEPTANCE
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_accepted_prices_strictly_increase(
        start in 0i64..500,
        amounts in arb_bid_sequence(12),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let kv = Arc::new(InMemoryKvStore::new());
            let repo = seeded_repository(start).await.unwrap();
            let runtime = GavelRuntime::start(&ApiConfig::default(), kv.clone(), kv.clone(), repo.clone());
            let bids = runtime.state().bids;

            let mut accepted = Vec::new();
            for amount in &amounts {
                match bids.place_bid(1, 1, *amount).await.unwrap() {
                    BidOutcome::Accepted { new_price } => accepted.push(new_price),
                    BidOutcome::Rejected(_) => {}
                }
            }

            prop_assert!(accepted.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(accepted.iter().all(|p| *p > start));

            let expected = accepted.last().copied().unwrap_or(start);
            let cached = kv.get("auction:1:price").await.unwrap();
            prop_assert_eq!(cached, Some(expected.to_string()));

            runtime.shutdown().await;
            prop_assert_eq!(repo.current_price(1).await.unwrap(), Some(expected));
            Ok(())
        })?;
    }
}
