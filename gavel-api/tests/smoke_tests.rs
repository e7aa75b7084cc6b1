//! End-to-end smoke tests against live PostgreSQL and Redis.
//!
//! Run with `--features db-tests`; connection settings come from the usual
//! `POSTGRES_*` and `REDIS_URL` variables. Each test creates its own
//! auction, so the suite tolerates existing data.
#![cfg(feature = "db-tests")]

use std::sync::Arc;
use std::time::Duration;

use gavel_api::{
    ApiConfig, ApiResult, BidOutcome, DbClient, DbConfig, GavelRuntime, RedisConfig, RedisStore,
};
use gavel_storage::{AuctionRepository, KeyValueStore};

async fn live_backends() -> ApiResult<(Arc<DbClient>, Arc<RedisStore>)> {
    let db = DbClient::from_config(&DbConfig::from_env())?;
    db.ensure_schema().await?;
    let redis = RedisStore::connect(&RedisConfig::from_env()).await?;
    Ok((Arc::new(db), Arc::new(redis)))
}

#[tokio::test]
async fn smoke_test_bid_round_trip() -> ApiResult<()> {
    let (db, redis) = live_backends().await?;
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let user = db.create_user(&format!("smoke_{}", &suffix[..12])).await?;
    let auction = db.create_auction("Smoke Test Lot", 100).await?;

    let runtime = GavelRuntime::start(
        &ApiConfig::default(),
        redis.clone(),
        redis.clone(),
        db.clone(),
    );
    let bids = runtime.state().bids;

    let outcome = bids.place_bid(auction.id, user.id, 150).await?;
    assert_eq!(outcome, BidOutcome::Accepted { new_price: 150 });
    assert_eq!(
        redis.get(&format!("auction:{}:price", auction.id)).await?.as_deref(),
        Some("150")
    );

    runtime.shutdown().await;

    assert_eq!(db.current_price(auction.id).await?, Some(150));
    let log = db.list_bids(auction.id).await?;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].user_id, user.id);
    Ok(())
}

#[tokio::test]
async fn smoke_test_redis_lock_is_owner_checked() -> ApiResult<()> {
    let (_, redis) = live_backends().await?;
    let name = format!("smoke:{}", uuid::Uuid::new_v4());
    let key = format!("lock:{name}");

    assert!(redis.set_if_absent(&key, "owner-a", Duration::from_secs(5)).await?);
    assert!(!redis.set_if_absent(&key, "owner-b", Duration::from_secs(5)).await?);
    assert!(!redis.delete_if_equals(&key, "owner-b").await?);
    assert!(redis.delete_if_equals(&key, "owner-a").await?);
    assert_eq!(redis.get(&key).await?, None);
    Ok(())
}

#[tokio::test]
async fn smoke_test_older_bid_never_lowers_durable_price() -> ApiResult<()> {
    let (db, _) = live_backends().await?;
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let user = db.create_user(&format!("smoke_{}", &suffix[..12])).await?;
    let auction = db.create_auction("Smoke Replay Lot", 0).await?;

    for amount in [300, 200] {
        db.persist_bid(&gavel_core::AcceptedBid {
            auction_id: auction.id,
            bidder_id: user.id,
            amount,
        })
        .await?;
    }
    assert_eq!(db.current_price(auction.id).await?, Some(300));
    Ok(())
}
