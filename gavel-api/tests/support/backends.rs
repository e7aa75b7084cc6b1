#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use gavel_api::{ApiConfig, GavelRuntime};
use gavel_test_utils::fixtures::seeded_repository;
use gavel_test_utils::{InMemoryAuctionRepository, InMemoryKvStore, Price};

/// In-memory stores plus a running bid runtime on top of them.
pub struct TestBackends {
    pub kv: Arc<InMemoryKvStore>,
    pub repo: Arc<InMemoryAuctionRepository>,
    pub runtime: GavelRuntime,
    pub config: ApiConfig,
}

pub fn test_config() -> ApiConfig {
    ApiConfig {
        listener_reconnect_delay: Duration::from_millis(50),
        persist_drain_timeout: Duration::from_secs(2),
        ..ApiConfig::default()
    }
}

/// Seeded repository (bidder 1, auction 1 at `starting_price`) and a fresh
/// key-value store.
pub async fn start(starting_price: Price) -> TestBackends {
    start_with_kv(InMemoryKvStore::new(), starting_price).await
}

pub async fn start_with_kv(kv: InMemoryKvStore, starting_price: Price) -> TestBackends {
    let kv = Arc::new(kv);
    let repo = seeded_repository(starting_price)
        .await
        .expect("seed repository");
    let config = test_config();
    let runtime = GavelRuntime::start(&config, kv.clone(), kv.clone(), repo.clone());
    TestBackends {
        kv,
        repo,
        runtime,
        config,
    }
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
