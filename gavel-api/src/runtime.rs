//! Background task wiring.
//!
//! [`GavelRuntime::start`] builds the bid service on top of the given
//! backends and spawns the long-lived tasks: persistence lanes, the change
//! publisher and the channel listener. [`GavelRuntime::shutdown`] stops them
//! in dependency order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gavel_storage::{AuctionRepository, KeyValueStore, MessageBus};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::broadcast::{spawn_listener, ChangePublisher, ConnectionRegistry};
use crate::config::ApiConfig;
use crate::persister::{PersisterStats, WriteBackPersister};
use crate::services::{BidService, LockService, PriceCache};
use crate::state::AppState;

/// How long shutdown waits for the listener to notice the signal.
const LISTENER_STOP_TIMEOUT: Duration = Duration::from_secs(2);

pub struct GavelRuntime {
    state: AppState,
    persister: WriteBackPersister,
    publisher: ChangePublisher,
    listener: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    drain_timeout: Duration,
}

impl GavelRuntime {
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: &ApiConfig,
        kv: Arc<dyn KeyValueStore>,
        bus: Arc<dyn MessageBus>,
        repo: Arc<dyn AuctionRepository>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let persister = WriteBackPersister::spawn(
            Arc::clone(&repo),
            config.persist_lanes,
            config.persist_queue_capacity,
        );
        let publisher = ChangePublisher::spawn(
            Arc::clone(&bus),
            config.price_channel.clone(),
            config.publish_queue_capacity,
        );
        let registry = Arc::new(ConnectionRegistry::new(config.ws_buffer));
        let listener = spawn_listener(
            bus,
            config.price_channel.clone(),
            Arc::clone(&registry),
            config.listener_reconnect_delay,
            shutdown_rx,
        );

        let bids = BidService::new(
            LockService::new(Arc::clone(&kv)),
            PriceCache::new(Arc::clone(&kv)),
            Arc::clone(&repo),
            persister.handle(),
            publisher.handle(),
            config.lock_ttl,
        );

        tracing::info!(
            lock_ttl_secs = config.lock_ttl.as_secs(),
            channel = %config.price_channel,
            "Bid runtime started"
        );

        Self {
            state: AppState {
                bids,
                repo,
                kv,
                registry,
                start_time: Instant::now(),
            },
            persister,
            publisher,
            listener,
            shutdown_tx,
            drain_timeout: config.persist_drain_timeout,
        }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn persister_stats(&self) -> Arc<PersisterStats> {
        self.persister.stats()
    }

    /// Stop the listener and publisher, then drain queued bids.
    ///
    /// Call after the HTTP server has stopped accepting requests.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if tokio::time::timeout(LISTENER_STOP_TIMEOUT, self.listener)
            .await
            .is_err()
        {
            tracing::warn!("Price update listener did not stop in time");
        }
        self.publisher.shutdown();
        self.persister.drain(self.drain_timeout).await;
        tracing::info!("Bid runtime stopped");
    }
}
