//! Change Broadcast
//!
//! Price changes travel through the shared pub/sub channel so that every
//! server instance sees every accepted bid:
//!
//! ```text
//! BidService --try_send--> ChangePublisher task --publish--> channel
//! channel --subscribe--> listener task --fan_out--> ConnectionRegistry
//! ConnectionRegistry --per-connection mpsc--> WebSocket tasks
//! ```
//!
//! One publisher task per process keeps the publish order of that process.
//! Each observer gets its own bounded queue, so a slow or dead observer
//! never holds up the others. An observer whose queue is closed or full is
//! unregistered, which ends its socket.

use dashmap::DashMap;
use futures_util::StreamExt;
use gavel_core::PriceUpdate;
use gavel_storage::MessageBus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::telemetry::metrics;

/// Identifies one registered observer.
pub type ConnectionId = u64;

// ============================================================================
// CONNECTION REGISTRY
// ============================================================================

/// Result of one fan-out pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Process-wide set of live observer connections.
///
/// Register, unregister and fan-out may run concurrently from any task.
#[derive(Debug)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    connections: DashMap<ConnectionId, mpsc::Sender<String>>,
    buffer: usize,
}

impl ConnectionRegistry {
    /// `buffer` is the outbound queue length of each connection.
    pub fn new(buffer: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            connections: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Add a connection. The receiver yields every payload fanned out from
    /// now on, and ends once the connection is unregistered.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        self.connections.insert(id, tx);
        (id, rx)
    }

    /// Returns `false` if the connection was already gone.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        self.connections.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Queue `payload` on every connection.
    ///
    /// Never fails. Connections that cannot take the payload are removed
    /// after the pass.
    pub fn fan_out(&self, payload: &str) -> FanOutReport {
        let mut report = FanOutReport::default();
        let mut failed = Vec::new();

        for entry in self.connections.iter() {
            match entry.value().try_send(payload.to_string()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(connection_id = *entry.key(), "Observer queue full; disconnecting");
                    failed.push(*entry.key());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => failed.push(*entry.key()),
            }
        }

        // Removing while iterating would deadlock on the shard lock.
        for id in failed {
            self.connections.remove(&id);
            report.dropped += 1;
        }

        if let Some(m) = metrics() {
            m.record_deliveries(report.delivered, report.dropped);
        }
        report
    }
}

// ============================================================================
// PUBLISHER
// ============================================================================

/// Submission side of the publisher task.
#[derive(Clone)]
pub struct PublisherHandle {
    tx: mpsc::Sender<PriceUpdate>,
}

impl PublisherHandle {
    /// Queue an update without waiting. Returns `false` if it was dropped.
    pub fn publish(&self, update: PriceUpdate) -> bool {
        match self.tx.try_send(update) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    auction_id = update.auction_id,
                    new_price = update.new_price,
                    error = %e,
                    "Price update not queued for broadcast"
                );
                if let Some(m) = metrics() {
                    m.record_publish(false);
                }
                false
            }
        }
    }
}

/// Task that publishes queued price updates on the shared channel, in order.
pub struct ChangePublisher {
    handle: PublisherHandle,
    task: JoinHandle<()>,
}

impl ChangePublisher {
    pub fn spawn(bus: Arc<dyn MessageBus>, channel: impl Into<String>, capacity: usize) -> Self {
        let channel = channel.into();
        let (tx, mut rx) = mpsc::channel::<PriceUpdate>(capacity.max(1));

        let task = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                let payload = match update.to_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!(error = %e, "Failed to encode price update");
                        continue;
                    }
                };
                match bus.publish(&channel, &payload).await {
                    Ok(receivers) => {
                        debug!(
                            auction_id = update.auction_id,
                            new_price = update.new_price,
                            receivers,
                            "Price update published"
                        );
                        if let Some(m) = metrics() {
                            m.record_publish(true);
                        }
                    }
                    Err(e) => {
                        warn!(
                            auction_id = update.auction_id,
                            new_price = update.new_price,
                            error = %e,
                            "Price update publish failed"
                        );
                        if let Some(m) = metrics() {
                            m.record_publish(false);
                        }
                    }
                }
            }
        });

        Self {
            handle: PublisherHandle { tx },
            task,
        }
    }

    pub fn handle(&self) -> PublisherHandle {
        self.handle.clone()
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

// ============================================================================
// LISTENER
// ============================================================================

/// Subscribe to `channel` and fan every payload out to `registry`.
///
/// When the subscription ends or cannot be established the listener waits
/// `reconnect_delay` and subscribes again. It stops when `shutdown_rx`
/// flips to `true` or its sender is dropped.
pub fn spawn_listener(
    bus: Arc<dyn MessageBus>,
    channel: impl Into<String>,
    registry: Arc<ConnectionRegistry>,
    reconnect_delay: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let channel = channel.into();
    tokio::spawn(async move {
        loop {
            match bus.subscribe(&channel).await {
                Ok(mut stream) => {
                    info!(channel = %channel, "Subscribed to price updates");
                    loop {
                        tokio::select! {
                            next = stream.next() => match next {
                                Some(payload) => {
                                    let report = registry.fan_out(&payload);
                                    debug!(
                                        delivered = report.delivered,
                                        dropped = report.dropped,
                                        "Fanned out price update"
                                    );
                                }
                                None => break,
                            },
                            changed = shutdown_rx.changed() => {
                                if changed.is_err() || *shutdown_rx.borrow() {
                                    info!(channel = %channel, "Price update listener stopped");
                                    return;
                                }
                            }
                        }
                    }
                    warn!(channel = %channel, "Price update subscription ended");
                }
                Err(e) => {
                    error!(channel = %channel, error = %e, "Failed to subscribe to price updates");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(reconnect_delay) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!(channel = %channel, "Price update listener stopped");
                        return;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_assigns_distinct_ids() {
        let registry = ConnectionRegistry::new(4);
        let (a, _rx_a) = registry.register();
        let (b, _rx_b) = registry.register();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert!(registry.unregister(a));
        assert!(!registry.unregister(a));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_fan_out_skips_closed_connections() {
        let registry = ConnectionRegistry::new(4);
        let (_gone, rx_gone) = registry.register();
        let (_live, mut rx_live) = registry.register();
        drop(rx_gone);

        let report = registry.fan_out("hello");
        assert_eq!(report, FanOutReport { delivered: 1, dropped: 1 });
        assert_eq!(registry.len(), 1);
        assert_eq!(rx_live.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_full_connection_is_disconnected() {
        let registry = ConnectionRegistry::new(1);
        let (_slow, mut rx_slow) = registry.register();

        assert_eq!(registry.fan_out("first").delivered, 1);
        let report = registry.fan_out("second");
        assert_eq!(report.dropped, 1);
        assert!(registry.is_empty());

        assert_eq!(rx_slow.recv().await.as_deref(), Some("first"));
        assert_eq!(rx_slow.recv().await, None);
    }

    #[tokio::test]
    async fn test_unregister_ends_receiver() {
        let registry = ConnectionRegistry::new(4);
        let (id, mut rx) = registry.register();
        registry.unregister(id);
        assert_eq!(rx.recv().await, None);
    }
}
