//! Write-Back Persister
//!
//! Accepted bids are made durable off the request path. Each bid is handed
//! to one of a fixed set of lanes, chosen by auction id, so all bids for an
//! auction are written one at a time in acceptance order. Each lane owns a
//! bounded queue and runs its own transaction per bid.
//!
//! Delivery is at most once. A bid that cannot be queued, or whose
//! transaction fails, is logged and counted but never retried. The auction
//! is then marked as drifting: its cached price is ahead of the durable one
//! until a later bid on it is written successfully.

use dashmap::DashSet;
use gavel_core::{AcceptedBid, AuctionId};
use gavel_storage::AuctionRepository;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::telemetry::metrics;

// ============================================================================
// STATS
// ============================================================================

/// Counters for write-back activity.
#[derive(Debug, Default)]
pub struct PersisterStats {
    /// Bids written successfully
    pub persisted: AtomicU64,

    /// Bids whose transaction failed
    pub failed: AtomicU64,

    /// Bids never queued (lane full or closed)
    pub dropped: AtomicU64,

    drifting: DashSet<AuctionId>,
}

impl PersisterStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the last write-back for this auction was lost.
    pub fn is_drifting(&self, auction_id: AuctionId) -> bool {
        self.drifting.contains(&auction_id)
    }

    pub fn snapshot(&self) -> PersisterSnapshot {
        PersisterSnapshot {
            persisted: self.persisted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            drifting_auctions: self.drifting.len(),
        }
    }

    fn mark_drift(&self, auction_id: AuctionId) {
        self.drifting.insert(auction_id);
        self.publish_drift();
    }

    fn clear_drift(&self, auction_id: AuctionId) -> bool {
        let cleared = self.drifting.remove(&auction_id).is_some();
        if cleared {
            self.publish_drift();
        }
        cleared
    }

    fn publish_drift(&self) {
        if let Some(m) = metrics() {
            m.set_price_drift(self.drifting.len());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersisterSnapshot {
    pub persisted: u64,
    pub failed: u64,
    pub dropped: u64,
    pub drifting_auctions: usize,
}

// ============================================================================
// HANDLE
// ============================================================================

/// Cheap, cloneable submission side of the persister.
#[derive(Clone)]
pub struct PersisterHandle {
    lanes: Arc<[mpsc::Sender<AcceptedBid>]>,
    stats: Arc<PersisterStats>,
}

impl PersisterHandle {
    /// Queue a bid without waiting.
    ///
    /// Returns `false` if the bid was dropped; the drop has already been
    /// logged and counted.
    pub fn submit(&self, bid: AcceptedBid) -> bool {
        let lane = lane_for(bid.auction_id, self.lanes.len());
        let Some(sender) = self.lanes.get(lane) else {
            return self.dropped(bid, "no_lane");
        };
        match sender.try_send(bid) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(bid)) => self.dropped(bid, "queue_full"),
            Err(mpsc::error::TrySendError::Closed(bid)) => self.dropped(bid, "closed"),
        }
    }

    pub fn stats(&self) -> Arc<PersisterStats> {
        Arc::clone(&self.stats)
    }

    fn dropped(&self, bid: AcceptedBid, reason: &'static str) -> bool {
        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        self.stats.mark_drift(bid.auction_id);
        if let Some(m) = metrics() {
            m.record_persist_dropped(reason);
        }
        tracing::error!(
            auction_id = bid.auction_id,
            bidder_id = bid.bidder_id,
            amount = bid.amount,
            reason,
            "Accepted bid not queued for persistence"
        );
        false
    }
}

fn lane_for(auction_id: AuctionId, lanes: usize) -> usize {
    auction_id.rem_euclid(lanes.max(1) as i64) as usize
}

// ============================================================================
// PERSISTER
// ============================================================================

/// Owner of the lane tasks.
///
/// [`drain`](Self::drain) stops intake and waits for queued bids. Dropping
/// the persister without draining has the same effect, minus the wait.
pub struct WriteBackPersister {
    handle: PersisterHandle,
    tasks: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl WriteBackPersister {
    /// Spawn `lanes` lane tasks, each with a queue of `capacity` bids.
    pub fn spawn(repo: Arc<dyn AuctionRepository>, lanes: usize, capacity: usize) -> Self {
        let lanes = lanes.max(1);
        let stats = Arc::new(PersisterStats::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut senders = Vec::with_capacity(lanes);
        let mut tasks = Vec::with_capacity(lanes);
        for lane in 0..lanes {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            senders.push(tx);
            tasks.push(tokio::spawn(run_lane(
                lane,
                rx,
                Arc::clone(&repo),
                Arc::clone(&stats),
                shutdown_rx.clone(),
            )));
        }

        tracing::info!(lanes, capacity, "Write-back persister started");

        Self {
            handle: PersisterHandle {
                lanes: senders.into(),
                stats,
            },
            tasks,
            shutdown_tx,
        }
    }

    pub fn handle(&self) -> PersisterHandle {
        self.handle.clone()
    }

    pub fn stats(&self) -> Arc<PersisterStats> {
        self.handle.stats()
    }

    /// Stop accepting bids and wait up to `timeout` for queued ones.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn drain(self, timeout: Duration) -> bool {
        let _ = self.shutdown_tx.send(true);
        let lanes = futures_util::future::join_all(self.tasks);
        match tokio::time::timeout(timeout, lanes).await {
            Ok(_) => {
                let snapshot = self.handle.stats.snapshot();
                tracing::info!(
                    persisted = snapshot.persisted,
                    failed = snapshot.failed,
                    dropped = snapshot.dropped,
                    drifting_auctions = snapshot.drifting_auctions,
                    "Write-back persister drained"
                );
                true
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "Persister drain timed out; queued bids abandoned"
                );
                false
            }
        }
    }
}

async fn run_lane(
    lane: usize,
    mut rx: mpsc::Receiver<AcceptedBid>,
    repo: Arc<dyn AuctionRepository>,
    stats: Arc<PersisterStats>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            next = rx.recv() => match next {
                Some(bid) => persist_one(repo.as_ref(), &stats, bid).await,
                None => break,
            },
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    rx.close();
                    while let Some(bid) = rx.recv().await {
                        persist_one(repo.as_ref(), &stats, bid).await;
                    }
                    break;
                }
            }
        }
    }
    tracing::debug!(lane, "Persistence lane stopped");
}

async fn persist_one(repo: &dyn AuctionRepository, stats: &PersisterStats, bid: AcceptedBid) {
    match repo.persist_bid(&bid).await {
        Ok(row) => {
            stats.persisted.fetch_add(1, Ordering::Relaxed);
            if let Some(m) = metrics() {
                m.record_persist(true);
            }
            if stats.clear_drift(bid.auction_id) {
                tracing::info!(
                    auction_id = bid.auction_id,
                    amount = bid.amount,
                    "Durable price caught up with the cache"
                );
            }
            tracing::debug!(
                bid_id = row.id,
                auction_id = row.auction_id,
                price = row.price,
                "Bid persisted"
            );
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            stats.mark_drift(bid.auction_id);
            if let Some(m) = metrics() {
                m.record_persist(false);
            }
            tracing::error!(
                auction_id = bid.auction_id,
                bidder_id = bid.bidder_id,
                amount = bid.amount,
                error = %e,
                "Bid persistence failed; durable price is behind the cache"
            );
        }
    }
}
