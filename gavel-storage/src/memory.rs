//! In-memory storage backends.
//!
//! Both backends can be switched off at runtime to simulate an unreachable
//! service, and the key-value store can add latency to every call so that
//! concurrent callers genuinely interleave.

use crate::{AuctionRepository, KeyValueStore, MessageBus};
use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use gavel_core::{
    AcceptedBid, Auction, AuctionId, Bid, EntityType, GavelResult, Price, StorageError, User,
    UserId,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Per-channel buffer; slower subscribers skip what they missed.
const CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// KEY-VALUE STORE
// ============================================================================

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Key-value store and message bus held in process memory.
pub struct InMemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    available: AtomicBool,
    latency: Option<Duration>,
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            latency: None,
        }
    }

    /// Sleep for `latency` at the start of every call.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::new()
        }
    }

    /// Switch the store on or off. While off, every call fails with
    /// `KeyValueUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether a live (unexpired) value exists under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| entries.get(key).is_some_and(|e| e.is_live(now)))
            .unwrap_or(false)
    }

    /// Drop every channel, ending all open subscriptions.
    pub fn drop_subscribers(&self) {
        if let Ok(mut channels) = self.channels.lock() {
            channels.clear();
        }
    }

    async fn enter(&self) -> GavelResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(StorageError::KeyValueUnavailable {
                reason: "in-memory store is switched off".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn entries(&self) -> GavelResult<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn channels(&self) -> GavelResult<MutexGuard<'_, HashMap<String, broadcast::Sender<String>>>> {
        self.channels
            .lock()
            .map_err(|_| StorageError::LockPoisoned.into())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKvStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> GavelResult<bool> {
        self.enter().await?;
        let now = Instant::now();
        let mut entries = self.entries()?;
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> GavelResult<Option<String>> {
        self.enter().await?;
        let now = Instant::now();
        let entries = self.entries()?;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> GavelResult<()> {
        self.enter().await?;
        self.entries()?.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> GavelResult<bool> {
        self.enter().await?;
        let now = Instant::now();
        let mut entries = self.entries()?;
        let matches = entries
            .get(key)
            .is_some_and(|e| e.is_live(now) && e.value == expected);
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn ping(&self) -> GavelResult<()> {
        self.enter().await
    }
}

#[async_trait]
impl MessageBus for InMemoryKvStore {
    async fn publish(&self, channel: &str, payload: &str) -> GavelResult<usize> {
        self.enter().await?;
        let channels = self.channels()?;
        Ok(channels
            .get(channel)
            .and_then(|tx| tx.send(payload.to_string()).ok())
            .unwrap_or(0))
    }

    async fn subscribe(&self, channel: &str) -> GavelResult<BoxStream<'static, String>> {
        self.enter().await?;
        let rx = self
            .channels()?
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        Ok(BroadcastStream::new(rx)
            .filter_map(|item| std::future::ready(item.ok()))
            .boxed())
    }
}

// ============================================================================
// RELATIONAL REPOSITORY
// ============================================================================

#[derive(Debug, Default)]
struct RepositoryState {
    users: BTreeMap<UserId, User>,
    auctions: BTreeMap<AuctionId, Auction>,
    bids: Vec<Bid>,
    next_user_id: UserId,
    next_auction_id: AuctionId,
    next_bid_id: i64,
}

/// Auction repository held in process memory.
#[derive(Debug)]
pub struct InMemoryAuctionRepository {
    state: RwLock<RepositoryState>,
    available: AtomicBool,
}

impl Default for InMemoryAuctionRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuctionRepository {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RepositoryState::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Switch the repository on or off. While off, every call fails with
    /// `RelationalUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> GavelResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::RelationalUnavailable {
                reason: "in-memory repository is switched off".to_string(),
            }
            .into())
        }
    }

    fn read(&self) -> GavelResult<std::sync::RwLockReadGuard<'_, RepositoryState>> {
        self.check_available()?;
        self.state.read().map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write(&self) -> GavelResult<std::sync::RwLockWriteGuard<'_, RepositoryState>> {
        self.check_available()?;
        self.state.write().map_err(|_| StorageError::LockPoisoned.into())
    }
}

#[async_trait]
impl AuctionRepository for InMemoryAuctionRepository {
    async fn current_price(&self, auction_id: AuctionId) -> GavelResult<Option<Price>> {
        Ok(self
            .read()?
            .auctions
            .get(&auction_id)
            .map(|a| a.current_price))
    }

    async fn persist_bid(&self, bid: &AcceptedBid) -> GavelResult<Bid> {
        let mut state = self.write()?;
        if !state.users.contains_key(&bid.bidder_id) {
            return Err(StorageError::NotFound {
                entity_type: EntityType::User,
                id: bid.bidder_id,
            }
            .into());
        }
        let auction = state
            .auctions
            .get_mut(&bid.auction_id)
            .ok_or(StorageError::NotFound {
                entity_type: EntityType::Auction,
                id: bid.auction_id,
            })?;
        auction.current_price = auction.current_price.max(bid.amount);

        state.next_bid_id += 1;
        let row = Bid {
            id: state.next_bid_id,
            user_id: bid.bidder_id,
            auction_id: bid.auction_id,
            price: bid.amount,
            created_at: chrono::Utc::now(),
        };
        state.bids.push(row.clone());
        Ok(row)
    }

    async fn create_user(&self, username: &str) -> GavelResult<User> {
        let mut state = self.write()?;
        if state.users.values().any(|u| u.username == username) {
            return Err(StorageError::AlreadyExists {
                entity_type: EntityType::User,
                key: username.to_string(),
            }
            .into());
        }
        state.next_user_id += 1;
        let user = User {
            id: state.next_user_id,
            username: username.to_string(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn create_auction(&self, item_name: &str, starting_price: Price) -> GavelResult<Auction> {
        let mut state = self.write()?;
        state.next_auction_id += 1;
        let auction = Auction {
            id: state.next_auction_id,
            item_name: item_name.to_string(),
            current_price: starting_price,
        };
        state.auctions.insert(auction.id, auction.clone());
        Ok(auction)
    }

    async fn get_auction(&self, auction_id: AuctionId) -> GavelResult<Option<Auction>> {
        Ok(self.read()?.auctions.get(&auction_id).cloned())
    }

    async fn list_auctions(&self) -> GavelResult<Vec<Auction>> {
        Ok(self.read()?.auctions.values().cloned().collect())
    }

    async fn list_bids(&self, auction_id: AuctionId) -> GavelResult<Vec<Bid>> {
        let state = self.read()?;
        Ok(state
            .bids
            .iter()
            .rev()
            .filter(|b| b.auction_id == auction_id)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> GavelResult<()> {
        self.check_available()
    }
}
