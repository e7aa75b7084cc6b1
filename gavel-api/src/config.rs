//! API Configuration Module
//!
//! Runtime settings for the HTTP surface, the bid critical section, the
//! write-back persister and the change broadcaster. Configuration is loaded
//! from environment variables with sensible defaults for development.

use std::str::FromStr;
use std::time::Duration;

use gavel_core::DEFAULT_PRICE_CHANNEL;

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Critical Section
    // ========================================================================
    /// Expiry of an auction lock. Must comfortably exceed the slowest
    /// expected critical section (cache read + cache write).
    pub lock_ttl: Duration,

    // ========================================================================
    // Write-Back Persistence
    // ========================================================================
    /// Bounded queue length per persistence lane.
    pub persist_queue_capacity: usize,

    /// Number of persistence lanes. Bids for one auction always share a lane.
    pub persist_lanes: usize,

    /// How long shutdown waits for queued bids to be written.
    pub persist_drain_timeout: Duration,

    // ========================================================================
    // Change Broadcast
    // ========================================================================
    /// Pub/sub channel carrying price updates.
    pub price_channel: String,

    /// Bounded queue in front of the publisher task.
    pub publish_queue_capacity: usize,

    /// Outbound buffer per observer connection.
    pub ws_buffer: usize,

    /// Pause before the listener resubscribes after losing the channel.
    pub listener_reconnect_delay: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
            lock_ttl: Duration::from_secs(5),
            persist_queue_capacity: 1024,
            persist_lanes: 4,
            persist_drain_timeout: Duration::from_secs(10),
            price_channel: DEFAULT_PRICE_CHANNEL.to_string(),
            publish_queue_capacity: 1024,
            ws_buffer: 64,
            listener_reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `GAVEL_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `GAVEL_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `GAVEL_LOCK_TTL_SECS`: Auction lock expiry (default: 5)
    /// - `GAVEL_PERSIST_QUEUE`: Queue length per persistence lane (default: 1024)
    /// - `GAVEL_PERSIST_LANES`: Persistence lanes (default: 4)
    /// - `GAVEL_PERSIST_DRAIN_SECS`: Shutdown drain timeout (default: 10)
    /// - `GAVEL_PRICE_CHANNEL`: Pub/sub channel name (default: auction_updates)
    /// - `GAVEL_PUBLISH_QUEUE`: Publisher queue length (default: 1024)
    /// - `GAVEL_WS_BUFFER`: Outbound buffer per observer (default: 64)
    /// - `GAVEL_LISTENER_RECONNECT_SECS`: Resubscribe delay (default: 5)
    ///
    /// Unparseable values fall back to the default; zero sizes clamp to 1.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_origins = std::env::var("GAVEL_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let lock_ttl_secs = env_or("GAVEL_LOCK_TTL_SECS", defaults.lock_ttl.as_secs()).max(1);

        Self {
            cors_origins,
            cors_max_age_secs: env_or("GAVEL_CORS_MAX_AGE_SECS", defaults.cors_max_age_secs),
            lock_ttl: Duration::from_secs(lock_ttl_secs),
            persist_queue_capacity: env_or("GAVEL_PERSIST_QUEUE", defaults.persist_queue_capacity)
                .max(1),
            persist_lanes: env_or("GAVEL_PERSIST_LANES", defaults.persist_lanes).max(1),
            persist_drain_timeout: Duration::from_secs(env_or(
                "GAVEL_PERSIST_DRAIN_SECS",
                defaults.persist_drain_timeout.as_secs(),
            )),
            price_channel: std::env::var("GAVEL_PRICE_CHANNEL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.price_channel),
            publish_queue_capacity: env_or("GAVEL_PUBLISH_QUEUE", defaults.publish_queue_capacity)
                .max(1),
            ws_buffer: env_or("GAVEL_WS_BUFFER", defaults.ws_buffer).max(1),
            listener_reconnect_delay: Duration::from_secs(env_or(
                "GAVEL_LISTENER_RECONNECT_SECS",
                defaults.listener_reconnect_delay.as_secs(),
            )),
        }
    }
}

// ============================================================================
// REDIS CONFIGURATION
// ============================================================================

/// Connection settings for the shared key-value store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
        }
    }
}

impl RedisConfig {
    /// Reads `REDIS_URL`.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL").unwrap_or_else(|_| Self::default().url),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
