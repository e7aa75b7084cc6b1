//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling via deadpool-postgres, and the relational
//! [`AuctionRepository`] used by the CRUD routes, the cache-miss path of the
//! bid critical section, and the write-back persister.

use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolError, RecyclingMethod, Runtime};
use gavel_core::{
    AcceptedBid, Auction, AuctionId, Bid, EntityType, GavelError, GavelResult, Price,
    StorageError, User,
};
use gavel_storage::AuctionRepository;
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};

/// Tables owned by this service. Idempotent.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    username VARCHAR(255) NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS auctions (
    id BIGSERIAL PRIMARY KEY,
    item_name VARCHAR(255) NOT NULL,
    current_price BIGINT NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS bids (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL REFERENCES users(id),
    auction_id BIGINT NOT NULL REFERENCES auctions(id),
    price BIGINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_bids_auction_id ON bids (auction_id);
"#;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait/create/recycle timeout for pooled connections
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "auction".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("POSTGRES_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("POSTGRES_DB").unwrap_or_else(|_| "auction".to_string()),
            user: std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("POSTGRES_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("GAVEL_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("GAVEL_DB_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        pool_cfg.timeouts.create = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// Database client that wraps a connection pool.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Create the service tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(SCHEMA_SQL).await?;
        tracing::info!("Database schema ready");
        Ok(())
    }

    /// Remove every user, auction and bid, restarting id sequences.
    pub async fn truncate_all(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute("TRUNCATE bids, auctions, users RESTART IDENTITY CASCADE")
            .await?;
        Ok(())
    }

    async fn get_conn(&self) -> GavelResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }
}

#[async_trait]
impl AuctionRepository for DbClient {
    async fn current_price(&self, auction_id: AuctionId) -> GavelResult<Option<Price>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT current_price FROM auctions WHERE id = $1",
                &[&auction_id],
            )
            .await
            .map_err(query_error)?;
        Ok(row.map(|r| r.get(0)))
    }

    async fn persist_bid(&self, bid: &AcceptedBid) -> GavelResult<Bid> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(query_error)?;

        // GREATEST keeps a late write from an older bid from lowering the price.
        let updated = tx
            .execute(
                "UPDATE auctions SET current_price = GREATEST(current_price, $2) WHERE id = $1",
                &[&bid.auction_id, &bid.amount],
            )
            .await
            .map_err(query_error)?;
        if updated == 0 {
            return Err(StorageError::NotFound {
                entity_type: EntityType::Auction,
                id: bid.auction_id,
            }
            .into());
        }

        let row = tx
            .query_one(
                "INSERT INTO bids (user_id, auction_id, price) VALUES ($1, $2, $3) \
                 RETURNING id, user_id, auction_id, price, created_at",
                &[&bid.bidder_id, &bid.auction_id, &bid.amount],
            )
            .await
            .map_err(|e| {
                if e.code() == Some(&SqlState::FOREIGN_KEY_VIOLATION) {
                    StorageError::NotFound {
                        entity_type: EntityType::User,
                        id: bid.bidder_id,
                    }
                    .into()
                } else {
                    query_error(e)
                }
            })?;

        tx.commit().await.map_err(query_error)?;
        Ok(bid_from_row(&row))
    }

    async fn create_user(&self, username: &str) -> GavelResult<User> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(
                "INSERT INTO users (username) VALUES ($1) RETURNING id, username",
                &[&username],
            )
            .await
            .map_err(|e| {
                if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    StorageError::AlreadyExists {
                        entity_type: EntityType::User,
                        key: username.to_string(),
                    }
                    .into()
                } else {
                    query_error(e)
                }
            })?;
        Ok(User {
            id: row.get("id"),
            username: row.get("username"),
        })
    }

    async fn create_auction(&self, item_name: &str, starting_price: Price) -> GavelResult<Auction> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(
                "INSERT INTO auctions (item_name, current_price) VALUES ($1, $2) \
                 RETURNING id, item_name, current_price",
                &[&item_name, &starting_price],
            )
            .await
            .map_err(query_error)?;
        Ok(auction_from_row(&row))
    }

    async fn get_auction(&self, auction_id: AuctionId) -> GavelResult<Option<Auction>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT id, item_name, current_price FROM auctions WHERE id = $1",
                &[&auction_id],
            )
            .await
            .map_err(query_error)?;
        Ok(row.as_ref().map(auction_from_row))
    }

    async fn list_auctions(&self) -> GavelResult<Vec<Auction>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT id, item_name, current_price FROM auctions ORDER BY id",
                &[],
            )
            .await
            .map_err(query_error)?;
        Ok(rows.iter().map(auction_from_row).collect())
    }

    async fn list_bids(&self, auction_id: AuctionId) -> GavelResult<Vec<Bid>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT id, user_id, auction_id, price, created_at FROM bids \
                 WHERE auction_id = $1 ORDER BY id DESC",
                &[&auction_id],
            )
            .await
            .map_err(query_error)?;
        Ok(rows.iter().map(bid_from_row).collect())
    }

    async fn ping(&self) -> GavelResult<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(query_error)?;
        Ok(())
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn auction_from_row(row: &Row) -> Auction {
    Auction {
        id: row.get("id"),
        item_name: row.get("item_name"),
        current_price: row.get("current_price"),
    }
}

fn bid_from_row(row: &Row) -> Bid {
    Bid {
        id: row.get("id"),
        user_id: row.get("user_id"),
        auction_id: row.get("auction_id"),
        price: row.get("price"),
        created_at: row.get("created_at"),
    }
}

/// Server-side rejections are transaction failures; anything without a
/// database error attached means the server could not be reached.
fn query_error(err: tokio_postgres::Error) -> GavelError {
    tracing::error!("Database error: {:?}", err);
    if err.as_db_error().is_some() {
        StorageError::TransactionFailed {
            reason: err.to_string(),
        }
        .into()
    } else {
        StorageError::RelationalUnavailable {
            reason: err.to_string(),
        }
        .into()
    }
}

fn pool_error(err: PoolError) -> GavelError {
    tracing::error!("Connection pool error: {:?}", err);
    StorageError::RelationalUnavailable {
        reason: err.to_string(),
    }
    .into()
}
