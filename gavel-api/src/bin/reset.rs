//! Data Reset Binary
//!
//! Truncates users, auctions and bids (restarting ids) and flushes Redis.
//! Asks for confirmation unless `GAVEL_RESET_CONFIRM=yes`.
//!
//! Usage:
//!   cargo run -p gavel-api --bin gavel-reset

use std::io::{BufRead, Write};

use gavel_api::{ApiError, ApiResult, DbClient, DbConfig, RedisConfig, RedisStore};

fn confirmed() -> bool {
    if std::env::var("GAVEL_RESET_CONFIRM").is_ok_and(|v| v.eq_ignore_ascii_case("yes")) {
        return true;
    }

    print!("This deletes ALL users, auctions, bids and cached prices. Continue? [y/N] ");
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[tokio::main]
async fn main() -> ApiResult<()> {
    if !confirmed() {
        println!("Aborted.");
        return Ok(());
    }

    let db = DbClient::from_config(&DbConfig::from_env())?;
    println!("[INFO] Cleaning PostgreSQL data...");
    db.truncate_all().await?;
    println!("[INFO] PostgreSQL tables truncated.");

    println!("[INFO] Flushing Redis...");
    let redis = RedisStore::connect(&RedisConfig::from_env()).await?;
    redis
        .flush_all()
        .await
        .map_err(|e| ApiError::cache_unavailable(format!("FLUSHALL failed: {}", e)))?;
    println!("[INFO] Redis flushed.");

    println!("Reset complete.");
    Ok(())
}
