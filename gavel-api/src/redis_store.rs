//! Redis-backed key-value store and message bus.
//!
//! Commands go through a shared [`ConnectionManager`], which reconnects on
//! its own. Subscriptions open a dedicated pub/sub connection each.

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use gavel_core::{GavelError, GavelResult, StorageError};
use gavel_storage::{KeyValueStore, MessageBus};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ErrorKind, RedisError, Script};
use std::time::Duration;

use crate::config::RedisConfig;

/// Delete KEYS[1] only while it still holds ARGV[1].
const RELEASE_IF_OWNER: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Key-value store and message bus on a single Redis deployment.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    conn: ConnectionManager,
    release_script: Script,
}

impl RedisStore {
    /// Open a client and establish the managed connection.
    pub async fn connect(config: &RedisConfig) -> GavelResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(kv_error)?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(kv_error)?;
        tracing::info!(url = %redact_url(&config.url), "Connected to Redis");
        Ok(Self {
            client,
            conn,
            release_script: Script::new(RELEASE_IF_OWNER),
        })
    }

    /// Remove every key in every database.
    pub async fn flush_all(&self) -> GavelResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("FLUSHALL")
            .query_async(&mut conn)
            .await
            .map_err(kv_error)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> GavelResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(kv_error)?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> GavelResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(kv_error)
    }

    async fn set(&self, key: &str, value: &str) -> GavelResult<()> {
        let mut conn = self.conn.clone();
        conn.set(key, value).await.map_err(kv_error)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> GavelResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .release_script
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(kv_error)?;
        Ok(deleted == 1)
    }

    async fn ping(&self) -> GavelResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(kv_error)?;
        Ok(())
    }
}

#[async_trait]
impl MessageBus for RedisStore {
    async fn publish(&self, channel: &str, payload: &str) -> GavelResult<usize> {
        let mut conn = self.conn.clone();
        let receivers: usize = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(kv_error)?;
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> GavelResult<BoxStream<'static, String>> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(kv_error)?;
        pubsub.subscribe(channel).await.map_err(kv_error)?;
        let stream = pubsub.into_on_message().filter_map(|msg| {
            let payload = msg.get_payload::<String>();
            if let Err(e) = &payload {
                tracing::warn!(error = %e, "Dropping non-text pub/sub payload");
            }
            std::future::ready(payload.ok())
        });
        Ok(stream.boxed())
    }
}

/// Redis expiries are whole seconds; round up so a lock never lives shorter
/// than asked.
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

fn kv_error(err: RedisError) -> GavelError {
    if err.kind() == ErrorKind::TypeError {
        return StorageError::CorruptValue {
            key: String::new(),
            reason: err.to_string(),
        }
        .into();
    }
    StorageError::KeyValueUnavailable {
        reason: err.to_string(),
    }
    .into()
}

/// Hide credentials when logging a connection URL.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_rounds_up_to_whole_seconds() {
        assert_eq!(ttl_secs(Duration::from_secs(5)), 5);
        assert_eq!(ttl_secs(Duration::from_millis(5200)), 6);
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_secs(Duration::ZERO), 1);
    }

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("redis://:secret@cache:6379/0"),
            "redis://***@cache:6379/0"
        );
        assert_eq!(
            redact_url("redis://localhost:6379/0"),
            "redis://localhost:6379/0"
        );
    }

    #[test]
    fn test_io_errors_map_to_unavailable() {
        let err = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(
            kv_error(err),
            GavelError::Storage(StorageError::KeyValueUnavailable { .. })
        ));
    }
}
