use redis::AsyncCommands;
use redis::Client;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::error::AppResult;
use crate::governor::{CacheKey, ResultCache};

/// Creates a Redis client for the result cache
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for asynchronous cache writes
struct CacheWriteMessage {
    key: String,
    value: String,
    ttl_secs: u64,
}

/// Redis-backed [`ResultCache`]; expiry is delegated to Redis via `SET EX`
#[derive(Clone)]
pub struct RedisResultCache {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<CacheWriteMessage>,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl CacheWriterHandle {
    /// Signals the writer task to flush pending writes and stop
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");
    }
}

/// Redis TTLs are whole seconds and must be positive
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

impl RedisResultCache {
    /// Creates the cache and spawns its background writer task.
    ///
    /// Writes are queued on a channel so a slow Redis never delays the
    /// response of the call that produced the value.
    pub fn new(redis_client: Client) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        tokio::spawn(async move {
            Self::cache_writer_task(client, write_rx, shutdown_rx).await;
        });

        let cache = Self {
            redis_client,
            write_tx,
        };

        (cache, CacheWriterHandle { shutdown_tx })
    }

    async fn cache_writer_task(
        client: Client,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");
        let mut failed_writes = 0u64;

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::write_to_redis(&client, msg).await {
                        failed_writes += 1;
                        tracing::error!(error = %e, failed_writes, "Failed to write to Redis cache");
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Cache writer shutting down, flushing remaining writes");

                    write_rx.close();
                    while let Some(msg) = write_rx.recv().await {
                        if let Err(e) = Self::write_to_redis(&client, msg).await {
                            tracing::error!(error = %e, "Failed to flush cache write during shutdown");
                        }
                    }

                    tracing::info!(failed_writes, "Cache writer task stopped");
                    break;
                }
            }
        }
    }

    async fn write_to_redis(client: &Client, msg: CacheWriteMessage) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(msg.key, msg.value, msg.ttl_secs).await?;
        Ok(())
    }

    /// Queues a write without waiting for Redis
    pub fn set_in_background(&self, key: &CacheKey, value: &JsonValue, ttl: Duration) {
        let msg = CacheWriteMessage {
            key: key.to_string(),
            value: value.to_string(),
            ttl_secs: ttl_secs(ttl),
        };

        if let Err(e) = self.write_tx.send(msg) {
            tracing::error!(error = %e, "Failed to send cache write message");
        }
    }
}

#[async_trait::async_trait]
impl ResultCache for RedisResultCache {
    async fn get(&self, key: &CacheKey) -> AppResult<Option<JsonValue>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(key.to_string()).await?;

        match cached {
            Some(json) => {
                let value = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &CacheKey, value: JsonValue, ttl: Duration) -> AppResult<()> {
        self.set_in_background(key, &value, ttl);
        Ok(())
    }

    async fn evict(&self, key: &CacheKey) -> AppResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(key.to_string()).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

// Tests below the ttl helpers need a live Redis at REDIS_URL (default localhost)

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn redis_client() -> Client {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        create_redis_client(&redis_url).unwrap()
    }

    #[test]
    fn test_ttl_secs_rounds_up() {
        assert_eq!(ttl_secs(Duration::from_secs(7200)), 7200);
        assert_eq!(ttl_secs(Duration::from_millis(1500)), 2);
    }

    #[test]
    fn test_ttl_secs_is_at_least_one() {
        assert_eq!(ttl_secs(Duration::ZERO), 1);
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let (cache, _handle) = RedisResultCache::new(redis_client());

        let key = CacheKey::profile(987_654_321);
        let retrieved = cache.get(&key).await.unwrap();

        assert_eq!(retrieved, None);
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (cache, _handle) = RedisResultCache::new(redis_client());

        let key = CacheKey::vision(b"redis round trip");
        let value = json!("Lelouch Lamperouge");

        cache.put(&key, value.clone(), Duration::from_secs(60)).await.unwrap();

        // Give the background task time to process
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        assert_eq!(cache.get(&key).await.unwrap(), Some(value));

        cache.evict(&key).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cache_writer_graceful_shutdown() {
        let (cache, handle) = RedisResultCache::new(redis_client());

        let key = CacheKey::profile(555_000_111);
        let value = json!("Flushed on shutdown");

        cache.set_in_background(&key, &value, Duration::from_secs(60));
        handle.shutdown().await;

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(cache.get(&key).await.unwrap(), Some(value));
        cache.evict(&key).await.unwrap();
    }
}
