use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::db::with_timeout;
use crate::error::AppError;
use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A user's stored variant for one experiment
    Assignment { experiment_id: Uuid, user_id: Uuid },
    /// Active candidate pool of a given size
    Candidates(usize),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Assignment {
                experiment_id,
                user_id,
            } => write!(f, "exp:assign:{}:{}", experiment_id, user_id),
            CacheKey::Candidates(size) => write!(f, "candidates:active:{}", size),
        }
    }
}

/// Creates a Redis client for assignment and candidate caching
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for asynchronous cache writes
struct CacheWriteMessage {
    key: String,
    value: String,
    ttl: u64,
}

/// Read-through cache in front of the experiment and item stores.
///
/// Reads hit Redis directly; writes go through a background task so a slow
/// cache never delays a recommendation. Every Redis round trip, read or
/// write, is bounded by `io_timeout`.
#[derive(Clone)]
pub struct Cache {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<CacheWriteMessage>,
    io_timeout: Duration,
}

/// Stops the background writer once queued writes are flushed
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl CacheWriterHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");
    }
}

impl Cache {
    /// Connects the cache and spawns its writer task
    pub async fn new(redis_client: Client, io_timeout: Duration) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        tokio::spawn(async move {
            Self::cache_writer_task(client, io_timeout, write_rx, shutdown_rx).await;
        });

        (
            Self {
                redis_client,
                write_tx,
                io_timeout,
            },
            CacheWriterHandle { shutdown_tx },
        )
    }

    async fn cache_writer_task(
        client: Client,
        io_timeout: Duration,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");
        let mut failed_writes: u64 = 0;

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::write_to_redis(&client, io_timeout, msg).await {
                        failed_writes += 1;
                        tracing::warn!(error = %e, failed_writes, "Cache write failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    // Senders live in every Cache clone, so drain what is
                    // queued now instead of waiting for the channel to close
                    let mut flushed = 0;
                    while let Ok(msg) = write_rx.try_recv() {
                        if let Err(e) = Self::write_to_redis(&client, io_timeout, msg).await {
                            tracing::warn!(error = %e, "Cache write failed during shutdown");
                        }
                        flushed += 1;
                    }

                    tracing::info!(flushed, failed_writes, "Cache writer task stopped");
                    break;
                }
            }
        }
    }

    async fn write_to_redis(
        client: &Client,
        io_timeout: Duration,
        msg: CacheWriteMessage,
    ) -> AppResult<()> {
        with_timeout("cache write", io_timeout, async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            let _: () = conn.set_ex(msg.key, msg.value, msg.ttl).await?;
            Ok::<_, AppError>(())
        })
        .await
    }

    /// Retrieves and deserializes a cached value, `None` on a miss.
    ///
    /// A read that outlives the I/O timeout fails with `StoreUnavailable`.
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let cached: Option<String> = with_timeout("cache read", self.io_timeout, async {
            let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
            let cached: Option<String> = conn.get(format!("{}", key)).await?;
            Ok::<_, AppError>(cached)
        })
        .await?;

        match cached {
            Some(json) => {
                let data = serde_json::from_str(&json).map_err(|e| {
                    AppError::StoreUnavailable(format!("cache entry for {} is corrupt: {}", key, e))
                })?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Queues a value for writing with the given TTL in seconds.
    ///
    /// Returns immediately; serialization or send failures are logged only.
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache serialization error");
                return;
            }
        };

        let msg = CacheWriteMessage {
            key: format!("{}", key),
            value: json,
            ttl,
        };

        if let Err(e) = self.write_tx.send(msg) {
            tracing::error!(error = %e, "Failed to send cache write message");
        }
    }
}
