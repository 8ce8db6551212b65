use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Shared Redis connection manager guarded by a Tokio mutex.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Redis connection pool backed by a single auto-reconnecting manager.
pub struct RedisPool {
    manager: SharedConnectionManager,
}

impl RedisPool {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).context("failed to parse REDIS_URL connection string")?;
        let connection_manager = ConnectionManager::new(client)
            .await
            .context("failed to initialize Redis connection manager")?;

        info!("Redis connection manager ready");

        Ok(Self {
            manager: Arc::new(Mutex::new(connection_manager)),
        })
    }

    pub fn manager(&self) -> SharedConnectionManager {
        self.manager.clone()
    }
}

/// Cache-aside helpers storing JSON values under a key prefix with a TTL.
#[derive(Clone)]
pub struct JsonCache {
    manager: SharedConnectionManager,
    prefix: String,
    ttl: Duration,
}

impl JsonCache {
    pub fn new(manager: SharedConnectionManager, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            manager,
            prefix: prefix.into(),
            ttl,
        }
    }

    pub fn key(&self, id: &str) -> String {
        cache_key(&self.prefix, id)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read and decode a cached value. A value that no longer decodes is
    /// treated as a miss.
    pub async fn get<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>> {
        let key = self.key(id);
        let raw: Option<String> = {
            let mut conn = self.manager.lock().await;
            conn.get(&key).await.context("redis GET failed")?
        };

        Ok(raw.and_then(|raw| match decode::<T>(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(key = %key, error = %err, "discarding undecodable cache entry");
                None
            }
        }))
    }

    pub async fn set<T: Serialize>(&self, id: &str, value: &T) -> Result<()> {
        let key = self.key(id);
        let payload = encode(value)?;
        let ttl_secs = self.ttl.as_secs().max(1);

        let mut conn = self.manager.lock().await;
        conn.set_ex::<_, _, ()>(&key, payload, ttl_secs)
            .await
            .context("redis SETEX failed")?;
        Ok(())
    }

    pub async fn invalidate(&self, id: &str) -> Result<()> {
        let key = self.key(id);
        let mut conn = self.manager.lock().await;
        conn.del::<_, ()>(&key).await.context("redis DEL failed")?;
        Ok(())
    }
}

/// Fixed-window hit counter: `INCR` a key, expiring it when the window opens.
#[derive(Clone)]
pub struct WindowCounter {
    manager: SharedConnectionManager,
    prefix: String,
}

/// State of one counter after a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    pub count: u64,
    /// Seconds until the window resets; `None` when Redis reports no expiry.
    pub reset_after_secs: Option<u64>,
}

impl WindowCounter {
    pub fn new(manager: SharedConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            manager,
            prefix: prefix.into(),
        }
    }

    pub async fn hit(&self, id: &str, window: Duration) -> Result<WindowHit> {
        let key = cache_key(&self.prefix, id);
        let mut conn = self.manager.lock().await;

        let count: u64 = conn.incr(&key, 1u64).await.context("redis INCR failed")?;
        if count == 1 {
            conn.expire::<_, ()>(&key, window.as_secs().max(1) as i64)
                .await
                .context("redis EXPIRE failed")?;
        }
        let ttl: i64 = conn.ttl(&key).await.context("redis TTL failed")?;

        Ok(WindowHit {
            count,
            reset_after_secs: u64::try_from(ttl).ok().filter(|secs| *secs > 0),
        })
    }
}

/// Build a namespaced cache key, e.g. `rbac:role:teller`.
pub fn cache_key(prefix: &str, id: &str) -> String {
    format!("{}:{}", prefix.trim_end_matches(':'), id)
}

fn encode<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("failed to encode cache value")
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).context("failed to decode cache value")
}
