use std::time::Duration;

use anyhow::Context;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};

/// Thin wrapper over a shared Redis connection manager, grounded on
/// `predictiq-api::cache::RedisCache`. Used only by `oracle::RedisOracle`
/// and for caching read-only collaborator-side data (promotion metadata,
/// etc.) — per spec §5, prize stock and customer counters are never cached
/// here; every read of those goes through `PromotionStore` inside the
/// transaction.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    pub async fn new(redis_url: &str) -> anyhow::Result<Self> {
        let client = Client::open(redis_url).context("invalid REDIS_URL")?;
        let manager = client
            .get_connection_manager()
            .await
            .context("failed to connect to redis")?;
        Ok(Self { manager })
    }

    pub async fn get_json<T>(&self, key: &str) -> anyhow::Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let mut conn = self.manager.clone();
        let val: Option<String> = conn.get(key).await?;
        match val {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> anyhow::Result<()>
    where
        T: Serialize,
    {
        let mut conn = self.manager.clone();
        let raw = serde_json::to_string(value)?;
        let _: () = conn.set_ex(key, raw, ttl.as_secs()).await?;
        Ok(())
    }

    pub async fn del(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.manager.clone();
        let _: usize = conn.del(key).await?;
        Ok(())
    }

    /// Atomically increments `key` and (re-)arms its expiry on first use
    /// within the window. Backs `oracle::RedisOracle`'s sliding-window
    /// admission check.
    pub async fn increment_with_expiry(&self, key: &str, window: Duration) -> anyhow::Result<i64> {
        let mut conn = self.manager.clone();
        let count: i64 = conn.incr(key, 1).await?;
        if count == 1 {
            let _: bool = conn.expire(key, window.as_secs() as i64).await?;
        }
        Ok(count)
    }
}
