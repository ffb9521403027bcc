use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::sync::RwLock;

/// Per-customer admission control at the play boundary (C9, spec §4.8):
/// "the core accepts a pluggable allow/deny oracle" for a soft rate-limit
/// signal. Mirrors the shape of `security::RateLimiter`, generalized from a
/// per-IP/per-session key to a per-customer key and trait-ified so the API
/// layer can swap in a distributed implementation without touching C8.
#[async_trait]
pub trait ConcurrencyOracle: Send + Sync {
    /// Returns `true` if `customer_id` may proceed with a play attempt now.
    async fn allow(&self, customer_id: &str) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct OracleConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl OracleConfig {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

#[derive(Debug)]
struct WindowEntry {
    count: u32,
    window_start: SystemTime,
}

/// In-process sliding-window oracle, grounded on `security::RateLimiter`.
/// Does not touch prize stock or customer counters — it only gates whether
/// a request reaches C8 at all (spec §5: "No in-process cache of stock or
/// counters is permitted").
#[derive(Clone)]
pub struct InProcessOracle {
    config: OracleConfig,
    windows: Arc<RwLock<HashMap<String, WindowEntry>>>,
}

impl InProcessOracle {
    pub fn new(config: OracleConfig) -> Self {
        Self {
            config,
            windows: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl ConcurrencyOracle for InProcessOracle {
    async fn allow(&self, customer_id: &str) -> bool {
        let mut windows = self.windows.write().await;
        let now = SystemTime::now();

        let entry = windows.entry(customer_id.to_string()).or_insert(WindowEntry {
            count: 0,
            window_start: now,
        });

        if now
            .duration_since(entry.window_start)
            .unwrap_or(Duration::ZERO)
            >= self.config.window
        {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= self.config.max_requests {
            return false;
        }

        entry.count += 1;
        true
    }
}

/// Distributed oracle backed by the shared cache, for deployments running
/// more than one API process. Grounded on `cache::RedisCache`'s
/// `SET NX PX` idiom (see `src/cache.rs`); uses a single atomic `INCR` +
/// `EXPIRE` pair instead, since the admission decision needs a counter
/// rather than a presence flag.
#[derive(Clone)]
pub struct RedisOracle {
    cache: crate::cache::RedisCache,
    config: OracleConfig,
}

impl RedisOracle {
    pub fn new(cache: crate::cache::RedisCache, config: OracleConfig) -> Self {
        Self { cache, config }
    }
}

#[async_trait]
impl ConcurrencyOracle for RedisOracle {
    async fn allow(&self, customer_id: &str) -> bool {
        let key = format!("play_oracle:{customer_id}");
        match self.cache.increment_with_expiry(&key, self.config.window).await {
            Ok(count) => count <= self.config.max_requests as i64,
            Err(err) => {
                tracing::warn!(error = %err, "concurrency oracle cache lookup failed, allowing request");
                true
            }
        }
    }
}
