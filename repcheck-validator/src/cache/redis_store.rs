//! Redis cache store
//!
//! Uses a multiplexed `ConnectionManager`, which is cheap to clone and safe
//! to share across workers; it reconnects on its own after a dropped
//! connection.

use super::{CacheError, CacheStore};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{info, warn};

/// Keys requested per SCAN round trip
const SCAN_BATCH: usize = 100;

pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect and verify with PING, retrying `attempts` times
    pub async fn connect(
        url: &str,
        attempts: u32,
        retry_delay: Duration,
    ) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let attempts = attempts.max(1);
        let mut last_error = CacheError::Unavailable;

        for attempt in 1..=attempts {
            match ConnectionManager::new(client.clone()).await {
                Ok(manager) => {
                    let store = Self { manager };
                    match store.ping().await {
                        Ok(()) => {
                            info!(attempt, "Connected to Redis score cache");
                            return Ok(store);
                        }
                        Err(e) => last_error = e,
                    }
                }
                Err(e) => last_error = e.into(),
            }

            warn!(
                attempt,
                attempts,
                error = %last_error,
                "Failed to connect to Redis"
            );
            if attempt < attempts {
                tokio::time::sleep(retry_delay).await;
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.manager.clone();
        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        redis::cmd("SETEX")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .arg(value)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.manager.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.manager.clone();
        let deleted = redis::cmd("DEL")
            .arg(keys)
            .query_async::<_, u64>(&mut conn)
            .await?;
        Ok(deleted)
    }
}
