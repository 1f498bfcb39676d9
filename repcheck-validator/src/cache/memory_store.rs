//! In-process cache store
//!
//! Used when no Redis is deployed (`backend = "memory"`) and by tests.
//! Expiry is passive: stale entries are invisible to reads and scans and are
//! swept once the map outgrows the size recorded at the previous sweep.

use super::{CacheError, CacheStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

/// Longest lifetime an entry may be given
pub const MAX_ENTRY_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

/// Map size below which expired entries are never swept
const MIN_SWEEP_LEN: usize = 1024;

struct Entries {
    map: HashMap<String, (String, Instant)>,
    sweep_at: usize,
}

impl Default for Entries {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            sweep_at: MIN_SWEEP_LEN,
        }
    }
}

impl Entries {
    /// Drop expired entries when the map has doubled since the last sweep
    fn maybe_sweep(&mut self, now: Instant) {
        if self.map.len() < self.sweep_at {
            return;
        }
        self.map.retain(|_, (_, expires_at)| *expires_at > now);
        self.sweep_at = (self.map.len() * 2).max(MIN_SWEEP_LEN);
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .map
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .map
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let Some(expires_at) = now.checked_add(ttl.min(MAX_ENTRY_TTL)) else {
            warn!(key, ttl_secs = ttl.as_secs(), "Cache TTL out of range, entry not stored");
            return Ok(());
        };

        let mut entries = self.entries.write().await;
        entries.maybe_sweep(now);
        entries.map.insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .map
            .iter()
            .filter(|(key, (_, expires_at))| *expires_at > now && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let mut deleted = 0;
        for key in keys {
            if let Some((_, expires_at)) = entries.map.remove(key) {
                if expires_at > now {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }
}

/// Redis-style glob: `*` any run, `?` one char, `\` escapes the next char
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    backtrack = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '\\' if pi + 1 < p.len() => {
                    if p[pi + 1] == t[ti] {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                }
                c => {
                    if c == t[ti] {
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                }
            }
        }

        // Mismatch: let the last `*` swallow one more char
        match backtrack {
            Some((star_pi, star_ti)) => {
                pi = star_pi + 1;
                ti = star_ti + 1;
                backtrack = Some((star_pi, star_ti + 1));
            }
            None => return false,
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("otx_ip:*", "otx_ip:1.2.3.4"));
        assert!(!glob_match("otx_ip:*", "misp_ip:1.2.3.4"));
        assert!(glob_match("*_ip:1.2.3.4", "kaspersky_ip:1.2.3.4"));
        assert!(!glob_match("*_ip:1.2.3.4", "kaspersky_ip:11.2.3.4"));
        assert!(glob_match("a?c", "abc"));
        assert!(glob_match("a\\*c", "a*c"));
        assert!(!glob_match("a\\*c", "abc"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("", "x"));
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible() {
        let store = MemoryStore::new();
        store.set_ex("otx_ip:1.1.1.1", "2", Duration::from_millis(150)).await.unwrap();
        store.set_ex("otx_ip:2.2.2.2", "0", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.get("otx_ip:1.1.1.1").await.unwrap().as_deref(), Some("2"));
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(store.get("otx_ip:1.1.1.1").await.unwrap(), None);
        assert_eq!(store.scan("otx_ip:*").await.unwrap(), vec!["otx_ip:2.2.2.2"]);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_reads_do_not_extend_ttl() {
        let store = MemoryStore::new();
        store.set_ex("k", "1", Duration::from_millis(300)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.get("k").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_huge_ttl_is_clamped() {
        let store = MemoryStore::new();
        store.set_ex("k", "2", Duration::from_secs(u64::MAX)).await.unwrap();
        store.set_ex("j", "1", Duration::MAX).await.unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.get("j").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_expired_entries_swept_past_threshold() {
        let store = MemoryStore::new();
        for i in 0..MIN_SWEEP_LEN - 1 {
            store
                .set_ex(&format!("old:{}", i), "0", Duration::from_millis(20))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        // Below the threshold writes leave stale entries alone
        store.set_ex("fresh:0", "1", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.entries.read().await.map.len(), MIN_SWEEP_LEN);

        store.set_ex("fresh:1", "1", Duration::from_secs(60)).await.unwrap();
        let entries = store.entries.read().await;
        assert_eq!(entries.map.len(), 2);
        assert_eq!(entries.sweep_at, MIN_SWEEP_LEN);
        drop(entries);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_delete_counts_live_keys() {
        let store = MemoryStore::new();
        store.set_ex("a", "1", Duration::from_secs(60)).await.unwrap();
        store.set_ex("b", "1", Duration::from_secs(60)).await.unwrap();

        let deleted = store
            .delete(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(!store.is_empty().await);
    }
}
