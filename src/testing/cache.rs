// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! MemCache: an in-memory [`Cache`] with TTL expiry, counters and failure injection.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::errors::Tier;
use crate::errors::Unavailable;
use crate::Cache;

/// A cached value and when it stops being served.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    /// `None` never expires.
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(t) if t <= now)
    }
}

/// Operation counts of a [`MemCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounters {
    pub gets: u64,
    pub hits: u64,
    pub sets: u64,
    pub invalidations: u64,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, CacheEntry>,
    counters: CacheCounters,
    unavailable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemCache {
    state: Arc<Mutex<State>>,
}

impl MemCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following operation fail until reset.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// The live entry for `key`, if any.
    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        let state = self.state.lock().await;
        let now = Instant::now();
        state.entries.get(key).filter(|e| !e.is_expired(now)).cloned()
    }

    /// All live entries, by key.
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        let state = self.state.lock().await;
        let now = Instant::now();
        state
            .entries
            .values()
            .filter(|e| !e.is_expired(now))
            .map(|e| (e.key.clone(), e.value.clone()))
            .collect()
    }

    pub async fn counters(&self) -> CacheCounters {
        self.state.lock().await.counters
    }
}

fn check(state: &State, op: &str, key: &str) -> Result<(), Unavailable> {
    if state.unavailable {
        return Err(Unavailable::new_str(Tier::Cache, "injected: cache unavailable")
            .context(format!("{} key={}", op, key)));
    }
    Ok(())
}

#[async_trait::async_trait]
impl Cache for MemCache {
    async fn get(&self, key: &str) -> Result<Option<String>, Unavailable> {
        let mut state = self.state.lock().await;
        check(&state, "get", key)?;

        state.counters.gets += 1;

        let now = Instant::now();
        let expired = match state.entries.get(key) {
            None => return Ok(None),
            Some(e) => e.is_expired(now),
        };

        if expired {
            state.entries.remove(key);
            return Ok(None);
        }

        state.counters.hits += 1;
        Ok(state.entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), Unavailable> {
        let mut state = self.state.lock().await;
        check(&state, "set", key)?;

        state.counters.sets += 1;

        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };

        state.entries.insert(key.to_string(), CacheEntry {
            key: key.to_string(),
            value,
            expires_at,
        });
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), Unavailable> {
        let mut state = self.state.lock().await;
        check(&state, "invalidate", key)?;

        state.counters.invalidations += 1;
        state.entries.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), Unavailable> {
        let state = self.state.lock().await;
        check(&state, "ping", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let c = MemCache::new();
        c.set("a", "1".to_string(), Duration::from_secs(10))
            .await
            .unwrap();
        c.set("b", "2".to_string(), Duration::ZERO).await.unwrap();

        assert_eq!(c.get("a").await.unwrap(), Some("1".to_string()));

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(c.get("a").await.unwrap(), None);
        assert_eq!(c.get("b").await.unwrap(), Some("2".to_string()));
        assert_eq!(c.entry("b").await.unwrap().expires_at, None);
    }

    #[tokio::test]
    async fn test_invalidate_and_counters() {
        let c = MemCache::new();
        c.set("a", "1".to_string(), Duration::ZERO).await.unwrap();
        c.invalidate("a").await.unwrap();
        assert_eq!(c.get("a").await.unwrap(), None);

        assert_eq!(c.counters().await, CacheCounters {
            gets: 1,
            hits: 0,
            sets: 1,
            invalidations: 1,
        });
    }

    #[tokio::test]
    async fn test_unavailable() {
        let c = MemCache::new();
        c.set_unavailable(true).await;

        let err = c.get("a").await.unwrap_err();
        assert_eq!(err.tier(), Tier::Cache);
        assert!(c.ping().await.is_err());

        c.set_unavailable(false).await;
        assert!(c.ping().await.is_ok());
    }
}
