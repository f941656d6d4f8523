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

//! MemStore: an in-memory [`Store`] keyed by record key.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::errors::Tier;
use crate::errors::Unavailable;
use crate::Record;
use crate::Store;

/// Operation counts of a [`MemStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounters {
    /// `read_by_key` calls that reached the data.
    pub reads: u64,
    /// `upsert` calls that were accepted and started applying.
    pub upserts_started: u64,
    /// `upsert` calls that completed.
    pub upserts: u64,
}

#[derive(Debug, Default)]
struct State {
    rows: BTreeMap<String, Record>,
    counters: StoreCounters,
    fail_upserts: u64,
    unavailable: bool,
    upsert_delay: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct MemStore {
    state: Arc<Mutex<State>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following operation fail until reset.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Make the next `n` upserts fail.
    pub async fn fail_next_upserts(&self, n: u64) {
        self.state.lock().await.fail_upserts = n;
    }

    /// Make every upsert take `delay` before it is applied.
    pub async fn set_upsert_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.upsert_delay = delay;
    }

    /// Put a row in place without counting it as an upsert.
    pub async fn insert(&self, record: Record) {
        let mut state = self.state.lock().await;
        state.rows.insert(record.key.clone(), record);
    }

    pub async fn get(&self, key: &str) -> Option<Record> {
        self.state.lock().await.rows.get(key).cloned()
    }

    pub async fn snapshot(&self) -> BTreeMap<String, Record> {
        self.state.lock().await.rows.clone()
    }

    pub async fn counters(&self) -> StoreCounters {
        self.state.lock().await.counters
    }
}

#[async_trait::async_trait]
impl Store for MemStore {
    async fn upsert(&self, record: &Record) -> Result<(), Unavailable> {
        let delay = {
            let mut state = self.state.lock().await;

            if state.unavailable {
                return Err(Unavailable::new_str(Tier::Store, "injected: store unavailable")
                    .context(format!("upsert key={}", record.key)));
            }

            if state.fail_upserts > 0 {
                state.fail_upserts -= 1;
                return Err(Unavailable::new_str(Tier::Store, "injected: upsert failed")
                    .context(format!("upsert key={}", record.key)));
            }

            state.counters.upserts_started += 1;
            state.upsert_delay
        };

        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        let mut state = self.state.lock().await;
        state.rows.insert(record.key.clone(), record.clone());
        state.counters.upserts += 1;
        Ok(())
    }

    async fn read_by_key(&self, key: &str) -> Result<Option<Record>, Unavailable> {
        let mut state = self.state.lock().await;

        if state.unavailable {
            return Err(Unavailable::new_str(Tier::Store, "injected: store unavailable")
                .context(format!("read key={}", key)));
        }

        state.counters.reads += 1;
        Ok(state.rows.get(key).cloned())
    }

    async fn ping(&self) -> Result<(), Unavailable> {
        if self.state.lock().await.unavailable {
            return Err(Unavailable::new_str(Tier::Store, "injected: store unavailable"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let s = MemStore::new();
        let r = Record::new("k").with_field("x", 1);

        s.upsert(&r).await.unwrap();
        let once = s.snapshot().await;

        s.upsert(&r).await.unwrap();
        assert_eq!(s.snapshot().await, once);
        assert_eq!(s.counters().await.upserts, 2);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let s = MemStore::new();
        s.fail_next_upserts(2).await;

        let r = Record::new("k");
        assert!(s.upsert(&r).await.is_err());
        assert!(s.upsert(&r).await.is_err());
        assert!(s.upsert(&r).await.is_ok());

        assert_eq!(s.counters().await, StoreCounters {
            reads: 0,
            upserts_started: 1,
            upserts: 1,
        });
    }
}
