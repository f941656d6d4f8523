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

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use log::warn;

use crate::errors::WriteError;
use crate::log_stream::Position;
use crate::Cache;
use crate::DurableLog;
use crate::PipelineConfig;
use crate::Record;
use crate::Store;
use crate::TaskGroup;
use crate::TypeConfig;
use crate::WriteStrategy;

/// Where a successful write landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAck {
    /// The store holds the record.
    Persisted,

    /// The record is in the log at this position; the worker pool will persist it.
    Enqueued(Position),

    /// A background task identified by `task_id` is upserting the record.
    Deferred { task_id: u64 },
}

/// Applies a write to the cache, the log and the store according to a [`WriteStrategy`].
///
/// Every strategy is idempotent for a repeated identical record: each tier ends
/// up holding the most recent value and nothing accumulates.
///
/// No lock is held across tiers; the coordinator can be cloned and used from any
/// number of tasks.
pub struct WriteCoordinator<C: TypeConfig> {
    name: String,

    cache: Arc<C::Cache>,
    log: Arc<C::Log>,
    store: Arc<C::Store>,

    tasks: Arc<TaskGroup<C>>,

    write_through_ttl: Duration,
    write_behind_ttl: Duration,
}

impl<C> Clone for WriteCoordinator<C>
where
    C: TypeConfig,
{
    fn clone(&self) -> Self {
        WriteCoordinator {
            name: self.name.clone(),
            cache: self.cache.clone(),
            log: self.log.clone(),
            store: self.store.clone(),
            tasks: self.tasks.clone(),
            write_through_ttl: self.write_through_ttl,
            write_behind_ttl: self.write_behind_ttl,
        }
    }
}

impl<C> fmt::Display for WriteCoordinator<C>
where
    C: TypeConfig,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "WriteCoordinator({})", self.name)
    }
}

impl<C> WriteCoordinator<C>
where
    C: TypeConfig,
{
    pub fn new(
        config: &PipelineConfig,
        cache: Arc<C::Cache>,
        log: Arc<C::Log>,
        store: Arc<C::Store>,
        tasks: Arc<TaskGroup<C>>,
    ) -> Self {
        WriteCoordinator {
            name: config.name.clone(),
            cache,
            log,
            store,
            tasks,
            write_through_ttl: config.write_through_ttl,
            write_behind_ttl: config.write_behind_ttl,
        }
    }

    /// Write `record` with the given strategy.
    pub async fn write(
        &self,
        strategy: WriteStrategy,
        record: &Record,
    ) -> Result<WriteAck, WriteError> {
        match strategy {
            WriteStrategy::WriteThrough => {
                self.write_through(record).await?;
                Ok(WriteAck::Persisted)
            }
            WriteStrategy::WriteThroughDeferred => {
                let task_id = self.write_through_deferred(record).await?;
                Ok(WriteAck::Deferred { task_id })
            }
            WriteStrategy::WriteBehind => {
                let pos = self.write_behind(record).await?;
                Ok(WriteAck::Enqueued(pos))
            }
            WriteStrategy::WriteAround => {
                self.write_around(record).await?;
                Ok(WriteAck::Persisted)
            }
            WriteStrategy::Invalidate => {
                self.write_invalidate(record).await?;
                Ok(WriteAck::Persisted)
            }
        }
    }

    /// Set the cache, then upsert the store, both before returning.
    ///
    /// If the upsert fails the cache already holds the new value. The caller is told
    /// the write failed and may retry it.
    pub async fn write_through(&self, record: &Record) -> Result<(), WriteError> {
        let strategy = WriteStrategy::WriteThrough;

        self.set_cache(strategy, record, self.write_through_ttl).await?;
        self.upsert_store(strategy, record).await?;

        debug!("{}: {} key={} done", self, strategy, record.key);
        Ok(())
    }

    /// Set the cache, then upsert the store in a supervised background task.
    ///
    /// Returns the task id, which is logged along with the key if the upsert fails.
    pub async fn write_through_deferred(&self, record: &Record) -> Result<u64, WriteError> {
        let strategy = WriteStrategy::WriteThroughDeferred;

        self.set_cache(strategy, record, self.write_through_ttl).await?;

        let store = self.store.clone();
        let owned = record.clone();
        let label = format!("{} key={}", strategy, record.key);

        let task_id = self.tasks.spawn(label, async move {
            store
                .upsert(&owned)
                .await
                .map_err(|e| e.context(format!("deferred upsert key={}", owned.key)))
        });

        debug!(
            "{}: {} key={} handed to task {}",
            self, strategy, record.key, task_id
        );
        Ok(task_id)
    }

    /// Set the cache, then append the record to the durable log.
    ///
    /// If the append fails the cache already holds a value the store may never see.
    /// This is reported as a failed write rather than undone, since un-setting the
    /// cache would race with concurrent readers; the cache TTL or a later
    /// invalidating write corrects it.
    pub async fn write_behind(&self, record: &Record) -> Result<Position, WriteError> {
        let strategy = WriteStrategy::WriteBehind;

        let payload = record.encode().map_err(|source| WriteError::Encode {
            strategy,
            key: record.key.clone(),
            source,
        })?;

        self.set_cache(strategy, record, self.write_behind_ttl).await?;

        let pos = self
            .log
            .append(&record.key, payload)
            .await
            .map_err(|e| {
                warn!(
                    "{}: {} key={} cached but not appended; cache diverges from store until expiry or invalidation: {}",
                    self, strategy, record.key, e
                );
                WriteError::unavailable(strategy, &record.key, e.context("append"))
            })?;

        debug!("{}: {} key={} appended at {}", self, strategy, record.key, pos);
        Ok(pos)
    }

    /// Upsert the store only; the cache is neither set nor invalidated.
    pub async fn write_around(&self, record: &Record) -> Result<(), WriteError> {
        self.upsert_store(WriteStrategy::WriteAround, record).await?;

        debug!("{}: write-around key={} done", self, record.key);
        Ok(())
    }

    /// Upsert the store, then delete the cache entry so the next read repopulates it.
    pub async fn write_invalidate(&self, record: &Record) -> Result<(), WriteError> {
        let strategy = WriteStrategy::Invalidate;

        self.upsert_store(strategy, record).await?;

        self.cache
            .invalidate(&record.key)
            .await
            .map_err(|e| WriteError::unavailable(strategy, &record.key, e.context("invalidate")))?;

        debug!("{}: {} key={} done", self, strategy, record.key);
        Ok(())
    }

    async fn set_cache(
        &self,
        strategy: WriteStrategy,
        record: &Record,
        ttl: Duration,
    ) -> Result<(), WriteError> {
        let value = record
            .to_cache_value()
            .map_err(|source| WriteError::Encode {
                strategy,
                key: record.key.clone(),
                source,
            })?;

        self.cache
            .set(&record.key, value, ttl)
            .await
            .map_err(|e| WriteError::unavailable(strategy, &record.key, e.context("set")))
    }

    async fn upsert_store(
        &self,
        strategy: WriteStrategy,
        record: &Record,
    ) -> Result<(), WriteError> {
        self.store
            .upsert(record)
            .await
            .map_err(|e| WriteError::unavailable(strategy, &record.key, e.context("upsert")))
    }
}
