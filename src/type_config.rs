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
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::errors::Unavailable;
use crate::log_stream::AckHandle;
use crate::log_stream::DeliveryStream;
use crate::log_stream::Position;
use crate::Record;

/// Binds the concrete tier implementations and the task spawner used by a pipeline.
pub trait TypeConfig
where
    Self: fmt::Debug,
    Self: Default,
    Self: Send + Sync + 'static,
{
    /// The fast tier.
    type Cache: Cache;

    /// The durability tier for deferred writes.
    type Log: DurableLog;

    /// The authoritative tier.
    type Store: Store;

    /// Spawn a future that will run in the background.
    ///
    /// `name` is used for debugging purposes, it can be any string that identifies the future.
    /// The returned handle lets the pipeline wait for, or abort, the task on shutdown.
    fn spawn<F>(future: F, name: impl ToString) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static;
}

/// Key/value cache with TTL and explicit invalidation.
///
/// A `ttl` of [`Duration::ZERO`] means the entry never expires. Concurrent `set`s of one
/// key are last-writer-wins by completion order. Every failure is returned to the caller.
#[async_trait::async_trait]
pub trait Cache: Send + Sync + 'static {
    /// Returns `Ok(None)` on a miss. Never waits on the store.
    async fn get(&self, key: &str) -> Result<Option<String>, Unavailable>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), Unavailable>;

    async fn invalidate(&self, key: &str) -> Result<(), Unavailable>;

    /// Checked once at startup.
    async fn ping(&self) -> Result<(), Unavailable> {
        Ok(())
    }
}

/// Append-only, partitioned log addressed by consumer group, with manual acknowledgment.
///
/// Delivery is at-least-once. Messages sharing a partition key are delivered to a
/// consumer in non-decreasing offset order; there is no order across partition keys.
#[async_trait::async_trait]
pub trait DurableLog: Send + Sync + 'static {
    async fn append(&self, partition_key: &str, payload: Vec<u8>) -> Result<Position, Unavailable>;

    /// Start consuming as a member of `group`.
    ///
    /// A message delivered but not acked before the stream is dropped is redelivered.
    async fn subscribe(&self, group: &str) -> Result<DeliveryStream, Unavailable>;

    /// Commit the delivered offset for its partition and group.
    ///
    /// The committed offset never regresses: acking an offset that is already
    /// committed is a no-op.
    async fn ack(&self, handle: &AckHandle) -> Result<(), Unavailable>;

    /// Checked once at startup.
    async fn ping(&self) -> Result<(), Unavailable> {
        Ok(())
    }
}

/// The system of record.
///
/// `upsert` must be idempotent: applying the same record twice leaves the store as
/// applying it once. The worker pool relies on this for at-least-once delivery.
#[async_trait::async_trait]
pub trait Store: Send + Sync + 'static {
    async fn upsert(&self, record: &Record) -> Result<(), Unavailable>;

    /// Returns `Ok(None)` if no record has this key.
    async fn read_by_key(&self, key: &str) -> Result<Option<Record>, Unavailable>;

    /// Checked once at startup.
    async fn ping(&self) -> Result<(), Unavailable> {
        Ok(())
    }
}
