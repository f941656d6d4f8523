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

#![allow(clippy::uninlined_format_args)]

//! A write pipeline that keeps a fast cache, a durable append-only log and an
//! authoritative store in step.
//!
//! Features:
//! - Write-through, deferred write-through, write-behind, write-around and invalidating writes
//! - Cache-aside reads with lazy, TTL-bounded population
//! - At-least-once draining of the log into the store by a fixed worker pool
//! - Poison messages skipped, store failures left for redelivery
//! - Cooperative shutdown that finishes in-flight messages, with a bounded drain
//!
//! # Tiers
//!
//! The tiers are reached only through the [`Cache`], [`DurableLog`] and [`Store`]
//! traits. A [`TypeConfig`] binds one implementation of each; handles are created by
//! the caller and passed in, there is no global state.
//!
//! # Write Process
//!
//! | strategy                 | cache           | log    | store                |
//! |--------------------------|-----------------|--------|----------------------|
//! | write-through            | set             |        | upsert               |
//! | write-through-deferred   | set             |        | upsert in background |
//! | write-behind             | set, no expiry  | append | upsert by a worker   |
//! | write-around             |                 |        | upsert               |
//! | invalidate               | delete          |        | upsert               |
//!
//! # Worker Process
//!
//! Each worker:
//! 1. Subscribes to the log as a member of the consumer group
//! 2. Decodes a message into a [`Record`]; an undecodable message is acked and skipped
//! 3. Upserts the record; on failure it does not ack, and re-subscribes so the log redelivers
//! 4. Acks the message, committing its offset
//!
//! ```text
//! | writer +--set------------------------------------------> Cache <--get/populate--+ reader
//! |        +--append---> DurableLog                                                 |
//! |        |             p0: [0][1][2]...                                           |
//! |        |             p1: [0][1]...        WorkerPool                            |
//! |        |                  |              .-> worker-0 --.                       |
//! |        |                  '--subscribe---+-> worker-1 --+--upsert--> Store <----'
//! |        |                                 '-> worker-2 --'           ^  read_by_key
//! |        '--upsert------------------------------------------------------'
//! |                                   ack (commit offset) after upsert
//! ```

mod config;
mod pipeline;
mod read_coordinator;
mod record;
mod stats;
mod strategy;
mod task_group;
mod type_config;
mod worker;
mod worker_pool;
mod write_coordinator;

pub use config::Backoff;
pub use config::PipelineConfig;
pub use config::DEFAULT_DRAIN_TIMEOUT;
pub use config::DEFAULT_READ_TTL;
pub use config::DEFAULT_WORKERS;
pub use pipeline::Pipeline;
pub use read_coordinator::Lookup;
pub use read_coordinator::ReadCoordinator;
pub use read_coordinator::ReadSource;
pub use record::Record;
pub use stats::WorkerStats;
pub use stats::WorkerStatsSnapshot;
pub use strategy::UnknownStrategy;
pub use strategy::WriteStrategy;
pub use task_group::JoinReport;
pub use task_group::TaskGroup;
pub use type_config::Cache;
pub use type_config::DurableLog;
pub use type_config::Store;
pub use type_config::TypeConfig;
pub use worker_pool::DrainReport;
pub use worker_pool::PoolState;
pub use worker_pool::WorkerPool;
pub use write_coordinator::WriteAck;
pub use write_coordinator::WriteCoordinator;

pub mod errors;
pub mod log_stream;

pub mod testing {
    pub mod cache;
    pub mod log;
    pub mod store;
    pub mod types;
    pub mod util;
}
