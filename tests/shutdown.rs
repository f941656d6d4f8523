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

//! Shutdown integration test
//!
//! Draining stops new pulls, lets in-flight messages finish and commit, and bounds the
//! wait with the drain timeout.

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use pretty_assertions::assert_eq;
use tiered_pipeline::testing::log::MemLog;
use tiered_pipeline::testing::store::MemStore;
use tiered_pipeline::testing::types::TestConfig;
use tiered_pipeline::testing::util::retry;
use tiered_pipeline::DrainReport;
use tiered_pipeline::DurableLog;
use tiered_pipeline::PipelineConfig;
use tiered_pipeline::PoolState;
use tiered_pipeline::Record;
use tiered_pipeline::WorkerPool;

const GROUP: &str = "drain-test";

fn config(drain_timeout: Option<Duration>) -> PipelineConfig {
    PipelineConfig::new("drain-test")
        .with_consumer_group(GROUP)
        .with_workers(3)
        .with_drain_timeout(drain_timeout)
}

fn start(config: &PipelineConfig, log: &MemLog, store: &MemStore) -> WorkerPool<TestConfig> {
    WorkerPool::start(config, Arc::new(log.clone()), Arc::new(store.clone()))
}

async fn wait_for_upsert_started(store: &MemStore) -> anyhow::Result<()> {
    retry(
        || async {
            match store.counters().await.upserts_started {
                0 => Err("no upsert started".to_string()),
                _ => Ok(()),
            }
        },
        50,
        Duration::from_millis(20),
    )
    .await
    .map_err(anyhow::Error::msg)
}

#[tokio::test]
async fn test_idle_pool_stops() {
    let log = MemLog::new(2);
    let store = MemStore::new();

    let pool = start(&config(None), &log, &store);
    assert_eq!(pool.state(), PoolState::Running);

    let report = pool.shutdown().await;

    assert_eq!(
        report,
        DrainReport {
            drained: 3,
            aborted: 0,
            aborted_tasks: 0
        }
    );
    assert_eq!(pool.state(), PoolState::Stopped);
}

#[tokio::test]
async fn test_in_flight_message_completes_and_commits() -> anyhow::Result<()> {
    let log = MemLog::new(2);
    let store = MemStore::new();
    let r = Record::new("slow").with_field("v", 1);

    store.set_upsert_delay(Some(Duration::from_millis(200))).await;
    let pos = log.append("slow", r.encode()?).await?;

    let pool = start(&config(Some(Duration::from_secs(10))), &log, &store);
    wait_for_upsert_started(&store).await?;

    let report = pool.shutdown().await;

    assert_eq!(
        report,
        DrainReport {
            drained: 3,
            aborted: 0,
            aborted_tasks: 0
        }
    );
    assert_eq!(pool.state(), PoolState::Stopped);
    assert_eq!(store.get("slow").await, Some(r));
    assert_eq!(log.committed_offset(GROUP, pos.partition), pos.offset + 1);
    assert_eq!(pool.stats().committed, 1);
    Ok(())
}

#[tokio::test]
async fn test_no_new_pulls_after_shutdown() -> anyhow::Result<()> {
    let log = MemLog::new(1);
    let store = MemStore::new();

    let pool = start(&config(None), &log, &store);
    pool.shutdown().await;

    log.append("late", Record::new("late").encode()?).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(store.get("late").await, None);
    assert_eq!(log.backlog(GROUP), 1);
    assert_eq!(pool.stats().delivered, 0);
    Ok(())
}

#[tokio::test]
async fn test_drain_timeout_aborts_stuck_worker() -> anyhow::Result<()> {
    let log = MemLog::new(2);
    let store = MemStore::new();

    store.set_upsert_delay(Some(Duration::from_secs(3600))).await;
    let pos = log.append("stuck", Record::new("stuck").encode()?).await?;

    let pool = start(&config(Some(Duration::from_millis(100))), &log, &store);
    wait_for_upsert_started(&store).await?;

    let report = pool.shutdown().await;

    assert_eq!(
        report,
        DrainReport {
            drained: 2,
            aborted: 1,
            aborted_tasks: 0
        }
    );
    assert_eq!(pool.state(), PoolState::Stopped);
    assert_eq!(store.get("stuck").await, None);
    assert_eq!(log.committed_offset(GROUP, pos.partition), 0);

    assert_eq!(log.backlog(GROUP), 1);

    // The aborted worker's lease is gone: a new consumer of the group gets the message.
    let mut strm = log.subscribe(GROUP).await?;
    let d = tokio::time::timeout(Duration::from_secs(1), strm.try_next())
        .await??
        .ok_or_else(|| anyhow::anyhow!("subscription closed"))?;
    assert_eq!(d.message.position, pos);
    assert_eq!(d.message.partition_key, "stuck");
    Ok(())
}

#[tokio::test]
async fn test_no_pull_after_shutdown_with_deep_backlog() -> anyhow::Result<()> {
    for round in 0..5 {
        let log = MemLog::new(1);
        let store = MemStore::new();
        let config = config(None).with_workers(1);

        store.set_upsert_delay(Some(Duration::from_millis(200))).await;
        for i in 0..50 {
            let key = format!("k{}", i);
            log.append(&key, Record::new(&key).encode()?).await?;
        }

        let pool = start(&config, &log, &store);
        wait_for_upsert_started(&store).await?;

        pool.shutdown().await;

        let stats = pool.stats();
        assert_eq!(stats.delivered, 1, "round {}", round);
        assert_eq!(stats.committed, 1, "round {}", round);
        assert_eq!(log.backlog(GROUP), 49, "round {}", round);
        assert_eq!(store.snapshot().await.len(), 1, "round {}", round);
    }
    Ok(())
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let log = MemLog::new(1);
    let store = MemStore::new();

    let pool = start(&config(None), &log, &store);

    let (a, b) = futures::join!(pool.shutdown(), pool.shutdown());
    let total = a.drained + b.drained;
    assert_eq!(total, 3, "exactly one call drains");

    assert_eq!(pool.shutdown().await, DrainReport::default());
    assert_eq!(pool.state(), PoolState::Stopped);
}

#[tokio::test]
async fn test_state_transitions_are_observable() -> anyhow::Result<()> {
    let log = MemLog::new(1);
    let store = MemStore::new();

    store.set_upsert_delay(Some(Duration::from_millis(300))).await;
    log.append("k", Record::new("k").encode()?).await?;

    let pool = Arc::new(start(&config(None), &log, &store));
    let mut rx = pool.watch_state();
    assert_eq!(*rx.borrow(), PoolState::Running);

    wait_for_upsert_started(&store).await?;

    let shutdown = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.shutdown().await })
    };

    let draining = *rx.wait_for(|s| *s != PoolState::Running).await?;
    assert_eq!(draining, PoolState::Draining);

    let stopped = *rx.wait_for(|s| *s == PoolState::Stopped).await?;
    assert_eq!(stopped, PoolState::Stopped);

    assert_eq!(shutdown.await?.drained, 3);
    assert_eq!(store.get("k").await, Some(Record::new("k")));
    Ok(())
}
