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

//! Read path integration test
//!
//! Cache-aside reads: a hit never touches the store, a miss reads the store once and
//! populates the cache with a bounded TTL, and a key absent everywhere is not cached.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tiered_pipeline::errors::ReadError;
use tiered_pipeline::testing::cache::MemCache;
use tiered_pipeline::testing::log::MemLog;
use tiered_pipeline::testing::store::MemStore;
use tiered_pipeline::testing::types::TestConfig;
use tiered_pipeline::Cache;
use tiered_pipeline::PipelineConfig;
use tiered_pipeline::ReadCoordinator;
use tiered_pipeline::ReadSource;
use tiered_pipeline::Record;
use tiered_pipeline::TaskGroup;
use tiered_pipeline::WriteCoordinator;

fn setup(
    read_ttl: Duration,
) -> (
    MemCache,
    MemStore,
    WriteCoordinator<TestConfig>,
    ReadCoordinator<TestConfig>,
) {
    let config = PipelineConfig::new("read-path").with_read_ttl(read_ttl);

    let cache = MemCache::new();
    let store = MemStore::new();

    let writer = WriteCoordinator::new(
        &config,
        Arc::new(cache.clone()),
        Arc::new(MemLog::new(1)),
        Arc::new(store.clone()),
        Arc::new(TaskGroup::new("read-path")),
    );
    let reader = ReadCoordinator::new(&config, Arc::new(cache.clone()), Arc::new(store.clone()));

    (cache, store, writer, reader)
}

#[tokio::test]
async fn test_write_around_then_read_populates_once() -> anyhow::Result<()> {
    let (cache, store, writer, reader) = setup(Duration::from_secs(60));
    let r = Record::new("k").with_field("v", "hello");

    writer.write_around(&r).await?;

    let first = reader.get("k").await?;
    assert_eq!(first.source, ReadSource::Store);
    assert_eq!(first.record, r);
    assert_eq!(store.counters().await.reads, 1);

    let entry = cache.entry("k").await.expect("populated by the read");
    assert!(entry.expires_at.is_some(), "read population has a bounded TTL");

    let second = reader.get("k").await?;
    assert_eq!(second.source, ReadSource::Cache);
    assert_eq!(second.record, r);
    assert_eq!(store.counters().await.reads, 1);

    Ok(())
}

#[tokio::test]
async fn test_invalidate_then_read_sources_store_again() -> anyhow::Result<()> {
    let (cache, store, writer, reader) = setup(Duration::from_secs(60));

    writer
        .write_around(&Record::new("a").with_field("x", 1))
        .await?;

    let got = reader.get("a").await?;
    assert_eq!(got.source, ReadSource::Store);
    assert_eq!(got.record.field("x"), Some(&serde_json::json!(1)));

    cache.invalidate("a").await?;

    let got = reader.get("a").await?;
    assert_eq!(got.source, ReadSource::Store);
    assert_eq!(got.into_record(), Record::new("a").with_field("x", 1));
    assert_eq!(store.counters().await.reads, 2);

    Ok(())
}

#[tokio::test]
async fn test_not_found_is_not_cached() {
    let (cache, store, _writer, reader) = setup(Duration::from_secs(60));

    for i in 1..=3 {
        let err = reader.get("ghost").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.key(), "ghost");
        assert_eq!(store.counters().await.reads, i);
    }

    assert_eq!(cache.counters().await.sets, 0);
}

#[tokio::test(start_paused = true)]
async fn test_populated_entry_expires() -> anyhow::Result<()> {
    let (_cache, store, writer, reader) = setup(Duration::from_secs(10));

    writer.write_around(&Record::new("t")).await?;

    assert_eq!(reader.get("t").await?.source, ReadSource::Store);
    assert_eq!(reader.get("t").await?.source, ReadSource::Cache);

    tokio::time::advance(Duration::from_secs(11)).await;

    assert_eq!(reader.get("t").await?.source, ReadSource::Store);
    assert_eq!(store.counters().await.reads, 2);
    Ok(())
}

#[tokio::test]
async fn test_undecodable_cache_value_falls_back_to_store() -> anyhow::Result<()> {
    let (cache, store, _writer, reader) = setup(Duration::from_secs(60));
    let r = Record::new("z").with_field("n", 7);

    store.insert(r.clone()).await;
    cache
        .set("z", "{Name:z Age:7}".to_string(), Duration::ZERO)
        .await?;

    let got = reader.get("z").await?;
    assert_eq!(got.source, ReadSource::Store);
    assert_eq!(got.record, r);

    // Repaired by the population.
    assert_eq!(reader.get("z").await?.source, ReadSource::Cache);
    Ok(())
}

#[tokio::test]
async fn test_tier_failures_are_reported() {
    let (cache, store, _writer, reader) = setup(Duration::from_secs(60));
    store.insert(Record::new("k")).await;

    cache.set_unavailable(true).await;
    let err = reader.get("k").await.unwrap_err();
    assert!(matches!(err, ReadError::Cache { .. }), "{}", err);
    cache.set_unavailable(false).await;

    store.set_unavailable(true).await;
    let err = reader.get("k").await.unwrap_err();
    assert!(matches!(err, ReadError::Store { .. }), "{}", err);
}

#[tokio::test]
async fn test_concurrent_misses_agree() -> anyhow::Result<()> {
    let (_cache, store, writer, reader) = setup(Duration::from_secs(60));
    let r = Record::new("hot").with_field("v", 1);
    writer.write_around(&r).await?;

    let reads = (0..8).map(|_| {
        let reader = reader.clone();
        tokio::spawn(async move { reader.get("hot").await })
    });

    for res in futures::future::join_all(reads).await {
        assert_eq!(res??.record, r);
    }

    // Redundant store reads are allowed, but never more than one per reader.
    let n = store.counters().await.reads;
    assert!((1..=8).contains(&n), "store reads: {}", n);
    Ok(())
}
