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

//! Testing utilities for asserting what each tier holds.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::testing::cache::MemCache;
use crate::testing::log::MemLog;
use crate::testing::store::MemStore;
use crate::Record;

/// Check that both the store and the cache hold exactly `expected` for each key.
///
/// Returns `Err(msg)` describing the first mismatch.
pub async fn check_tiers(
    cache: &MemCache,
    store: &MemStore,
    expected: &[Record],
) -> Result<(), String> {
    for want in expected {
        let stored = store.get(&want.key).await;
        if stored.as_ref() != Some(want) {
            return Err(format!(
                "Store mismatch for key '{}': expected {:?}, got {:?}",
                want.key, want, stored
            ));
        }

        let cached = cache
            .entry(&want.key)
            .await
            .map(|e| Record::from_cache_value(&e.value));

        match cached {
            Some(Ok(ref got)) if got == want => {}
            other => {
                return Err(format!(
                    "Cache mismatch for key '{}': expected {:?}, got {:?}",
                    want.key, want, other
                ));
            }
        }
    }

    Ok(())
}

/// Run `check` until it returns `Ok`, at most `max_attempts` times with `delay` in between.
pub async fn retry<F, Fut>(mut check: F, max_attempts: u32, delay: Duration) -> Result<(), String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match check().await {
            Ok(()) => return Ok(()),
            Err(error_msg) => {
                last_error = error_msg;
                if attempt < max_attempts {
                    sleep(delay).await;
                }
            }
        }
    }

    Err(format!(
        "Check failed after {} attempts. Last error: {}",
        max_attempts, last_error
    ))
}

/// [`check_tiers`] retried with default parameters (50 attempts, 50ms delay).
pub async fn wait_for_tiers(
    cache: &MemCache,
    store: &MemStore,
    expected: &[Record],
) -> Result<(), String> {
    retry(
        || check_tiers(cache, store, expected),
        50,
        Duration::from_millis(50),
    )
    .await
}

/// Wait until `group` has committed every message in `log`.
pub async fn wait_for_empty_backlog(log: &MemLog, group: &str) -> Result<(), String> {
    retry(
        || async {
            match log.backlog(group) {
                0 => Ok(()),
                n => Err(format!("group {} has {} uncommitted messages", group, n)),
            }
        },
        50,
        Duration::from_millis(50),
    )
    .await
}
