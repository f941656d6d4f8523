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

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Counters shared by all workers of a pool.
#[derive(Debug, Default)]
pub struct WorkerStats {
    delivered: AtomicU64,
    applied: AtomicU64,
    committed: AtomicU64,
    poison_skipped: AtomicU64,
    store_failures: AtomicU64,
    commit_failures: AtomicU64,
}

/// A point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    /// Messages pulled from the log.
    pub delivered: u64,
    /// Records upserted into the store.
    pub applied: u64,
    /// Acks accepted by the log, poison skips included.
    pub committed: u64,
    pub poison_skipped: u64,
    pub store_failures: u64,
    pub commit_failures: u64,
}

impl WorkerStats {
    pub(crate) fn incr_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_applied(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_committed(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_poison_skipped(&self) {
        self.poison_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_store_failures(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_commit_failures(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            poison_skipped: self.poison_skipped.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let s = WorkerStats::default();
        s.incr_delivered();
        s.incr_delivered();
        s.incr_applied();
        s.incr_committed();
        s.incr_poison_skipped();

        assert_eq!(s.snapshot(), WorkerStatsSnapshot {
            delivered: 2,
            applied: 1,
            committed: 1,
            poison_skipped: 1,
            store_failures: 0,
            commit_failures: 0,
        });
    }
}
