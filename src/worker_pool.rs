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
use std::sync::atomic;
use std::sync::Arc;
use std::time::Duration;

use log::error;
use log::info;
use log::warn;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::Backoff;
use crate::worker::LogWorker;
use crate::PipelineConfig;
use crate::TypeConfig;
use crate::WorkerStats;
use crate::WorkerStatsSnapshot;

/// Lifecycle of a [`WorkerPool`]: `Running -> Draining -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Workers are pulling and applying messages.
    Running,

    /// Shutdown was requested; workers finish their current message and exit.
    Draining,

    /// Every worker has exited and the log and store handles are released.
    Stopped,
}

/// How a shutdown ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Workers that exited on their own.
    pub drained: usize,

    /// Workers still running when the drain timeout elapsed, and aborted.
    pub aborted: usize,

    /// Deferred write-through tasks aborted at the drain timeout. Only set by
    /// [`Pipeline::shutdown`](crate::Pipeline::shutdown).
    pub aborted_tasks: usize,
}

/// A fixed-size set of consumers draining the durable log into the store.
///
/// Each worker runs in its own task, holds its own subscription and processes one
/// message at a time: decode, upsert, ack. Within a partition, a worker applies and
/// commits in offset order.
///
/// ## Shutdown
///
/// [`WorkerPool::shutdown`] moves the pool to [`PoolState::Draining`] and signals all
/// workers through one cancellation channel. A worker stops pulling, completes the
/// message it holds, and exits. When all workers have exited the pool is
/// [`PoolState::Stopped`]. If a drain timeout is configured, workers still running
/// after it are aborted, e.g. ones stuck in a store call that never returns.
pub struct WorkerPool<C: TypeConfig> {
    name: String,

    /// Turns `true` once, on shutdown. Observed by every worker.
    cancel_tx: watch::Sender<bool>,

    state_tx: watch::Sender<PoolState>,

    workers: Mutex<Vec<JoinHandle<()>>>,

    /// Released on [`PoolState::Stopped`].
    handles: Mutex<Option<(Arc<C::Log>, Arc<C::Store>)>>,

    stats: Arc<WorkerStats>,

    drain_timeout: Option<Duration>,

    /// A process-wide unique identifier for the pool. Used for debugging purposes.
    uniq: u64,
}

impl<C> fmt::Display for WorkerPool<C>
where
    C: TypeConfig,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "WorkerPool({})[uniq={}]", self.name, self.uniq)
    }
}

impl<C> WorkerPool<C>
where
    C: TypeConfig,
{
    /// Spawn `config.workers` consumers of `config.consumer_group`.
    pub fn start(config: &PipelineConfig, log: Arc<C::Log>, store: Arc<C::Store>) -> Self {
        static UNIQ: atomic::AtomicU64 = atomic::AtomicU64::new(0);
        let uniq = UNIQ.fetch_add(1, atomic::Ordering::SeqCst);

        let (cancel_tx, _) = watch::channel(false);
        let (state_tx, _) = watch::channel(PoolState::Running);

        let mut pool = WorkerPool {
            name: config.name.clone(),
            cancel_tx,
            state_tx,
            workers: Mutex::new(vec![]),
            handles: Mutex::new(Some((log.clone(), store.clone()))),
            stats: Arc::new(WorkerStats::default()),
            drain_timeout: config.drain_timeout,
            uniq,
        };

        let workers = (0..config.workers)
            .map(|i| {
                pool.spawn_worker(
                    i,
                    &config.consumer_group,
                    config.retry_backoff,
                    log.clone(),
                    store.clone(),
                )
            })
            .collect::<Vec<_>>();

        *pool.workers.get_mut() = workers;

        info!(
            "{}: started {} workers in group {}",
            pool, config.workers, config.consumer_group
        );

        pool
    }

    pub fn state(&self) -> PoolState {
        *self.state_tx.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<PoolState> {
        self.state_tx.subscribe()
    }

    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Drain the pool and wait until it is [`PoolState::Stopped`].
    ///
    /// Only the first call drains; later or concurrent calls wait for it to finish and
    /// return an empty report.
    pub async fn shutdown(&self) -> DrainReport {
        let mut workers = self.workers.lock().await;

        let first = self.state_tx.send_if_modified(|s| {
            if *s == PoolState::Running {
                *s = PoolState::Draining;
                true
            } else {
                false
            }
        });

        if !first {
            return DrainReport::default();
        }

        info!("{}: draining {} workers", self, workers.len());
        self.cancel_tx.send_replace(true);

        let mut handles = std::mem::take(&mut *workers);
        let report = self.join_workers(&mut handles).await;

        *self.handles.lock().await = None;
        self.state_tx.send_replace(PoolState::Stopped);

        info!(
            "{}: stopped; drained={} aborted={}",
            self, report.drained, report.aborted
        );
        report
    }

    async fn join_workers(&self, handles: &mut [JoinHandle<()>]) -> DrainReport {
        let all = futures::future::join_all(handles.iter_mut());

        let results = match self.drain_timeout {
            None => Some(all.await),
            Some(t) => tokio::time::timeout(t, all).await.ok(),
        };

        if let Some(results) = results {
            for res in results {
                if let Err(e) = res {
                    error!("{}: worker task failed: {}", self, e);
                }
            }
            return DrainReport {
                drained: handles.len(),
                ..DrainReport::default()
            };
        }

        let mut report = DrainReport::default();
        let mut aborted = vec![];

        for h in handles.iter_mut() {
            if h.is_finished() {
                report.drained += 1;
            } else {
                h.abort();
                aborted.push(h);
            }
        }
        report.aborted = aborted.len();

        warn!(
            "{}: drain timeout {:?} elapsed, aborted {} workers",
            self, self.drain_timeout, report.aborted
        );

        // Aborted tasks resolve at their next await point.
        for h in aborted {
            let _ = h.await;
        }

        report
    }

    fn spawn_worker(
        &self,
        i: usize,
        group: &str,
        backoff: Backoff,
        log: Arc<C::Log>,
        store: Arc<C::Store>,
    ) -> JoinHandle<()> {
        let name = format!("{}/worker-{}", self, i);

        let worker = LogWorker::<C> {
            group: group.to_string(),
            log,
            store,
            stats: self.stats.clone(),
            backoff,
            name: name.clone(),
        };

        C::spawn(worker.main(self.cancel_tx.subscribe()), name)
    }
}
