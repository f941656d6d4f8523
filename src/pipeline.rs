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

use log::error;
use log::info;
use tokio::time::Instant;

use crate::errors::StartupError;
use crate::Cache;
use crate::DrainReport;
use crate::DurableLog;
use crate::PipelineConfig;
use crate::ReadCoordinator;
use crate::Store;
use crate::TaskGroup;
use crate::TypeConfig;
use crate::WorkerPool;
use crate::WriteCoordinator;

/// The assembled pipeline: write and read coordinators over shared tier handles,
/// plus the worker pool draining the log into the store.
pub struct Pipeline<C: TypeConfig> {
    name: String,

    writer: WriteCoordinator<C>,

    reader: ReadCoordinator<C>,

    pool: WorkerPool<C>,

    /// Deferred write-through upserts.
    tasks: Arc<TaskGroup<C>>,
}

impl<C> fmt::Display for Pipeline<C>
where
    C: TypeConfig,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Pipeline({})", self.name)
    }
}

impl<C> Pipeline<C>
where
    C: TypeConfig,
{
    /// Validate `config`, check every tier is reachable, and start the worker pool.
    ///
    /// A failure is reported once and nothing is started.
    pub async fn start(
        config: PipelineConfig,
        cache: C::Cache,
        log: C::Log,
        store: C::Store,
    ) -> Result<Self, StartupError> {
        let name = config.name.clone();

        if let Err(e) = config.validate() {
            error!("Pipeline({}): {}", name, e);
            return Err(e.into());
        }

        let probes = futures::future::try_join3(
            async { cache.ping().await.map_err(|e| e.context("startup ping")) },
            async { log.ping().await.map_err(|e| e.context("startup ping")) },
            async { store.ping().await.map_err(|e| e.context("startup ping")) },
        );

        if let Err(e) = probes.await {
            error!("Pipeline({}): fatal, not serving: {}", name, e);
            return Err(e.into());
        }

        let cache = Arc::new(cache);
        let log = Arc::new(log);
        let store = Arc::new(store);

        let tasks = Arc::new(TaskGroup::new(format!("{}-deferred", name)));

        let writer = WriteCoordinator::new(
            &config,
            cache.clone(),
            log.clone(),
            store.clone(),
            tasks.clone(),
        );
        let reader = ReadCoordinator::new(&config, cache, store.clone());
        let pool = WorkerPool::start(&config, log, store);

        let pipeline = Pipeline {
            name,
            writer,
            reader,
            pool,
            tasks,
        };

        info!("{}: started", pipeline);
        Ok(pipeline)
    }

    pub fn writer(&self) -> &WriteCoordinator<C> {
        &self.writer
    }

    pub fn reader(&self) -> &ReadCoordinator<C> {
        &self.reader
    }

    pub fn pool(&self) -> &WorkerPool<C> {
        &self.pool
    }

    pub fn tasks(&self) -> &TaskGroup<C> {
        &self.tasks
    }

    /// Drain the worker pool, then wait for deferred write-through tasks.
    ///
    /// Both share one drain timeout: tasks still running when what is left of it
    /// elapses are aborted and counted in [`DrainReport::aborted_tasks`].
    /// Returns once the pool is stopped and its handles are released.
    pub async fn shutdown(&self) -> DrainReport {
        info!("{}: shutting down", self);

        let started = Instant::now();
        let timeout = self.pool.drain_timeout();

        let mut report = self.pool.shutdown().await;

        let remaining = timeout.map(|t| t.saturating_sub(started.elapsed()));
        let tasks = self.tasks.join_all(remaining).await;
        report.aborted_tasks = tasks.aborted;

        info!(
            "{}: shutdown complete; workers drained={} aborted={}, deferred tasks joined={} aborted={}",
            self, report.drained, report.aborted, tasks.joined, tasks.aborted
        );
        report
    }
}
