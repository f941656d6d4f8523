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
use std::marker::PhantomData;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use log::debug;
use log::error;
use log::info;
use log::warn;
use tokio::task::JoinHandle;

use crate::errors::Unavailable;
use crate::TypeConfig;

/// How a [`TaskGroup::join_all`] ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinReport {
    /// Tasks that finished on their own.
    pub joined: usize,

    /// Tasks still running at the timeout, and aborted.
    pub aborted: usize,
}

/// Supervises background tasks whose failure must be observed rather than dropped.
///
/// Each task gets an id that is logged together with its label, so a failure can be
/// correlated with the write that spawned it.
pub struct TaskGroup<C: TypeConfig> {
    name: String,

    next_id: AtomicU64,

    failures: Arc<AtomicU64>,

    tasks: Mutex<Vec<JoinHandle<()>>>,

    _p: PhantomData<fn() -> C>,
}

impl<C> fmt::Display for TaskGroup<C>
where
    C: TypeConfig,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TaskGroup({})", self.name)
    }
}

impl<C> TaskGroup<C>
where
    C: TypeConfig,
{
    pub fn new(name: impl ToString) -> Self {
        TaskGroup {
            name: name.to_string(),
            next_id: AtomicU64::new(1),
            failures: Arc::new(AtomicU64::new(0)),
            tasks: Mutex::new(vec![]),
            _p: PhantomData,
        }
    }

    /// Run `fut` in the background and return its task id.
    ///
    /// An `Err` result is logged with the id and `label`, and counted in [`Self::failures`].
    pub fn spawn<F>(&self, label: impl ToString, fut: F) -> u64
    where
        F: Future<Output = Result<(), Unavailable>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let label = label.to_string();
        let failures = self.failures.clone();
        let group = self.to_string();

        let supervised = async move {
            match fut.await {
                Ok(()) => {
                    debug!("{}: task {} ({}) done", group, id, label);
                }
                Err(e) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    error!("{}: task {} ({}) failed: {}", group, id, label, e);
                }
            }
        };

        let handle = C::spawn(supervised, format!("{}-task-{}", self.name, id));

        let mut tasks = self.tasks();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);

        id
    }

    /// Number of tasks not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tasks().iter().filter(|h| !h.is_finished()).count()
    }

    /// Number of tasks that returned an error so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Wait for every task spawned so far to finish, for at most `timeout` if given.
    ///
    /// Tasks still running when `timeout` elapses are aborted.
    pub async fn join_all(&self, timeout: Option<Duration>) -> JoinReport {
        let mut handles = std::mem::take(&mut *self.tasks());

        let all = futures::future::join_all(handles.iter_mut());

        let results = match timeout {
            None => Some(all.await),
            Some(t) => tokio::time::timeout(t, all).await.ok(),
        };

        if let Some(results) = results {
            for res in results {
                if let Err(e) = res {
                    error!("{}: task panicked or was cancelled: {}", self, e);
                }
            }

            info!("{}: joined {} background tasks", self, handles.len());
            return JoinReport {
                joined: handles.len(),
                aborted: 0,
            };
        }

        let mut report = JoinReport::default();
        let mut aborted = vec![];

        for h in handles.iter_mut() {
            if h.is_finished() {
                report.joined += 1;
            } else {
                h.abort();
                aborted.push(h);
            }
        }
        report.aborted = aborted.len();

        warn!(
            "{}: join timeout {:?} elapsed, aborted {} background tasks; their writes may not have reached the store",
            self, timeout, report.aborted
        );

        for h in aborted {
            let _ = h.await;
        }

        report
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
