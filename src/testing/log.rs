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

//! MemLog: an in-memory partitioned [`DurableLog`] with consumer groups.
//!
//! Within a group, a partition is leased to one subscription at a time, from its
//! committed offset until that offset is acked. This gives per-partition ordering
//! across the whole group. Dropping a subscription releases its leases, so an
//! unacked message is delivered again: at-least-once, never lost.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use tokio::sync::watch;

use crate::errors::Tier;
use crate::errors::Unavailable;
use crate::log_stream::AckHandle;
use crate::log_stream::Delivery;
use crate::log_stream::DeliveryStream;
use crate::log_stream::LogMessage;
use crate::log_stream::Position;
use crate::DurableLog;

#[derive(Debug, Default)]
struct PartitionProgress {
    /// Every offset below this is committed; this is the next one to deliver.
    committed: u64,

    /// The subscription holding the message at `committed`.
    leased_by: Option<u64>,

    /// Acked offsets, in ack order.
    history: Vec<u64>,
}

#[derive(Debug)]
struct Group {
    parts: Vec<PartitionProgress>,

    /// Where the next lease search starts, to spread partitions over subscriptions.
    next_partition: usize,
}

#[derive(Debug)]
struct State {
    partitions: Vec<Vec<LogMessage>>,
    groups: BTreeMap<String, Group>,
    next_subscription: u64,
    fail_appends: bool,
    fail_acks: u64,
    fail_subscribes: u64,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,

    /// Bumped on every append, ack and lease release, to wake waiting subscriptions.
    changed: watch::Sender<u64>,
}

#[derive(Debug, Clone)]
pub struct MemLog {
    inner: Arc<Inner>,
}

impl Default for MemLog {
    fn default() -> Self {
        Self::new(4)
    }
}

impl MemLog {
    /// Create a log with `partitions` partitions, at least one.
    pub fn new(partitions: u32) -> Self {
        let n = partitions.max(1) as usize;
        let (changed, _) = watch::channel(0);

        MemLog {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    partitions: vec![vec![]; n],
                    groups: BTreeMap::new(),
                    next_subscription: 1,
                    fail_appends: false,
                    fail_acks: 0,
                    fail_subscribes: 0,
                }),
                changed,
            }),
        }
    }

    pub fn partition_count(&self) -> u32 {
        self.lock().partitions.len() as u32
    }

    /// The partition all messages of `partition_key` go to.
    pub fn partition_for(&self, partition_key: &str) -> u32 {
        let n = self.lock().partitions.len() as u64;
        let mut h = DefaultHasher::new();
        partition_key.hash(&mut h);
        (h.finish() % n) as u32
    }

    pub fn set_fail_appends(&self, fail: bool) {
        self.lock().fail_appends = fail;
    }

    /// Make the next `n` acks fail. A failed ack releases the lease without
    /// committing, as if the consumer crashed before its commit.
    pub fn fail_next_acks(&self, n: u64) {
        self.lock().fail_acks = n;
    }

    pub fn fail_next_subscribes(&self, n: u64) {
        self.lock().fail_subscribes = n;
    }

    /// The next offset `group` will consume from `partition`.
    pub fn committed_offset(&self, group: &str, partition: u32) -> u64 {
        let state = self.lock();
        state
            .groups
            .get(group)
            .and_then(|g| g.parts.get(partition as usize))
            .map(|p| p.committed)
            .unwrap_or(0)
    }

    /// Offsets `group` acked on `partition`, in the order they were committed.
    pub fn commit_history(&self, group: &str, partition: u32) -> Vec<u64> {
        let state = self.lock();
        state
            .groups
            .get(group)
            .and_then(|g| g.parts.get(partition as usize))
            .map(|p| p.history.clone())
            .unwrap_or_default()
    }

    /// Messages not yet committed by `group`.
    pub fn backlog(&self, group: &str) -> u64 {
        let state = self.lock();
        state
            .partitions
            .iter()
            .enumerate()
            .map(|(i, msgs)| {
                let committed = state
                    .groups
                    .get(group)
                    .map(|g| g.parts[i].committed)
                    .unwrap_or(0);
                msgs.len() as u64 - committed
            })
            .sum()
    }

    pub fn messages(&self, partition: u32) -> Vec<LogMessage> {
        self.lock()
            .partitions
            .get(partition as usize)
            .cloned()
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.inner.changed.send_modify(|v| *v += 1);
    }

    /// Lease the next deliverable message of `group` to subscription `sub`.
    fn try_lease(&self, group_name: &str, sub: u64) -> Option<Delivery> {
        let mut state = self.lock();
        let State {
            partitions, groups, ..
        } = &mut *state;

        let group = groups.get_mut(group_name)?;
        let n = partitions.len();

        for i in 0..n {
            let p = (group.next_partition + i) % n;

            let progress = &mut group.parts[p];
            if progress.leased_by.is_some() {
                continue;
            }

            let Some(msg) = partitions[p].get(progress.committed as usize) else {
                continue;
            };

            progress.leased_by = Some(sub);
            group.next_partition = (p + 1) % n;

            return Some(Delivery {
                message: msg.clone(),
                ack: AckHandle::new(group_name, msg.position, sub),
            });
        }

        None
    }

    fn release(&self, group_name: &str, sub: u64) {
        {
            let mut state = self.lock();
            if let Some(group) = state.groups.get_mut(group_name) {
                for p in group.parts.iter_mut() {
                    if p.leased_by == Some(sub) {
                        p.leased_by = None;
                    }
                }
            }
        }
        self.bump();
    }
}

fn ack_locked(state: &mut State, handle: &AckHandle) -> Result<(), Unavailable> {
    let pos = handle.position();
    let ctx = format!("ack {}", handle);

    let Some(group) = state.groups.get_mut(handle.group()) else {
        return Err(Unavailable::new_str(Tier::Log, "unknown consumer group").context(ctx));
    };

    let Some(progress) = group.parts.get_mut(pos.partition as usize) else {
        return Err(Unavailable::new_str(Tier::Log, "unknown partition").context(ctx));
    };

    // Already committed: the committed offset never moves back.
    if pos.offset < progress.committed {
        return Ok(());
    }

    if progress.leased_by != Some(handle.token()) || pos.offset != progress.committed {
        return Err(
            Unavailable::new_str(Tier::Log, "offset is not leased by this subscription")
                .context(ctx),
        );
    }

    if state.fail_acks > 0 {
        state.fail_acks -= 1;
        progress.leased_by = None;
        return Err(Unavailable::new_str(Tier::Log, "injected: commit failed").context(ctx));
    }

    progress.committed += 1;
    progress.leased_by = None;
    progress.history.push(pos.offset);
    Ok(())
}

/// One subscription. Releases its leases when dropped.
struct Subscriber {
    log: MemLog,
    group: String,
    id: u64,
    changes: watch::Receiver<u64>,
}

impl Subscriber {
    async fn next(&mut self) -> Option<Delivery> {
        loop {
            // Mark the current version seen before looking, so a change after the look wakes us.
            self.changes.borrow_and_update();

            if let Some(d) = self.log.try_lease(&self.group, self.id) {
                return Some(d);
            }

            if self.changes.changed().await.is_err() {
                return None;
            }
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.log.release(&self.group, self.id);
    }
}

#[async_trait::async_trait]
impl DurableLog for MemLog {
    async fn append(&self, partition_key: &str, payload: Vec<u8>) -> Result<Position, Unavailable> {
        let partition = self.partition_for(partition_key);

        let pos = {
            let mut state = self.lock();

            if state.fail_appends {
                return Err(Unavailable::new_str(Tier::Log, "injected: append failed")
                    .context(format!("append partition_key={}", partition_key)));
            }

            let msgs = &mut state.partitions[partition as usize];
            let pos = Position::new(partition, msgs.len() as u64);
            msgs.push(LogMessage::new(partition_key, pos, payload));
            pos
        };

        self.bump();
        Ok(pos)
    }

    async fn subscribe(&self, group: &str) -> Result<DeliveryStream, Unavailable> {
        let id = {
            let mut state = self.lock();

            if state.fail_subscribes > 0 {
                state.fail_subscribes -= 1;
                return Err(Unavailable::new_str(Tier::Log, "injected: subscribe failed")
                    .context(format!("subscribe group={}", group)));
            }

            let n = state.partitions.len();
            state.groups.entry(group.to_string()).or_insert_with(|| Group {
                parts: (0..n).map(|_| PartitionProgress::default()).collect(),
                next_partition: 0,
            });

            let id = state.next_subscription;
            state.next_subscription += 1;
            id
        };

        let sub = Subscriber {
            log: self.clone(),
            group: group.to_string(),
            id,
            changes: self.inner.changed.subscribe(),
        };

        let strm = futures::stream::unfold(sub, |mut sub| async move {
            let d = sub.next().await?;
            Some((Ok::<_, Unavailable>(d), sub))
        });

        Ok(Box::pin(strm))
    }

    async fn ack(&self, handle: &AckHandle) -> Result<(), Unavailable> {
        let res = {
            let mut state = self.lock();
            ack_locked(&mut state, handle)
        };

        self.bump();
        res
    }
}
