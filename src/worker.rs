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

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::TryStreamExt;
use log::debug;
use log::error;
use log::info;
use log::warn;
use tokio::sync::watch;

use crate::config::Backoff;
use crate::errors::Tier;
use crate::errors::Unavailable;
use crate::log_stream::AckHandle;
use crate::log_stream::Delivery;
use crate::log_stream::DeliveryStream;
use crate::DurableLog;
use crate::Record;
use crate::Store;
use crate::TypeConfig;
use crate::WorkerStats;

/// One consumer of the log: pulls a message, applies it to the store, then acks it.
pub(crate) struct LogWorker<C: TypeConfig> {
    /// The consumer group to join.
    pub(crate) group: String,

    pub(crate) log: Arc<C::Log>,

    pub(crate) store: Arc<C::Store>,

    /// Counters shared with the pool.
    pub(crate) stats: Arc<WorkerStats>,

    /// Delay between re-subscribe attempts.
    pub(crate) backoff: Backoff,

    /// Contains descriptive information of this worker.
    pub(crate) name: String,
}

impl<C> LogWorker<C>
where
    C: TypeConfig,
{
    /// Consume the group's messages until `cancel` turns `true`.
    ///
    /// Cancellation is observed only between messages: a message already pulled is
    /// applied and acked before this returns.
    ///
    /// # Error Handling
    ///
    /// - A payload that is not a record is skipped and acked
    /// - A failed upsert is not acked; the subscription is dropped and re-established
    ///   after a backoff, so the log redelivers the message
    /// - A failed ack is logged; the message may be applied again later, which is safe
    ///   because upserts are idempotent
    pub(crate) async fn main(self, cancel: watch::Receiver<bool>) {
        // sleep time and reason
        let mut sleep = None::<(Duration, String)>;
        let mut delay = None::<Duration>;

        loop {
            if *cancel.borrow() {
                info!("{}: canceled before subscribing", self.name);
                return;
            }

            if let Some((sleep_time, reason)) = sleep.take() {
                info!(
                    "{}: re-subscribe in {:?} because {}",
                    self.name, sleep_time, reason
                );

                let mut c = std::pin::pin!(cancelled(cancel.clone()));

                futures::select! {
                    _ = c.as_mut().fuse() => {
                        info!("{}: canceled while backing off", self.name);
                        return;
                    }
                    _ = tokio::time::sleep(sleep_time).fuse() => {}
                }
            }

            let strm = match self.log.subscribe(&self.group).await {
                Ok(strm) => {
                    info!("{}: subscribed to group {}", self.name, self.group);
                    strm
                }
                Err(e) => {
                    error!(
                        "{}: subscribe to group {} failed: {}",
                        self.name, self.group, e
                    );
                    let d = self.backoff.next(delay);
                    delay = Some(d);
                    sleep = Some((d, e.to_string()));
                    continue;
                }
            };

            let mut applied = 0;
            let res = self.consume(strm, cancel.clone(), &mut applied).await;

            match res {
                Ok(_) => {
                    info!(
                        "{}: consume loop exited normally(canceled by pool)",
                        self.name
                    );
                    return;
                }
                Err(e) => {
                    error!(
                        "{}: consume loop exited with error: {}; drop subscription so unacked messages are redelivered",
                        self.name, e
                    );

                    // Progress since the last failure means the failure is not a standing one.
                    if applied > 0 {
                        delay = None;
                    }
                    let d = self.backoff.next(delay);
                    delay = Some(d);
                    sleep = Some((d, e.to_string()));
                }
            }
        }
    }

    /// Pull and process messages from one subscription.
    ///
    /// Returns `Ok(())` if `cancel` became ready, or `Err` if the stream failed or a
    /// message could not be applied.
    async fn consume(
        &self,
        mut strm: DeliveryStream,
        cancel: watch::Receiver<bool>,
        applied: &mut u64,
    ) -> Result<(), Unavailable> {
        let mut c = std::pin::pin!(cancelled(cancel));

        loop {
            // Cancel goes first: once draining, no new message is pulled even if one is ready.
            let next = futures::select_biased! {
                _ = c.as_mut().fuse() => {
                    info!("{}: draining, stop pulling new messages", self.name);
                    return Ok(());
                }

                next = strm.try_next().fuse() => {
                    next
                }
            };

            let Some(delivery) = next? else {
                return Err(
                    Unavailable::new_str(Tier::Log, "subscription stream closed").context(&self.name)
                );
            };

            self.stats.incr_delivered();
            self.process(delivery).await?;
            *applied += 1;
        }
    }

    /// Apply one delivery to the store and ack it.
    pub(crate) async fn process(&self, delivery: Delivery) -> Result<(), Unavailable> {
        let (message, ack) = delivery.unpack();
        let pos = message.position;

        let record = match Record::decode(&message.payload) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    "{}: poison message at {} (partition key {:?}), skipping: {}",
                    self.name, pos, message.partition_key, e
                );
                self.stats.incr_poison_skipped();
                self.commit(&ack).await;
                return Ok(());
            }
        };

        if let Err(e) = self.store.upsert(&record).await {
            self.stats.incr_store_failures();
            return Err(e.context(format!("apply key={} at {}", record.key, pos)));
        }

        self.stats.incr_applied();
        debug!("{}: applied key={} at {}", self.name, record.key, pos);

        self.commit(&ack).await;
        Ok(())
    }

    async fn commit(&self, ack: &AckHandle) {
        match self.log.ack(ack).await {
            Ok(()) => {
                self.stats.incr_committed();
            }
            Err(e) => {
                self.stats.incr_commit_failures();
                warn!(
                    "{}: commit of {} failed, it will be redelivered and applied again: {}",
                    self.name, ack, e
                );
            }
        }
    }
}

/// Resolves once `rx` holds `true`, or its sender is gone.
pub(crate) async fn cancelled(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
