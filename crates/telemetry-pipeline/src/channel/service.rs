// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::pin::pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex, Notify};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::channel::queue::{Admission, BoundedQueue};
use crate::channel::{ChannelState, EnqueueOutcome, FlushReport, FlushStatus};
use crate::config::ChannelConfig;
use crate::constants::FLUSH_REPLY_GRACE;
use crate::diagnostics::{DeliveryStats, DeliveryStatsSnapshot};
use crate::error::{ChannelError, ConfigError, TransportError};
use crate::item::{BufferEntry, TelemetryItem};
use crate::transport::Transport;

/// State shared by the handles and the sender.
#[derive(Debug)]
struct Shared {
    queue: Mutex<BoundedQueue>,
    items_available: Notify,
    space_available: Notify,
    stats: DeliveryStats,
    /// Size of the batch the sender is currently transmitting.
    in_flight: AtomicU64,
    max_batch_size: usize,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, BoundedQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Commands for the sender task.
#[derive(Debug)]
enum ChannelCommand {
    /// Send every entry with a sequence below `up_to`, then reply.
    Flush {
        up_to: u64,
        deadline: Option<Instant>,
        respond_to: oneshot::Sender<FlushReport>,
    },
    Shutdown(oneshot::Sender<()>),
}

/// Producer-side handle of a channel.
///
/// Cheap to clone; every clone talks to the same buffer and sender.
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<ChannelCommand>,
    flush_lock: Arc<AsyncMutex<()>>,
    close_result: Arc<AsyncMutex<Option<Result<FlushReport, ChannelError>>>>,
    close_timeout: Option<Duration>,
}

impl ChannelHandle {
    /// Appends `item` to the buffer.
    ///
    /// Under [`OverflowPolicy::Block`](crate::config::OverflowPolicy::Block) a
    /// full buffer makes this wait for the sender to free space; the other
    /// policies never wait. Fails with [`ChannelError::Closed`] once `close`
    /// has started, including for producers that were waiting for space.
    pub async fn enqueue(&self, item: TelemetryItem) -> Result<EnqueueOutcome, ChannelError> {
        let mut item = item;
        loop {
            let mut space_freed = pin!(self.shared.space_available.notified());
            let (admission, queued) = {
                let mut queue = self.shared.queue();
                let admission = queue.push(item);
                if matches!(admission, Admission::Full(_)) {
                    // Registered under the lock so a wake-up cannot slip in
                    // between the failed push and the wait.
                    space_freed.as_mut().enable();
                }
                (admission, queue.len())
            };

            let outcome = match admission {
                Admission::Accepted { sequence } => EnqueueOutcome::Accepted { sequence },
                Admission::Evicted { sequence, evicted } => {
                    self.shared.stats.record_overflow(1);
                    EnqueueOutcome::AcceptedWithEviction {
                        sequence,
                        evicted_sequence: evicted,
                    }
                }
                Admission::Dropped => {
                    self.shared.stats.record_overflow(1);
                    return Ok(EnqueueOutcome::Dropped);
                }
                Admission::Closed(_) => return Err(ChannelError::Closed),
                Admission::Full(returned) => {
                    if self.tx.is_closed() {
                        return Err(ChannelError::WorkerUnavailable);
                    }
                    item = returned;
                    tokio::select! {
                        () = space_freed.as_mut() => {}
                        () = self.tx.closed() => {}
                    }
                    continue;
                }
            };

            self.shared.stats.record_enqueued();
            if queued >= self.shared.max_batch_size {
                self.shared.items_available.notify_one();
            }
            return Ok(outcome);
        }
    }

    /// Waits until every entry enqueued before this call was handed to the
    /// transport or dropped and counted.
    ///
    /// With a `timeout`, entries still pending at the deadline are dropped and
    /// the report is [`FlushStatus::Partial`]. Flushing a closed channel
    /// returns an empty report.
    pub async fn flush(&self, timeout: Option<Duration>) -> Result<FlushReport, ChannelError> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let up_to = {
            let queue = self.shared.queue();
            if queue.state() == ChannelState::Closed {
                return Ok(FlushReport::default());
            }
            queue.next_sequence()
        };

        let _flushing = self.flush_lock.lock().await;
        match self.request_flush(up_to, deadline).await {
            // The sender stopped because a concurrent close completed.
            Err(ChannelError::WorkerUnavailable) if self.state() != ChannelState::Running => {
                Ok(FlushReport::default())
            }
            result => result,
        }
    }

    /// Stops accepting items, flushes what is buffered and stops the sender.
    ///
    /// Only the first call does any work; later calls return its result.
    pub async fn close(&self) -> Result<FlushReport, ChannelError> {
        let mut closed = self.close_result.lock().await;
        if let Some(result) = *closed {
            return result;
        }

        let (up_to, pending) = {
            let mut queue = self.shared.queue();
            queue.advance(ChannelState::Draining);
            (queue.next_sequence(), queue.len())
        };
        self.shared.space_available.notify_waiters();
        debug!("CHANNEL | Closing, {} entries pending", pending);

        let deadline = self.close_timeout.map(|timeout| Instant::now() + timeout);
        let result = {
            let _flushing = self.flush_lock.lock().await;
            self.request_flush(up_to, deadline).await
        };

        let (ack, acked) = oneshot::channel();
        if self.tx.send(ChannelCommand::Shutdown(ack)).is_ok() && acked.await.is_err() {
            debug!("CHANNEL | Sender stopped before acknowledging shutdown");
        }
        self.shared.queue().advance(ChannelState::Closed);

        if let Err(e) = result {
            error!("CHANNEL | Final flush failed, {} entries lost: {}", pending, e);
        }
        *closed = Some(result);
        result
    }

    async fn request_flush(
        &self,
        up_to: u64,
        deadline: Option<Instant>,
    ) -> Result<FlushReport, ChannelError> {
        let (respond_to, response) = oneshot::channel();
        self.tx
            .send(ChannelCommand::Flush {
                up_to,
                deadline,
                respond_to,
            })
            .map_err(|_| ChannelError::WorkerUnavailable)?;

        let reply = match deadline {
            None => response.await,
            Some(deadline) => match time::timeout_at(deadline + FLUSH_REPLY_GRACE, response).await
            {
                Ok(reply) => reply,
                Err(_) => return Ok(self.drop_pending(up_to)),
            },
        };
        reply.map_err(|_| ChannelError::WorkerUnavailable)
    }

    /// Drops the entries below `up_to` on the caller's side when the sender
    /// is still busy with an earlier batch past the flush deadline.
    fn drop_pending(&self, up_to: u64) -> FlushReport {
        let dropped = self
            .shared
            .queue()
            .pop_batch_before(usize::MAX, up_to)
            .len() as u64;
        if dropped > 0 {
            self.shared.space_available.notify_waiters();
            self.shared.stats.record_dropped_on_timeout(dropped);
        }
        let in_flight = self.shared.in_flight.load(Ordering::Acquire);
        warn!(
            "CHANNEL | Flush deadline passed while the sender was busy, dropped {} entries, {} still in flight",
            dropped, in_flight
        );
        FlushReport {
            status: FlushStatus::Partial,
            dropped_on_timeout: dropped,
            in_flight,
            ..FlushReport::default()
        }
    }

    #[must_use]
    pub fn stats(&self) -> DeliveryStatsSnapshot {
        self.shared.stats.snapshot()
    }

    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.shared.queue().state()
    }

    /// Entries currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.queue().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Publishes the size of the batch being sent; cleared on drop, including
/// when a deadline cancels the send.
struct InFlight<'a>(&'a AtomicU64);

impl<'a> InFlight<'a> {
    fn new(counter: &'a AtomicU64, count: u64) -> Self {
        counter.store(count, Ordering::Release);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(0, Ordering::Release);
    }
}

/// Background sender of a channel.
///
/// Owns the transport; created together with its [`ChannelHandle`] and meant
/// to be spawned with `tokio::spawn(service.run())`, or use [`spawn_channel`].
pub struct ChannelService<T> {
    shared: Arc<Shared>,
    rx: mpsc::UnboundedReceiver<ChannelCommand>,
    transport: T,
    config: ChannelConfig,
}

impl<T: Transport> ChannelService<T> {
    pub fn new(config: ChannelConfig, transport: T) -> Result<(Self, ChannelHandle), ConfigError> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            queue: Mutex::new(BoundedQueue::new(config.capacity, config.overflow_policy)),
            items_available: Notify::new(),
            space_available: Notify::new(),
            stats: DeliveryStats::default(),
            in_flight: AtomicU64::new(0),
            max_batch_size: config.max_batch_size,
        });

        let handle = ChannelHandle {
            shared: Arc::clone(&shared),
            tx,
            flush_lock: Arc::new(AsyncMutex::new(())),
            close_result: Arc::new(AsyncMutex::new(None)),
            close_timeout: config.close_timeout,
        };
        let service = Self {
            shared,
            rx,
            transport,
            config,
        };

        Ok((service, handle))
    }

    pub async fn run(mut self) {
        debug!("CHANNEL | Sender started");

        let wait = self.config.max_batch_wait;
        let mut ticker = time::interval_at(Instant::now() + wait, wait);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                command = self.rx.recv() => match command {
                    Some(ChannelCommand::Flush { up_to, deadline, respond_to }) => {
                        let report = self.drain(up_to, deadline).await;
                        if respond_to.send(report).is_err() {
                            debug!("CHANNEL | Flush caller went away before the report was ready");
                        }
                    }
                    Some(ChannelCommand::Shutdown(ack)) => {
                        debug!("CHANNEL | Sender shutting down");
                        if ack.send(()).is_err() {
                            debug!("CHANNEL | Shutdown caller went away");
                        }
                        break;
                    }
                    None => {
                        let up_to = self.shared.queue().next_sequence();
                        let report = self.drain(up_to, None).await;
                        debug!(
                            "CHANNEL | All handles dropped without close, delivered {} remaining entries",
                            report.delivered
                        );
                        break;
                    }
                },
                () = self.shared.items_available.notified() => {
                    self.send_full_batches().await;
                }
                _ = ticker.tick() => {
                    let up_to = self.shared.queue().next_sequence();
                    self.drain(up_to, None).await;
                }
            }
        }
    }

    async fn send_full_batches(&self) {
        loop {
            let batch = {
                let mut queue = self.shared.queue();
                if queue.len() < self.config.max_batch_size {
                    return;
                }
                queue.pop_batch_before(self.config.max_batch_size, u64::MAX)
            };
            self.shared.space_available.notify_waiters();
            self.deliver(&batch).await;
        }
    }

    /// Sends every entry below `up_to`, dropping what the deadline does not allow.
    async fn drain(&self, up_to: u64, deadline: Option<Instant>) -> FlushReport {
        let mut report = FlushReport::default();
        loop {
            let batch = self
                .shared
                .queue()
                .pop_batch_before(self.config.max_batch_size, up_to);
            if batch.is_empty() {
                break;
            }
            self.shared.space_available.notify_waiters();
            let count = batch.len() as u64;

            let delivered = match deadline {
                None => self.deliver(&batch).await,
                Some(deadline) if Instant::now() >= deadline => {
                    self.shared.stats.record_dropped_on_timeout(count);
                    report.dropped_on_timeout += count;
                    continue;
                }
                Some(deadline) => match time::timeout_at(deadline, self.deliver(&batch)).await {
                    Ok(delivered) => delivered,
                    Err(_) => {
                        self.shared.stats.record_dropped_on_timeout(count);
                        report.dropped_on_timeout += count;
                        continue;
                    }
                },
            };
            if delivered {
                report.delivered += count;
            } else {
                report.dropped_on_failure += count;
            }
        }

        if report.dropped_on_timeout > 0 {
            report.status = FlushStatus::Partial;
            warn!(
                "CHANNEL | Flush deadline passed, dropped {} entries",
                report.dropped_on_timeout
            );
        }
        report
    }

    /// Sends one batch under the retry policy. Returns whether it was delivered.
    async fn deliver(&self, batch: &[BufferEntry]) -> bool {
        let count = batch.len() as u64;
        let _in_flight = InFlight::new(&self.shared.in_flight, count);
        let retry = &self.config.retry;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let error =
                match time::timeout(self.config.send_timeout, self.transport.send(batch)).await {
                    Ok(Ok(())) => {
                        self.shared.stats.record_delivered(count);
                        debug!("CHANNEL | Sent batch of {} entries", count);
                        return true;
                    }
                    Ok(Err(e)) => e,
                    Err(_) => TransportError::Retryable(format!(
                        "send timed out after {} ms",
                        self.config.send_timeout.as_millis()
                    )),
                };
            self.shared.stats.record_send_failure();

            if !error.is_retryable() || attempts >= retry.max_attempts {
                error!(
                    "CHANNEL | Dropping batch of {} entries after {} attempts: {}",
                    count, attempts, error
                );
                self.shared.stats.record_dropped_on_failure(count);
                return false;
            }

            let backoff = retry.backoff(attempts);
            debug!(
                "CHANNEL | Send attempt {} failed, retrying in {} ms: {}",
                attempts,
                backoff.as_millis(),
                error
            );
            time::sleep(backoff).await;
        }
    }
}

/// Validates `config` and starts the sender on the current tokio runtime.
pub fn spawn_channel<T>(config: ChannelConfig, transport: T) -> Result<ChannelHandle, ConfigError>
where
    T: Transport + 'static,
{
    let runtime =
        tokio::runtime::Handle::try_current().map_err(|_| ConfigError::RuntimeUnavailable)?;
    let (service, handle) = ChannelService::new(config, transport)?;
    runtime.spawn(service.run());
    Ok(handle)
}
