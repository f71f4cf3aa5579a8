// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded buffering channel between producers and the transport.
//!
//! # Architecture
//!
//! ```text
//!  producers ──enqueue──> [ BoundedQueue ] <──pop batches── ChannelService ──send──> Transport
//!      │                     (std Mutex)                         ▲
//!      └──── ChannelHandle ── flush / close commands (mpsc) ─────┘
//!                               replies (oneshot)
//! ```
//!
//! Producers append to a shared queue; a single background task, the
//! [`ChannelService`], owns the transport and ships batches. The queue lock is
//! never held across an `.await`.
//!
//! # Batching
//!
//! The sender ships a batch of up to `max_batch_size` entries as soon as that
//! many are queued, and ships whatever is pending every `max_batch_wait`.
//! Failed sends are retried with exponential backoff; once the retry policy
//! gives up, or the transport reports a permanent failure, the batch is
//! dropped and counted.
//!
//! # Lifecycle
//!
//! ```text
//! Running ──close()──> Draining ──final flush, worker stopped──> Closed
//! ```
//!
//! - [`ChannelHandle::flush`] returns once every entry enqueued before the call
//!   was handed to the transport or dropped and counted. With a timeout, the
//!   entries still pending at the deadline are dropped and the report is
//!   [`FlushStatus::Partial`]. If the sender is still busy with an earlier
//!   batch past the deadline, the caller drops the covered entries itself and
//!   reports the busy batch as `in_flight`. Concurrent flushes run one after
//!   the other.
//! - [`ChannelHandle::close`] rejects new items, wakes blocked producers with
//!   [`ChannelError::Closed`](crate::error::ChannelError::Closed), runs a final
//!   flush and stops the worker. Later calls return the first call's result.
//! - When every handle is dropped without `close`, the worker delivers what is
//!   left on a best-effort basis and exits.

mod queue;
mod service;

pub use service::{spawn_channel, ChannelHandle, ChannelService};

use serde::Serialize;

/// Result of a successful [`ChannelHandle::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted { sequence: u64 },
    /// The buffer was full and the oldest entry was evicted to make room.
    AcceptedWithEviction { sequence: u64, evicted_sequence: u64 },
    /// The buffer was full and the item was discarded.
    Dropped,
}

impl EnqueueOutcome {
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        match self {
            EnqueueOutcome::Accepted { sequence }
            | EnqueueOutcome::AcceptedWithEviction { sequence, .. } => Some(*sequence),
            EnqueueOutcome::Dropped => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum FlushStatus {
    #[default]
    Complete,
    /// The deadline passed before every entry could be sent.
    Partial,
}

/// What a flush did with the entries it covered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub status: FlushStatus,
    pub delivered: u64,
    pub dropped_on_failure: u64,
    pub dropped_on_timeout: u64,
    /// Entries the sender was still transmitting when the flush gave up
    /// waiting. They are delivered or dropped later and show up in the stats.
    pub in_flight: u64,
}

impl FlushReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == FlushStatus::Complete
    }
}

/// Lifecycle of a channel. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ChannelState {
    Running,
    Draining,
    Closed,
}
