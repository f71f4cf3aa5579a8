// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;

use tracing::warn;

use crate::channel::ChannelState;
use crate::config::OverflowPolicy;
use crate::item::{BufferEntry, TelemetryItem};

/// Result of offering an item to the queue.
#[derive(Debug)]
pub(crate) enum Admission {
    Accepted { sequence: u64 },
    Evicted { sequence: u64, evicted: u64 },
    /// Full under `DropNewest`; the item is gone.
    Dropped,
    /// Full under `Block`; the item is handed back so the producer can wait.
    Full(TelemetryItem),
    Closed(TelemetryItem),
}

/// FIFO of buffer entries with a hard capacity.
///
/// Sequence numbers are assigned on acceptance, so entries are always ordered
/// by sequence from front to back.
#[derive(Debug)]
pub(crate) struct BoundedQueue {
    entries: VecDeque<BufferEntry>,
    capacity: usize,
    policy: OverflowPolicy,
    next_sequence: u64,
    state: ChannelState,
    overflowing: bool,
}

impl BoundedQueue {
    pub(crate) fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            policy,
            next_sequence: 0,
            state: ChannelState::Running,
            overflowing: false,
        }
    }

    pub(crate) fn push(&mut self, item: TelemetryItem) -> Admission {
        if self.state != ChannelState::Running {
            return Admission::Closed(item);
        }
        if self.entries.len() < self.capacity {
            let sequence = self.append(item);
            return Admission::Accepted { sequence };
        }

        match self.policy {
            OverflowPolicy::Block => Admission::Full(item),
            OverflowPolicy::DropOldest => {
                self.report_overflow("dropping oldest entries");
                let Some(evicted) = self.entries.pop_front() else {
                    // Unreachable with a non-zero capacity.
                    return Admission::Dropped;
                };
                let sequence = self.append(item);
                Admission::Evicted {
                    sequence,
                    evicted: evicted.sequence(),
                }
            }
            OverflowPolicy::DropNewest => {
                self.report_overflow("dropping new entries");
                Admission::Dropped
            }
        }
    }

    fn append(&mut self, item: TelemetryItem) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.push_back(BufferEntry::new(sequence, item));
        sequence
    }

    // Warns once per overflow episode; the episode ends when the sender frees space.
    fn report_overflow(&mut self, action: &str) {
        if !self.overflowing {
            self.overflowing = true;
            warn!(
                "CHANNEL | Telemetry buffer full ({} entries), {}",
                self.capacity, action
            );
        }
    }

    /// Removes up to `max` entries whose sequence is below `up_to`.
    pub(crate) fn pop_batch_before(&mut self, max: usize, up_to: u64) -> Vec<BufferEntry> {
        let count = self
            .entries
            .iter()
            .take(max)
            .take_while(|entry| entry.sequence() < up_to)
            .count();
        if count > 0 {
            self.overflowing = false;
        }
        self.entries.drain(..count).collect()
    }

    /// Sequence the next accepted item will get.
    pub(crate) fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn state(&self) -> ChannelState {
        self.state
    }

    /// Moves the lifecycle forward; going back is ignored.
    pub(crate) fn advance(&mut self, state: ChannelState) {
        if state > self.state {
            self.state = state;
        }
    }
}
