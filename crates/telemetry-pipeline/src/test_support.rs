// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transports for unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::item::BufferEntry;
use crate::transport::Transport;

/// Keeps a copy of every batch it receives.
#[derive(Debug, Default)]
pub(crate) struct RecordingTransport {
    batches: Mutex<Vec<Vec<BufferEntry>>>,
}

impl RecordingTransport {
    pub(crate) fn batches(&self) -> Vec<Vec<BufferEntry>> {
        self.batches.lock().unwrap().clone()
    }

    pub(crate) fn entries(&self) -> Vec<BufferEntry> {
        self.batches().into_iter().flatten().collect()
    }

    pub(crate) fn sequences(&self) -> Vec<u64> {
        self.entries().iter().map(BufferEntry::sequence).collect()
    }

    pub(crate) fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub(crate) fn batch_sizes(&self) -> Vec<usize> {
        self.batches().iter().map(Vec::len).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, batch: &[BufferEntry]) -> Result<(), TransportError> {
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}

/// Fails a fixed number of times, then succeeds.
#[derive(Debug)]
pub(crate) struct ScriptedTransport {
    failures_left: AtomicU32,
    error: TransportError,
    attempts: AtomicU32,
}

impl ScriptedTransport {
    pub(crate) fn failing_times(failures: u32, error: TransportError) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            error,
            attempts: AtomicU32::new(0),
        }
    }

    pub(crate) fn failing_forever(error: TransportError) -> Self {
        Self::failing_times(u32::MAX, error)
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, _batch: &[BufferEntry]) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            Err(self.error.clone())
        } else {
            Ok(())
        }
    }
}
