// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock transports for testing

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use telemetry_pipeline::{BufferEntry, TelemetryItem, Transport, TransportError};
use tokio::sync::Semaphore;

/// Mock transport that records every batch it accepts
#[derive(Debug, Default)]
pub struct RecordingTransport {
    batches: Mutex<Vec<Vec<BufferEntry>>>,
}

impl RecordingTransport {
    pub fn record(&self, batch: &[BufferEntry]) {
        self.batches.lock().unwrap().push(batch.to_vec());
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn entries(&self) -> Vec<BufferEntry> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }

    pub fn items(&self) -> Vec<TelemetryItem> {
        self.entries()
            .into_iter()
            .map(BufferEntry::into_item)
            .collect()
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.entries().iter().map(BufferEntry::sequence).collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.items()
            .iter()
            .map(|item| item.message().to_string())
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, batch: &[BufferEntry]) -> Result<(), TransportError> {
        self.record(batch);
        Ok(())
    }
}

/// Mock transport that fails its first `failures` calls with `error`
#[derive(Debug)]
pub struct FailingTransport {
    failures: usize,
    error: TransportError,
    attempts: AtomicUsize,
    pub recorder: RecordingTransport,
}

impl FailingTransport {
    pub fn new(failures: usize, error: TransportError) -> Self {
        Self {
            failures,
            error,
            attempts: AtomicUsize::new(0),
            recorder: RecordingTransport::default(),
        }
    }

    pub fn always(error: TransportError) -> Self {
        Self::new(usize::MAX, error)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn send(&self, batch: &[BufferEntry]) -> Result<(), TransportError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(self.error.clone());
        }
        self.recorder.record(batch);
        Ok(())
    }
}

/// Mock transport that takes `delay` to accept each batch
#[derive(Debug)]
pub struct SlowTransport {
    delay: Duration,
    pub recorder: RecordingTransport,
}

impl SlowTransport {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            recorder: RecordingTransport::default(),
        }
    }
}

#[async_trait]
impl Transport for SlowTransport {
    async fn send(&self, batch: &[BufferEntry]) -> Result<(), TransportError> {
        tokio::time::sleep(self.delay).await;
        self.recorder.record(batch);
        Ok(())
    }
}

/// Mock transport that holds each batch until the test opens the gate
#[derive(Debug)]
pub struct GatedTransport {
    gate: Semaphore,
    waiting: AtomicUsize,
    pub recorder: RecordingTransport,
}

impl Default for GatedTransport {
    fn default() -> Self {
        Self {
            gate: Semaphore::new(0),
            waiting: AtomicUsize::new(0),
            recorder: RecordingTransport::default(),
        }
    }
}

impl GatedTransport {
    /// Lets `batches` more batches through.
    pub fn open(&self, batches: usize) {
        self.gate.add_permits(batches);
    }

    /// Number of sends currently held at the gate.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn send(&self, batch: &[BufferEntry]) -> Result<(), TransportError> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let permit = self.gate.acquire().await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        match permit {
            Ok(permit) => {
                permit.forget();
                self.recorder.record(batch);
                Ok(())
            }
            Err(_) => Err(TransportError::Permanent("gate closed".to_string())),
        }
    }
}
