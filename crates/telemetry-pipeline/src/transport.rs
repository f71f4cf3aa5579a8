// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery boundary of the channel.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, trace, warn};

use crate::error::TransportError;
use crate::item::BufferEntry;
use crate::severity::Severity;

/// Ships batches to a collector.
///
/// The channel calls `send` from its background task only, one batch at a
/// time. The batch is lent for the duration of the call. Return
/// [`TransportError::Retryable`] for failures worth another attempt and
/// [`TransportError::Permanent`] for batches that will never be accepted.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, batch: &[BufferEntry]) -> Result<(), TransportError>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn send(&self, batch: &[BufferEntry]) -> Result<(), TransportError> {
        (**self).send(batch).await
    }
}

/// Re-emits delivered items as `tracing` events at their own severity.
///
/// Useful for local runs, where it plays the role of a console sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTransport;

#[async_trait]
impl Transport for TracingTransport {
    async fn send(&self, batch: &[BufferEntry]) -> Result<(), TransportError> {
        for entry in batch {
            let item = entry.item();
            let properties = serde_json::to_string(item.properties()).unwrap_or_default();
            let sequence = entry.sequence();
            let category = item.category();
            let message = item.message();
            match item.severity() {
                Severity::Trace => {
                    trace!(sequence, category, %properties, "{message}");
                }
                Severity::Debug => {
                    debug!(sequence, category, %properties, "{message}");
                }
                Severity::Information => {
                    info!(sequence, category, %properties, "{message}");
                }
                Severity::Warning => {
                    warn!(sequence, category, %properties, "{message}");
                }
                Severity::Error | Severity::Critical => {
                    error!(sequence, category, %properties, "{message}");
                }
            }
        }
        Ok(())
    }
}
