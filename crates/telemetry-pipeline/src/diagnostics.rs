// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Self-diagnostics of the pipeline.
//!
//! The pipeline reports on itself through `tracing`, never through its own
//! channel. Messages start with the component that emits them (`CHANNEL |`,
//! `INITIALIZER |`, `SCOPE |`, `HTTP |`); the [`Formatter`] adds the pipeline
//! prefix and the level:
//!
//! ```text
//! TELEMETRY | WARN | INITIALIZER | Initializer 'k8s' failed, its properties are skipped: timeout
//! TELEMETRY | ERROR | CHANNEL | Dropping batch of 12 entries after 3 attempts: 503
//! ```
//!
//! Delivery counters live in [`DeliveryStats`] and are read through
//! [`DeliveryStatsSnapshot`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::constants::DIAGNOSTICS_PREFIX;
use crate::error::ConfigError;

/// Log formatter that prefixes every line with `TELEMETRY | LEVEL |`.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "{DIAGNOSTICS_PREFIX} | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Installs a global subscriber for the pipeline's diagnostics.
///
/// `level` is an `EnvFilter` directive such as `info` or
/// `telemetry_pipeline=debug`. Returns `false` when a global subscriber was
/// already installed, in which case that one keeps receiving the diagnostics.
pub fn init_diagnostics(level: &str) -> Result<bool, ConfigError> {
    let env_filter = format!("h2=off,hyper=off,rustls=off,{level}");
    let filter = EnvFilter::try_new(&env_filter)
        .map_err(|e| ConfigError::InvalidConfig(format!("invalid log level '{level}': {e}")))?;

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(Formatter)
        .try_init()
        .is_ok();
    Ok(installed)
}

/// Delivery counters shared by the channel handles and the sender.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    dropped_on_overflow: AtomicU64,
    dropped_on_failure: AtomicU64,
    dropped_on_timeout: AtomicU64,
    batches_sent: AtomicU64,
    send_failures: AtomicU64,
}

/// Point-in-time copy of [`DeliveryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStatsSnapshot {
    /// Items accepted into the buffer.
    pub enqueued: u64,
    /// Items handed to the transport in a successful send.
    pub delivered: u64,
    /// Items evicted or rejected because the buffer was full.
    pub dropped_on_overflow: u64,
    /// Items dropped after the retry policy gave up on their batch.
    pub dropped_on_failure: u64,
    /// Items dropped because a flush deadline passed.
    pub dropped_on_timeout: u64,
    pub batches_sent: u64,
    /// Failed transport attempts, retried ones included.
    pub send_failures: u64,
    /// Failed initializer runs; filled in by the pipeline.
    pub initializer_failures: u64,
}

impl DeliveryStatsSnapshot {
    /// Items that left the buffer without being delivered.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped_on_overflow + self.dropped_on_failure + self.dropped_on_timeout
    }
}

impl DeliveryStats {
    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_overflow(&self, count: u64) {
        self.dropped_on_overflow.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, count: u64) {
        self.delivered.fetch_add(count, Ordering::Relaxed);
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_on_failure(&self, count: u64) {
        self.dropped_on_failure.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_on_timeout(&self, count: u64) {
        self.dropped_on_timeout.fetch_add(count, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped_on_overflow: self.dropped_on_overflow.load(Ordering::Relaxed),
            dropped_on_failure: self.dropped_on_failure.load(Ordering::Relaxed),
            dropped_on_timeout: self.dropped_on_timeout.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            initializer_failures: 0,
        }
    }
}
