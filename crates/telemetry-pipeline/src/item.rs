// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The telemetry item model.
//!
//! A [`TelemetryItem`] is built once, by the logging front-end or by
//! [`TelemetryItemBuilder`], and never mutated afterwards: its fields are
//! private and only exposed through accessors. Once the channel accepts an
//! item it pairs it with a sequence number in a [`BufferEntry`], which is what
//! the transport receives.

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::OnceLock;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::severity::Severity;

/// Ordered string-to-string property map.
pub type Properties = BTreeMap<String, String>;

static CLOCK_ANCHOR: OnceLock<(Instant, DateTime<Utc>)> = OnceLock::new();

/// Returns the current capture time.
///
/// The wall clock is read once and later timestamps are derived from the
/// monotonic clock, so timestamps taken in this process never go backwards.
#[must_use]
pub fn capture_timestamp() -> DateTime<Utc> {
    let (anchor, wall) = CLOCK_ANCHOR.get_or_init(|| (Instant::now(), Utc::now()));
    let elapsed =
        chrono::Duration::from_std(anchor.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
    *wall + elapsed
}

/// Structured error attached to an item on error paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    #[serde(rename = "type")]
    pub type_name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<String>,
}

impl ExceptionInfo {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            stack: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_stack(mut self, stack: Vec<String>) -> Self {
        self.stack = stack;
        self
    }

    /// Captures an error, using its `source()` chain as the stack.
    pub fn from_error<E: Error>(error: &E) -> Self {
        let mut stack = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            stack.push(cause.to_string());
            source = cause.source();
        }
        Self {
            type_name: std::any::type_name::<E>().to_string(),
            message: error.to_string(),
            stack,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryItem {
    timestamp: DateTime<Utc>,
    severity: Severity,
    category: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    exception: Option<ExceptionInfo>,
    properties: Properties,
}

impl TelemetryItem {
    pub(crate) fn new(
        timestamp: DateTime<Utc>,
        severity: Severity,
        category: String,
        message: String,
        exception: Option<ExceptionInfo>,
        properties: Properties,
    ) -> Self {
        Self {
            timestamp,
            severity,
            category,
            message,
            exception,
            properties,
        }
    }

    pub fn builder(
        category: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> TelemetryItemBuilder {
        TelemetryItemBuilder {
            timestamp: None,
            severity,
            category: category.into(),
            message: message.into(),
            exception: None,
            properties: Properties::new(),
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn exception(&self) -> Option<&ExceptionInfo> {
        self.exception.as_ref()
    }

    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Builds items outside the logging front-end, e.g. for direct enqueueing.
#[derive(Debug, Clone)]
pub struct TelemetryItemBuilder {
    timestamp: Option<DateTime<Utc>>,
    severity: Severity,
    category: String,
    message: String,
    exception: Option<ExceptionInfo>,
    properties: Properties,
}

impl TelemetryItemBuilder {
    #[must_use]
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    #[must_use]
    pub fn exception(mut self, exception: ExceptionInfo) -> Self {
        self.exception = Some(exception);
        self
    }

    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn build(self) -> TelemetryItem {
        TelemetryItem {
            timestamp: self.timestamp.unwrap_or_else(capture_timestamp),
            severity: self.severity,
            category: self.category,
            message: self.message,
            exception: self.exception,
            properties: self.properties,
        }
    }
}

/// An accepted item and its position in the channel.
///
/// Sequence numbers increase strictly in acceptance order. They order entries;
/// they say nothing about delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferEntry {
    sequence: u64,
    #[serde(flatten)]
    item: TelemetryItem,
}

impl BufferEntry {
    pub(crate) fn new(sequence: u64, item: TelemetryItem) -> Self {
        Self { sequence, item }
    }

    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub fn item(&self) -> &TelemetryItem {
        &self.item
    }

    #[must_use]
    pub fn into_item(self) -> TelemetryItem {
        self.item
    }
}
