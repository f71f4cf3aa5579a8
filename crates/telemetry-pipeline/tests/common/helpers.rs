// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use telemetry_pipeline::{ChannelConfig, RetryPolicy, Severity, TelemetryItem};

pub fn item(message: &str) -> TelemetryItem {
    TelemetryItem::builder("Tests", Severity::Information, message).build()
}

/// Channel config with a long batch wait, so only full batches and flushes
/// trigger sends, and fast retries.
pub fn channel_config(capacity: usize, max_batch_size: usize) -> ChannelConfig {
    ChannelConfig {
        capacity,
        max_batch_size,
        max_batch_wait: Duration::from_secs(3600),
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        },
        ..ChannelConfig::default()
    }
}

/// Polls `condition` until it holds; panics after five seconds.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..5_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not met within five seconds");
}
