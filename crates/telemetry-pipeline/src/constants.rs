// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Defaults for the buffering channel and the logging front-end.

use std::time::Duration;

/// Maximum number of entries buffered before the overflow policy applies.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Maximum number of entries handed to the transport in one call.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

/// Longest time a queued entry waits before the sender ships a partial batch.
pub const DEFAULT_MAX_BATCH_WAIT: Duration = Duration::from_secs(5);

/// Attempts per batch, the first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Upper bound for a single transport call.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Property holding the unrendered message template.
pub const ORIGINAL_FORMAT_PROPERTY: &str = "{OriginalFormat}";

/// Prefix the diagnostics formatter puts on every line.
pub const DIAGNOSTICS_PREFIX: &str = "TELEMETRY";

/// Extra time a flush caller waits past its deadline for the sender's report.
pub const FLUSH_REPLY_GRACE: Duration = Duration::from_millis(100);
