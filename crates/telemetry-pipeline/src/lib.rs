// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Telemetry Pipeline
//!
//! Structured telemetry emission: application code emits log records tagged
//! with contextual metadata; the pipeline filters, enriches, buffers and
//! delivers them to a collector, with an explicit flush for process exit.
//!
//! ## Architecture
//!
//! ```text
//! Logger ──filter──> template ──> initializers ──> scopes ──> TelemetryItem
//!                                                                  │ enqueue
//!                                                                  ▼
//!                           Transport <──batches── channel sender ◀── buffer
//! ```
//!
//! - [`scope`]: per-flow stacks of nested key/value scopes
//! - [`initializer`]: ordered enrichment chain with failure isolation
//! - [`logger`], [`filter`], [`template`]: the logging front-end
//! - [`channel`]: bounded buffer, background sender, flush and close
//! - [`transport`], [`http`]: delivery boundary and an HTTP implementation
//! - [`pipeline`]: assembly of all of the above from a [`config::PipelineConfig`]

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod channel;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod http;
pub mod initializer;
pub mod item;
pub mod logger;
pub mod pipeline;
pub mod scope;
pub mod severity;
pub mod template;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use channel::{ChannelHandle, ChannelState, EnqueueOutcome, FlushReport, FlushStatus};
pub use config::{ChannelConfig, OverflowPolicy, PipelineConfig, RetryPolicy, ServiceIdentity};
pub use diagnostics::{init_diagnostics, DeliveryStatsSnapshot};
pub use error::{ChannelError, ConfigError, InitializerError, ScopeError, TransportError};
pub use filter::{FilterRule, FilterRules};
pub use http::{HttpTransport, HttpTransportConfig};
pub use initializer::{
    from_fn, EnvironmentInitializer, InitContext, InitializerChain, KubernetesInitializer,
    StaticPropertiesInitializer, TelemetryInitializer,
};
pub use item::{BufferEntry, ExceptionInfo, Properties, TelemetryItem};
pub use logger::{LogOutcome, Logger};
pub use pipeline::{TelemetryPipeline, TelemetryPipelineBuilder};
pub use scope::{ScopeGuard, ScopeHandle, ScopeStack};
pub use severity::Severity;
pub use transport::{TracingTransport, Transport};
