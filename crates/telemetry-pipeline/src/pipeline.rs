// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pipeline assembly.
//!
//! ```rust,ignore
//! let config = PipelineConfig::from_env()?;
//! let pipeline = TelemetryPipeline::builder(config)
//!     .with_environment_initializer()?
//!     .with_kubernetes_initializer()?
//!     .initializer(StaticPropertiesInitializer::new("team", [("team", "payments")]))?
//!     .build(TracingTransport)?;
//!
//! let logger = pipeline.logger("Checkout.Worker");
//! let mut scopes = ScopeStack::new();
//! let scope = scopes.scoped([("Method", "Main")])?;
//! logger.info(&scope, "Processed {Count} orders", &[&42]).await?;
//!
//! pipeline.close().await?;
//! ```
//!
//! Initializers are registered before the pipeline is built; the chain is
//! frozen afterwards and shared by every logger.

use std::sync::Arc;
use std::time::Duration;

use crate::channel::{spawn_channel, ChannelHandle, ChannelState, FlushReport};
use crate::config::PipelineConfig;
use crate::diagnostics::DeliveryStatsSnapshot;
use crate::error::{ChannelError, ConfigError};
use crate::filter::FilterRules;
use crate::initializer::{
    EnvironmentInitializer, InitializerChain, KubernetesInitializer, TelemetryInitializer,
};
use crate::logger::Logger;
use crate::transport::Transport;

#[derive(Debug)]
pub struct TelemetryPipelineBuilder {
    config: PipelineConfig,
    initializers: InitializerChain,
}

impl TelemetryPipelineBuilder {
    /// Appends an initializer to the chain.
    pub fn initializer<I>(mut self, initializer: I) -> Result<Self, ConfigError>
    where
        I: TelemetryInitializer + 'static,
    {
        self.initializers.register(initializer)?;
        Ok(self)
    }

    /// Appends an [`EnvironmentInitializer`] built from the configured identity.
    pub fn with_environment_initializer(self) -> Result<Self, ConfigError> {
        let initializer = EnvironmentInitializer::new(&self.config.identity);
        self.initializer(initializer)
    }

    /// Appends a [`KubernetesInitializer`] reading the pod's downward-API
    /// variables from the process environment.
    pub fn with_kubernetes_initializer(self) -> Result<Self, ConfigError> {
        self.initializer(KubernetesInitializer::from_env())
    }

    /// Validates the configuration and starts the channel sender on the
    /// current tokio runtime.
    pub fn build<T>(self, transport: T) -> Result<TelemetryPipeline, ConfigError>
    where
        T: Transport + 'static,
    {
        self.config.validate()?;
        let channel = spawn_channel(self.config.channel, transport)?;

        Ok(TelemetryPipeline {
            filters: Arc::new(self.config.filters),
            initializers: Arc::new(self.initializers),
            channel,
        })
    }
}

/// Filters, initializer chain and channel of one telemetry destination.
#[derive(Clone, Debug)]
pub struct TelemetryPipeline {
    filters: Arc<FilterRules>,
    initializers: Arc<InitializerChain>,
    channel: ChannelHandle,
}

impl TelemetryPipeline {
    #[must_use]
    pub fn builder(config: PipelineConfig) -> TelemetryPipelineBuilder {
        TelemetryPipelineBuilder {
            config,
            initializers: InitializerChain::new(),
        }
    }

    /// Builds a pipeline without initializers.
    pub fn new<T>(config: PipelineConfig, transport: T) -> Result<Self, ConfigError>
    where
        T: Transport + 'static,
    {
        Self::builder(config).build(transport)
    }

    /// Logger for `category`; its minimum severity is resolved here, once.
    #[must_use]
    pub fn logger(&self, category: &str) -> Logger {
        Logger::new(
            category,
            &self.filters,
            Arc::clone(&self.initializers),
            self.channel.clone(),
        )
    }

    pub async fn flush(&self, timeout: Option<Duration>) -> Result<FlushReport, ChannelError> {
        self.channel.flush(timeout).await
    }

    pub async fn close(&self) -> Result<FlushReport, ChannelError> {
        self.channel.close().await
    }

    #[must_use]
    pub fn stats(&self) -> DeliveryStatsSnapshot {
        let mut stats = self.channel.stats();
        stats.initializer_failures = self.initializers.failures();
        stats
    }

    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    #[must_use]
    pub fn channel(&self) -> &ChannelHandle {
        &self.channel
    }
}
