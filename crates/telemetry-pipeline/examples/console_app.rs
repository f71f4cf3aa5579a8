// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Console host: logs one scoped line per cycle and flushes after each.
//!
//! Items go to `TELEMETRY_ENDPOINT` when it is set and are re-emitted as
//! diagnostics otherwise. `CONSOLE_APP_ITERATIONS` bounds the number of
//! cycles (default 3).

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;

use tokio::time::{sleep, Duration};
use tracing::{error, info};

use telemetry_pipeline::{
    init_diagnostics, HttpTransport, HttpTransportConfig, PipelineConfig, ScopeStack,
    TelemetryPipeline, TracingTransport,
};

const CYCLE_INTERVAL: Duration = Duration::from_secs(10);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_ITERATIONS: u32 = 3;

#[tokio::main]
pub async fn main() {
    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid telemetry configuration: {e}");
            return;
        }
    };
    if let Err(e) = init_diagnostics(&config.log_level) {
        eprintln!("Failed to initialize diagnostics: {e}");
        return;
    }

    let iterations = env::var("CONSOLE_APP_ITERATIONS")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(DEFAULT_ITERATIONS);

    let pipeline = match build_pipeline(config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Failed to start telemetry pipeline: {e}");
            return;
        }
    };
    let logger = pipeline.logger("ConsoleApp.Program");
    let mut scopes = ScopeStack::new();

    for cycle in 1..=iterations {
        match scopes.scoped([("Method", "Main")]) {
            Ok(scope) => {
                if let Err(e) = logger.info(&scope, "Logger is working", &[]).await {
                    error!("Failed to log: {e}");
                }
            }
            Err(e) => error!("Failed to open scope: {e}"),
        }

        match pipeline.flush(Some(FLUSH_TIMEOUT)).await {
            Ok(report) => info!(
                "Cycle {cycle}: delivered {}, complete: {}",
                report.delivered,
                report.is_complete()
            ),
            Err(e) => error!("Flush failed: {e}"),
        }

        if cycle < iterations {
            sleep(CYCLE_INTERVAL).await;
        }
    }

    match pipeline.close().await {
        Ok(_) => info!("Telemetry stats: {:?}", pipeline.stats()),
        Err(e) => error!("Close failed: {e}"),
    }
}

fn build_pipeline(config: PipelineConfig) -> Result<TelemetryPipeline, Box<dyn std::error::Error>> {
    let builder = TelemetryPipeline::builder(config)
        .with_environment_initializer()?
        .with_kubernetes_initializer()?;

    match HttpTransportConfig::from_env()? {
        Some(http) => {
            info!("Sending telemetry to {}", http.endpoint);
            Ok(builder.build(HttpTransport::new(http)?)?)
        }
        None => {
            info!("TELEMETRY_ENDPOINT not set, re-emitting telemetry as diagnostics");
            Ok(builder.build(TracingTransport)?)
        }
    }
}
