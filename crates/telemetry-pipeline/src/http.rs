// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP transport.
//!
//! Each batch is POSTed to a single endpoint as a JSON array of buffer
//! entries, zstd-compressed when a compression level is configured.
//!
//! Response handling:
//!
//! | Response | Outcome |
//! |----------|---------|
//! | 2xx | delivered |
//! | 403 | permanent, the API key is rejected |
//! | 408, 429 | retryable |
//! | other 4xx | permanent, the payload will never be accepted |
//! | 5xx, network error | retryable |

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderName, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::{debug, error};

use crate::error::{ConfigError, TransportError};
use crate::item::BufferEntry;
use crate::transport::Transport;

pub const DEFAULT_API_KEY_HEADER: &str = "X-Api-Key";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpTransportConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub api_key_header: String,
    pub timeout: Duration,
    /// zstd level; `None` sends the body uncompressed.
    pub compression_level: Option<i32>,
    pub https_proxy: Option<String>,
}

impl HttpTransportConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            timeout: DEFAULT_HTTP_TIMEOUT,
            compression_level: None,
            https_proxy: None,
        }
    }

    /// Reads `TELEMETRY_ENDPOINT`, `TELEMETRY_API_KEY`,
    /// `TELEMETRY_API_KEY_HEADER`, `TELEMETRY_COMPRESSION_LEVEL` and
    /// `TELEMETRY_PROXY_HTTPS` (falling back to `HTTPS_PROXY`). Returns `None`
    /// when no endpoint is set.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(endpoint) = env::var("TELEMETRY_ENDPOINT").ok() else {
            return Ok(None);
        };

        let mut config = Self::new(endpoint);
        config.api_key = env::var("TELEMETRY_API_KEY").ok();
        if let Ok(header) = env::var("TELEMETRY_API_KEY_HEADER") {
            config.api_key_header = header.trim().to_string();
        }
        config.compression_level = match env::var("TELEMETRY_COMPRESSION_LEVEL") {
            Ok(level) => Some(level.trim().parse::<i32>().map_err(|_| {
                ConfigError::InvalidEnvValue {
                    key: "TELEMETRY_COMPRESSION_LEVEL".to_string(),
                    value: level.clone(),
                }
            })?),
            Err(_) => None,
        };
        config.https_proxy = env::var("TELEMETRY_PROXY_HTTPS")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();

        config.validate()?;
        Ok(Some(config))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        reqwest::Url::parse(&self.endpoint).map_err(|e| {
            ConfigError::InvalidConfig(format!("invalid endpoint '{}': {}", self.endpoint, e))
        })?;
        HeaderName::from_bytes(self.api_key_header.as_bytes()).map_err(|_| {
            ConfigError::InvalidConfig(format!(
                "invalid API key header name '{}'",
                self.api_key_header
            ))
        })?;
        if let Some(level) = self.compression_level {
            if !zstd::compression_level_range().contains(&level) {
                return Err(ConfigError::InvalidConfig(format!(
                    "zstd compression level {level} is out of range"
                )));
            }
        }
        Ok(())
    }
}

/// [`Transport`] posting batches to an HTTP collector.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Some(Duration::from_secs(270)))
            .tcp_keepalive(Some(Duration::from_secs(120)));
        if let Some(proxy) = &config.https_proxy {
            let proxy = reqwest::Proxy::https(proxy.as_str()).map_err(|e| {
                ConfigError::InvalidConfig(format!("invalid HTTPS proxy '{proxy}': {e}"))
            })?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| ConfigError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    fn encode(&self, batch: &[BufferEntry]) -> Result<(Vec<u8>, bool), TransportError> {
        let body = serde_json::to_vec(batch)
            .map_err(|e| TransportError::Permanent(format!("failed to serialize batch: {e}")))?;

        let Some(level) = self.config.compression_level else {
            return Ok((body, false));
        };
        match zstd::encode_all(body.as_slice(), level) {
            Ok(compressed) => Ok((compressed, true)),
            Err(e) => {
                debug!("HTTP | Failed to compress batch, sending it uncompressed: {}", e);
                Ok((body, false))
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &[BufferEntry]) -> Result<(), TransportError> {
        let (body, compressed) = self.encode(batch)?;

        let mut request = self
            .client
            .post(self.config.endpoint.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if compressed {
            request = request.header(CONTENT_ENCODING, "zstd");
        }
        if let Some(api_key) = &self.config.api_key {
            request = request.header(self.config.api_key_header.as_str(), api_key.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Retryable(format!("request failed: {e}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify(status, &body))
    }
}

fn classify(status: StatusCode, body: &str) -> TransportError {
    let message = format!("{status}: {body}");
    match status {
        StatusCode::FORBIDDEN => {
            error!(
                "HTTP | Request was denied by the collector: Access denied. Please verify that your API key is valid."
            );
            TransportError::Permanent(message)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            TransportError::Retryable(message)
        }
        status if status.is_client_error() => TransportError::Permanent(message),
        _ => TransportError::Retryable(message),
    }
}
