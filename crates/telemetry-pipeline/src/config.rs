// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pipeline configuration.
//!
//! Everything has a default; [`PipelineConfig::from_env`] overrides the
//! defaults from `TELEMETRY_*` environment variables and validates the result.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `TELEMETRY_CHANNEL_CAPACITY` | buffered entries before overflow | 10000 |
//! | `TELEMETRY_MAX_BATCH_SIZE` | entries per transport call | 500 |
//! | `TELEMETRY_MAX_BATCH_WAIT_MS` | max wait before a partial batch ships | 5000 |
//! | `TELEMETRY_OVERFLOW_POLICY` | `block`, `drop_oldest`, `drop_newest` | `drop_oldest` |
//! | `TELEMETRY_MAX_ATTEMPTS` | attempts per batch | 3 |
//! | `TELEMETRY_SEND_TIMEOUT_MS` | timeout of one transport call | 10000 |
//! | `TELEMETRY_CLOSE_TIMEOUT_MS` | timeout of the final flush on close | none |
//! | `TELEMETRY_LOG_FILTERS` | `prefix=level` rules | none |
//! | `TELEMETRY_DEFAULT_LEVEL` | minimum severity without a matching rule | `information` |
//! | `TELEMETRY_SERVICE`, `TELEMETRY_ENV`, `TELEMETRY_VERSION` | service identity | none |
//! | `HOSTNAME` | host identity | none |
//! | `TELEMETRY_LOG_LEVEL` | level of the pipeline's own diagnostics | `info` |

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::constants;
use crate::error::ConfigError;
use crate::filter::FilterRules;
use crate::severity::Severity;

/// What `enqueue` does when the buffer is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// The producer waits until the sender frees space.
    Block,
    /// The oldest buffered entry is evicted to make room.
    #[default]
    DropOldest,
    /// The incoming item is discarded.
    DropNewest,
}

impl FromStr for OverflowPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "block" => Ok(OverflowPolicy::Block),
            "drop_oldest" => Ok(OverflowPolicy::DropOldest),
            "drop_newest" => Ok(OverflowPolicy::DropNewest),
            _ => Err(ConfigError::InvalidEnvValue {
                key: "TELEMETRY_OVERFLOW_POLICY".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Bounded exponential backoff for failed transport calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per batch, the first one included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
            initial_backoff: constants::DEFAULT_INITIAL_BACKOFF,
            max_backoff: constants::DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    pub capacity: usize,
    pub max_batch_size: usize,
    pub max_batch_wait: Duration,
    pub overflow_policy: OverflowPolicy,
    pub retry: RetryPolicy,
    pub send_timeout: Duration,
    /// Deadline of the final flush run by `close`; `None` waits for every
    /// entry to be delivered or dropped by the retry policy.
    pub close_timeout: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: constants::DEFAULT_CHANNEL_CAPACITY,
            max_batch_size: constants::DEFAULT_MAX_BATCH_SIZE,
            max_batch_wait: constants::DEFAULT_MAX_BATCH_WAIT,
            overflow_policy: OverflowPolicy::default(),
            retry: RetryPolicy::default(),
            send_timeout: constants::DEFAULT_SEND_TIMEOUT,
            close_timeout: None,
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::InvalidChannel(
                "capacity must be greater than 0".to_string(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::InvalidChannel(
                "max batch size must be greater than 0".to_string(),
            ));
        }
        // A full queue must always be able to trigger a batch.
        if self.max_batch_size > self.capacity {
            return Err(ConfigError::InvalidChannel(format!(
                "max batch size ({}) must not exceed capacity ({})",
                self.max_batch_size, self.capacity
            )));
        }
        if self.max_batch_wait.is_zero() {
            return Err(ConfigError::InvalidChannel(
                "max batch wait must be greater than 0".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidChannel(
                "max attempts must be at least 1".to_string(),
            ));
        }
        if self.send_timeout.is_zero() {
            return Err(ConfigError::InvalidChannel(
                "send timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Static identity stamped by the environment initializer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub service: Option<String>,
    pub env: Option<String>,
    pub version: Option<String>,
    pub host: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub channel: ChannelConfig,
    pub filters: FilterRules,
    pub identity: ServiceIdentity,
    /// Level of the pipeline's own diagnostics (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            filters: FilterRules::default(),
            identity: ServiceIdentity::default(),
            log_level: "info".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ChannelConfig::default();
        let channel = ChannelConfig {
            capacity: parse_var(&lookup, "TELEMETRY_CHANNEL_CAPACITY")?
                .unwrap_or(defaults.capacity),
            max_batch_size: parse_var(&lookup, "TELEMETRY_MAX_BATCH_SIZE")?
                .unwrap_or(defaults.max_batch_size),
            max_batch_wait: parse_var(&lookup, "TELEMETRY_MAX_BATCH_WAIT_MS")?
                .map_or(defaults.max_batch_wait, Duration::from_millis),
            overflow_policy: parse_var(&lookup, "TELEMETRY_OVERFLOW_POLICY")?
                .unwrap_or(defaults.overflow_policy),
            retry: RetryPolicy {
                max_attempts: parse_var(&lookup, "TELEMETRY_MAX_ATTEMPTS")?
                    .unwrap_or(defaults.retry.max_attempts),
                ..defaults.retry
            },
            send_timeout: parse_var(&lookup, "TELEMETRY_SEND_TIMEOUT_MS")?
                .map_or(defaults.send_timeout, Duration::from_millis),
            close_timeout: parse_var(&lookup, "TELEMETRY_CLOSE_TIMEOUT_MS")?
                .map(Duration::from_millis),
        };

        let default_minimum = match lookup("TELEMETRY_DEFAULT_LEVEL") {
            Some(level) => level.parse::<Severity>()?,
            None => Severity::Information,
        };
        let filters = match lookup("TELEMETRY_LOG_FILTERS") {
            Some(rules) => FilterRules::parse(&rules, default_minimum)?,
            None => FilterRules::new(default_minimum),
        };

        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let identity = ServiceIdentity {
            service: non_empty("TELEMETRY_SERVICE"),
            env: non_empty("TELEMETRY_ENV"),
            version: non_empty("TELEMETRY_VERSION"),
            host: non_empty("HOSTNAME"),
        };

        let log_level = lookup("TELEMETRY_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|| "info".to_string());

        let config = Self {
            channel,
            filters,
            identity,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.channel.validate()?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvValue {
                key: key.to_string(),
                value,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.channel.overflow_policy, OverflowPolicy::DropOldest);
    }

    #[test]
    fn test_from_lookup_without_variables_uses_defaults() {
        let config = PipelineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_from_lookup_reads_every_variable() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("TELEMETRY_CHANNEL_CAPACITY", "64"),
            ("TELEMETRY_MAX_BATCH_SIZE", "16"),
            ("TELEMETRY_MAX_BATCH_WAIT_MS", "250"),
            ("TELEMETRY_OVERFLOW_POLICY", "Block"),
            ("TELEMETRY_MAX_ATTEMPTS", "5"),
            ("TELEMETRY_SEND_TIMEOUT_MS", "1500"),
            ("TELEMETRY_CLOSE_TIMEOUT_MS", "2000"),
            ("TELEMETRY_DEFAULT_LEVEL", "warning"),
            ("TELEMETRY_LOG_FILTERS", "App=debug"),
            ("TELEMETRY_SERVICE", "checkout"),
            ("TELEMETRY_ENV", "staging"),
            ("TELEMETRY_VERSION", " "),
            ("HOSTNAME", "node-7"),
            ("TELEMETRY_LOG_LEVEL", "DEBUG"),
        ]))
        .unwrap();

        assert_eq!(config.channel.capacity, 64);
        assert_eq!(config.channel.max_batch_size, 16);
        assert_eq!(config.channel.max_batch_wait, Duration::from_millis(250));
        assert_eq!(config.channel.overflow_policy, OverflowPolicy::Block);
        assert_eq!(config.channel.retry.max_attempts, 5);
        assert_eq!(config.channel.send_timeout, Duration::from_millis(1500));
        assert_eq!(config.channel.close_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.filters.minimum_for("Other"), Severity::Warning);
        assert_eq!(config.filters.minimum_for("App.Db"), Severity::Debug);
        assert_eq!(config.identity.service.as_deref(), Some("checkout"));
        assert_eq!(config.identity.env.as_deref(), Some("staging"));
        assert_eq!(config.identity.version, None);
        assert_eq!(config.identity.host.as_deref(), Some("node-7"));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_number_is_reported_with_its_key() {
        let err = PipelineConfig::from_lookup(lookup_from(&[("TELEMETRY_MAX_ATTEMPTS", "many")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnvValue {
                key: "TELEMETRY_MAX_ATTEMPTS".to_string(),
                value: "many".to_string(),
            }
        );
    }

    #[test]
    fn test_invalid_filter_rule_fails_configuration() {
        let err = PipelineConfig::from_lookup(lookup_from(&[("TELEMETRY_LOG_FILTERS", "App")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFilterRule { .. }));
    }

    #[test]
    fn test_validate_channel_limits() {
        let config = ChannelConfig {
            capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ChannelConfig {
            capacity: 10,
            max_batch_size: 11,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ChannelConfig {
            retry: RetryPolicy {
                max_attempts: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ChannelConfig {
            max_batch_wait: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = PipelineConfig {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let retry = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(retry.backoff(1), Duration::from_millis(100));
        assert_eq!(retry.backoff(2), Duration::from_millis(200));
        assert_eq!(retry.backoff(3), Duration::from_millis(400));
        assert_eq!(retry.backoff(4), Duration::from_millis(500));
        assert_eq!(retry.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn test_overflow_policy_parse() {
        assert_eq!("drop-newest".parse(), Ok(OverflowPolicy::DropNewest));
        assert_eq!("DROP_OLDEST".parse(), Ok(OverflowPolicy::DropOldest));
        assert!("spill".parse::<OverflowPolicy>().is_err());
    }
}
