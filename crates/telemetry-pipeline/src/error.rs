// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the telemetry pipeline.
//!
//! Each failure class surfaces at a different place:
//!
//! - [`ConfigError`]: returned once, at construction or registration time.
//! - [`ScopeError`]: returned to the flow that broke stack discipline.
//! - [`InitializerError`]: swallowed by the initializer chain and diagnosed once.
//! - [`TransportError`]: retried inside the background sender, never seen by producers.
//! - [`ChannelError`]: the channel is closed or its worker is gone.
//!
//! A flush that runs out of time is not an error: it is reported as
//! [`FlushStatus::Partial`](crate::channel::FlushStatus::Partial).

use crate::scope::ScopeHandle;

/// Configuration and registration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "Invalid severity '{0}'. Must be one of: trace, debug, information, warning, error, critical"
    )]
    InvalidSeverity(String),

    #[error("Invalid filter rule '{rule}': {reason}")]
    InvalidFilterRule { rule: String, reason: String },

    #[error("Invalid channel configuration: {0}")]
    InvalidChannel(String),

    #[error("Invalid initializer registration: {0}")]
    InvalidInitializer(String),

    #[error("Invalid value '{value}' for {key}")]
    InvalidEnvValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No tokio runtime available to start the channel worker")]
    RuntimeUnavailable,
}

/// Scope-discipline errors. These are programming errors in the calling flow.
///
/// The offending handle is handed back so the caller can still end it in the
/// right order.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    #[error("scope {} is not the innermost open scope of stack {}", .0.token(), .0.stack_id())]
    OutOfOrder(ScopeHandle),

    #[error("scope belongs to stack {}, not to stack {stack}", .handle.stack_id())]
    ForeignScope { stack: u64, handle: ScopeHandle },

    #[error("invalid scope properties: {0}")]
    InvalidProperties(String),
}

impl ScopeError {
    /// Returns the handle carried by the error, if any.
    #[must_use]
    pub fn into_handle(self) -> Option<ScopeHandle> {
        match self {
            ScopeError::OutOfOrder(handle) | ScopeError::ForeignScope { handle, .. } => {
                Some(handle)
            }
            ScopeError::InvalidProperties(_) => None,
        }
    }
}

/// Failure reported by an enrichment initializer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct InitializerError(String);

impl InitializerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure reported by a transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Transient failure (network error, 5xx, timeout). The batch is retried.
    #[error("retryable transport failure: {0}")]
    Retryable(String),

    /// The collector refused the batch. Retrying cannot help.
    #[error("permanent transport failure: {0}")]
    Permanent(String),
}

impl TransportError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Retryable(_))
    }
}

/// Errors returned by the buffering channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("telemetry channel is closed")]
    Closed,

    #[error("telemetry channel worker is not running")]
    WorkerUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeStack;

    #[test]
    fn test_error_display() {
        let error = ConfigError::InvalidFilterRule {
            rule: "A*=warning".to_string(),
            reason: "wildcards are not supported".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid filter rule 'A*=warning': wildcards are not supported"
        );
        assert_eq!(
            ChannelError::Closed.to_string(),
            "telemetry channel is closed"
        );
    }

    #[test]
    fn test_transport_error_classification() {
        assert!(TransportError::Retryable("503".into()).is_retryable());
        assert!(!TransportError::Permanent("403".into()).is_retryable());
    }

    #[test]
    fn test_scope_error_returns_handle() {
        let mut stack = ScopeStack::new();
        let outer = stack.begin([("k", "v")]).expect("begin outer");
        let inner = stack.begin([("k", "w")]).expect("begin inner");

        let err = stack.end(outer).expect_err("outer is not innermost");
        assert!(err.to_string().contains("not the innermost open scope"));
        let outer = err.into_handle().expect("handle is returned");

        stack.end(inner).expect("end inner");
        stack.end(outer).expect("end outer");
        assert!(stack.is_empty());
    }
}
