// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Logging front-end.
//!
//! A [`Logger`] is bound to one category. Each call goes through:
//!
//! 1. the severity filter, resolved once for the category when the logger is
//!    created; a filtered call returns before anything is allocated;
//! 2. template rendering, which also yields the call-site properties;
//! 3. enrichment, where properties are layered from lowest to highest
//!    precedence: initializer chain, open scopes (outer to inner), call site;
//! 4. enqueueing into the channel.

use std::fmt::{self, Display};
use std::sync::Arc;

use crate::channel::{ChannelHandle, EnqueueOutcome};
use crate::error::ChannelError;
use crate::filter::FilterRules;
use crate::initializer::{InitializerChain, ItemHeader};
use crate::item::{capture_timestamp, ExceptionInfo, Properties, TelemetryItem};
use crate::scope::ScopeStack;
use crate::severity::Severity;
use crate::template;

/// Positional template argument.
pub type Arg<'a> = &'a (dyn Display + Sync);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    /// Below the category's minimum severity; nothing was emitted.
    Filtered,
    Enqueued(EnqueueOutcome),
}

#[derive(Clone)]
pub struct Logger {
    category: Arc<str>,
    minimum: Severity,
    initializers: Arc<InitializerChain>,
    channel: ChannelHandle,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("category", &self.category)
            .field("minimum", &self.minimum)
            .finish_non_exhaustive()
    }
}

impl Logger {
    pub(crate) fn new(
        category: &str,
        filters: &FilterRules,
        initializers: Arc<InitializerChain>,
        channel: ChannelHandle,
    ) -> Self {
        Self {
            category: Arc::from(category),
            minimum: filters.minimum_for(category),
            initializers,
            channel,
        }
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Lowest severity this logger emits.
    #[must_use]
    pub fn minimum(&self) -> Severity {
        self.minimum
    }

    #[must_use]
    pub fn is_enabled(&self, severity: Severity) -> bool {
        severity >= self.minimum
    }

    pub async fn log(
        &self,
        scopes: &ScopeStack,
        severity: Severity,
        template: &str,
        args: &[Arg<'_>],
        exception: Option<ExceptionInfo>,
    ) -> Result<LogOutcome, ChannelError> {
        self.log_with_properties(
            scopes,
            severity,
            template,
            args,
            exception,
            std::iter::empty::<(String, String)>(),
        )
        .await
    }

    /// Like [`Logger::log`], with extra call-site properties that override
    /// every other source, template holes included.
    pub async fn log_with_properties<I, K, V>(
        &self,
        scopes: &ScopeStack,
        severity: Severity,
        template: &str,
        args: &[Arg<'_>],
        exception: Option<ExceptionInfo>,
        properties: I,
    ) -> Result<LogOutcome, ChannelError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if !self.is_enabled(severity) {
            return Ok(LogOutcome::Filtered);
        }

        let timestamp = capture_timestamp();
        let mut call_site = Properties::new();
        let message = template::render(template, args, &mut call_site);
        call_site.extend(
            properties
                .into_iter()
                .map(|(key, value)| (key.into(), value.into())),
        );

        let mut merged = self.initializers.apply(ItemHeader {
            timestamp,
            severity,
            category: &self.category,
            message: &message,
            exception: exception.as_ref(),
        });
        scopes.merge_into(&mut merged);
        merged.extend(call_site);

        let item = TelemetryItem::new(
            timestamp,
            severity,
            self.category.to_string(),
            message,
            exception,
            merged,
        );
        self.channel.enqueue(item).await.map(LogOutcome::Enqueued)
    }

    pub async fn trace(
        &self,
        scopes: &ScopeStack,
        template: &str,
        args: &[Arg<'_>],
    ) -> Result<LogOutcome, ChannelError> {
        self.log(scopes, Severity::Trace, template, args, None).await
    }

    pub async fn debug(
        &self,
        scopes: &ScopeStack,
        template: &str,
        args: &[Arg<'_>],
    ) -> Result<LogOutcome, ChannelError> {
        self.log(scopes, Severity::Debug, template, args, None).await
    }

    pub async fn info(
        &self,
        scopes: &ScopeStack,
        template: &str,
        args: &[Arg<'_>],
    ) -> Result<LogOutcome, ChannelError> {
        self.log(scopes, Severity::Information, template, args, None)
            .await
    }

    pub async fn warn(
        &self,
        scopes: &ScopeStack,
        template: &str,
        args: &[Arg<'_>],
    ) -> Result<LogOutcome, ChannelError> {
        self.log(scopes, Severity::Warning, template, args, None).await
    }

    pub async fn error(
        &self,
        scopes: &ScopeStack,
        template: &str,
        args: &[Arg<'_>],
    ) -> Result<LogOutcome, ChannelError> {
        self.log(scopes, Severity::Error, template, args, None).await
    }

    pub async fn critical(
        &self,
        scopes: &ScopeStack,
        template: &str,
        args: &[Arg<'_>],
    ) -> Result<LogOutcome, ChannelError> {
        self.log(scopes, Severity::Critical, template, args, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelService;
    use crate::config::ChannelConfig;
    use crate::filter::FilterRule;
    use crate::initializer::{from_fn, StaticPropertiesInitializer};
    use crate::test_support::RecordingTransport;

    fn logger_with(
        category: &str,
        filters: &FilterRules,
        chain: InitializerChain,
    ) -> (Logger, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let (service, channel) =
            ChannelService::new(ChannelConfig::default(), Arc::clone(&transport)).unwrap();
        tokio::spawn(service.run());
        (
            Logger::new(category, filters, Arc::new(chain), channel),
            transport,
        )
    }

    async fn flushed_items(logger: &Logger, transport: &RecordingTransport) -> Vec<TelemetryItem> {
        logger.channel.flush(None).await.unwrap();
        transport
            .entries()
            .into_iter()
            .map(|entry| entry.into_item())
            .collect()
    }

    #[tokio::test]
    async fn test_filtered_call_emits_nothing() {
        let filters =
            FilterRules::default().with_rule(FilterRule::new("A", Severity::Warning).unwrap());
        let (logger, transport) = logger_with("A.B", &filters, InitializerChain::new());
        let scopes = ScopeStack::new();

        let outcome = logger.info(&scopes, "ignored", &[]).await.unwrap();
        assert_eq!(outcome, LogOutcome::Filtered);
        assert!(flushed_items(&logger, &transport).await.is_empty());

        let outcome = logger.warn(&scopes, "kept", &[]).await.unwrap();
        assert!(matches!(outcome, LogOutcome::Enqueued(_)));
        assert_eq!(flushed_items(&logger, &transport).await.len(), 1);
    }

    #[tokio::test]
    async fn test_property_precedence() {
        let mut chain = InitializerChain::new();
        chain
            .register(StaticPropertiesInitializer::new(
                "defaults",
                [("Tenant", "initializer"), ("Region", "eu"), ("Step", "initializer")],
            ))
            .unwrap();
        let (logger, transport) = logger_with("App", &FilterRules::default(), chain);

        let mut scopes = ScopeStack::new();
        let _outer = scopes.begin([("Tenant", "outer"), ("Method", "Main")]).unwrap();
        let _inner = scopes.begin([("Tenant", "inner")]).unwrap();

        logger
            .log_with_properties(
                &scopes,
                Severity::Information,
                "step {Step} done",
                &[&"template"],
                None,
                [("Method", "call-site")],
            )
            .await
            .unwrap();

        let items = flushed_items(&logger, &transport).await;
        let item = &items[0];
        assert_eq!(item.message(), "step template done");
        assert_eq!(item.property("Region"), Some("eu"));
        assert_eq!(item.property("Tenant"), Some("inner"));
        assert_eq!(item.property("Step"), Some("template"));
        assert_eq!(item.property("Method"), Some("call-site"));
        assert_eq!(item.property("{OriginalFormat}"), Some("step {Step} done"));
    }

    #[tokio::test]
    async fn test_initializer_sees_rendered_message_and_exception() {
        let mut chain = InitializerChain::new();
        chain
            .register(from_fn("echo", |context| {
                let message = context.message().to_string();
                let has_exception = context.exception().is_some().to_string();
                context.set_property("seen_message", message);
                context.set_property("seen_exception", has_exception);
                Ok(())
            }))
            .unwrap();
        let (logger, transport) = logger_with("App", &FilterRules::default(), chain);
        let scopes = ScopeStack::new();

        logger
            .log(
                &scopes,
                Severity::Error,
                "upload of {File} failed",
                &[&"report.csv"],
                Some(ExceptionInfo::new("IoError", "connection reset")),
            )
            .await
            .unwrap();

        let items = flushed_items(&logger, &transport).await;
        assert_eq!(
            items[0].property("seen_message"),
            Some("upload of report.csv failed")
        );
        assert_eq!(items[0].property("seen_exception"), Some("true"));
        assert_eq!(
            items[0].exception().map(|e| e.message.as_str()),
            Some("connection reset")
        );
    }

    #[tokio::test]
    async fn test_scope_guard_applies_to_calls_inside() {
        let (logger, transport) =
            logger_with("App", &FilterRules::default(), InitializerChain::new());
        let mut scopes = ScopeStack::new();
        {
            let guard = scopes.scoped([("Method", "Main")]).unwrap();
            logger.info(&guard, "inside", &[]).await.unwrap();
        }
        logger.info(&scopes, "outside", &[]).await.unwrap();

        let items = flushed_items(&logger, &transport).await;
        assert_eq!(items[0].property("Method"), Some("Main"));
        assert_eq!(items[1].property("Method"), None);
    }

    #[tokio::test]
    async fn test_log_after_close_fails() {
        let (logger, _transport) =
            logger_with("App", &FilterRules::default(), InitializerChain::new());
        logger.channel.close().await.unwrap();

        let result = logger.info(&ScopeStack::new(), "late", &[]).await;
        assert_eq!(result, Err(ChannelError::Closed));
    }
}
