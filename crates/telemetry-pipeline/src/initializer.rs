// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Enrichment initializers.
//!
//! Initializers stamp properties on every item before it is frozen. They run
//! on the producer's call path, in registration order, so they must be fast
//! and must not block.
//!
//! # Isolation
//!
//! Each initializer writes into its own scratch property set:
//!
//! - on success its writes are merged into the result; when two initializers
//!   write the same key, the one registered later wins;
//! - on failure its writes are discarded and emission continues. The first
//!   failure of a given initializer is logged, later ones are only counted, so
//!   a broken enrichment source cannot flood the diagnostics.
//!
//! The merged result has the lowest precedence of all property sources: scope
//! properties and call-site properties override it.

use std::env;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::ServiceIdentity;
use crate::error::{ConfigError, InitializerError};
use crate::item::{ExceptionInfo, Properties};
use crate::severity::Severity;

/// In-progress item as seen by an initializer.
pub struct InitContext<'a> {
    timestamp: DateTime<Utc>,
    severity: Severity,
    category: &'a str,
    message: &'a str,
    exception: Option<&'a ExceptionInfo>,
    properties: &'a mut Properties,
}

impl<'a> InitContext<'a> {
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn category(&self) -> &str {
        self.category
    }

    pub fn message(&self) -> &str {
        self.message
    }

    pub fn exception(&self) -> Option<&ExceptionInfo> {
        self.exception
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Properties written so far by the running initializer.
    pub fn properties(&self) -> &Properties {
        self.properties
    }
}

/// Item fields an initializer can read.
#[derive(Debug, Clone, Copy)]
pub struct ItemHeader<'a> {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub category: &'a str,
    pub message: &'a str,
    pub exception: Option<&'a ExceptionInfo>,
}

pub trait TelemetryInitializer: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    fn initialize(&self, context: &mut InitContext<'_>) -> Result<(), InitializerError>;
}

/// Initializer backed by a closure, see [`from_fn`].
pub struct FnInitializer<F> {
    name: String,
    f: F,
}

/// Adapts a closure into a [`TelemetryInitializer`].
pub fn from_fn<F>(name: impl Into<String>, f: F) -> FnInitializer<F>
where
    F: Fn(&mut InitContext<'_>) -> Result<(), InitializerError> + Send + Sync,
{
    FnInitializer {
        name: name.into(),
        f,
    }
}

impl<F> TelemetryInitializer for FnInitializer<F>
where
    F: Fn(&mut InitContext<'_>) -> Result<(), InitializerError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self, context: &mut InitContext<'_>) -> Result<(), InitializerError> {
        (self.f)(context)
    }
}

/// Stamps a fixed set of properties.
#[derive(Debug, Clone)]
pub struct StaticPropertiesInitializer {
    name: String,
    properties: Properties,
}

impl StaticPropertiesInitializer {
    pub fn new<I, K, V>(name: impl Into<String>, properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            properties: properties
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl TelemetryInitializer for StaticPropertiesInitializer {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self, context: &mut InitContext<'_>) -> Result<(), InitializerError> {
        for (key, value) in &self.properties {
            context.set_property(key.clone(), value.clone());
        }
        Ok(())
    }
}

/// Stamps the service identity: `service`, `env`, `version` and `host`.
#[derive(Debug, Clone)]
pub struct EnvironmentInitializer {
    properties: Properties,
}

impl EnvironmentInitializer {
    #[must_use]
    pub fn new(identity: &ServiceIdentity) -> Self {
        let mut properties = Properties::new();
        // Unified service tagging keys.
        let fields = [
            ("service", &identity.service),
            ("env", &identity.env),
            ("version", &identity.version),
            ("host", &identity.host),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                properties.insert(key.to_string(), value.clone());
            }
        }
        Self { properties }
    }

    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }
}

impl TelemetryInitializer for EnvironmentInitializer {
    fn name(&self) -> &str {
        "environment"
    }

    fn initialize(&self, context: &mut InitContext<'_>) -> Result<(), InitializerError> {
        for (key, value) in &self.properties {
            context.set_property(key.clone(), value.clone());
        }
        Ok(())
    }
}

/// Stamps the Kubernetes identity of the running container: `pod_name`,
/// `kube_namespace`, `kube_node` and `kube_container_name`.
///
/// Values come from the downward-API variables `POD_NAME`, `POD_NAMESPACE`,
/// `NODE_NAME` and `CONTAINER_NAME`, read once at construction.
/// `KUBERNETES_SERVICE_HOST` tells whether the process runs in a cluster;
/// outside one every run fails, so the chain reports it once and items are
/// emitted without cluster properties.
#[derive(Debug, Clone)]
pub struct KubernetesInitializer {
    properties: Option<Properties>,
}

impl KubernetesInitializer {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if non_empty("KUBERNETES_SERVICE_HOST").is_none() {
            return Self { properties: None };
        }

        let fields = [
            ("pod_name", "POD_NAME"),
            ("kube_namespace", "POD_NAMESPACE"),
            ("kube_node", "NODE_NAME"),
            ("kube_container_name", "CONTAINER_NAME"),
        ];
        let properties = fields
            .into_iter()
            .filter_map(|(key, var)| non_empty(var).map(|value| (key.to_string(), value)))
            .collect();
        Self {
            properties: Some(properties),
        }
    }

    #[must_use]
    pub fn in_cluster(&self) -> bool {
        self.properties.is_some()
    }

    /// Cluster properties, `None` outside a cluster.
    #[must_use]
    pub fn properties(&self) -> Option<&Properties> {
        self.properties.as_ref()
    }
}

impl TelemetryInitializer for KubernetesInitializer {
    fn name(&self) -> &str {
        "kubernetes"
    }

    fn initialize(&self, context: &mut InitContext<'_>) -> Result<(), InitializerError> {
        let Some(properties) = &self.properties else {
            return Err(InitializerError::new(
                "not running in a Kubernetes cluster (KUBERNETES_SERVICE_HOST is not set)",
            ));
        };
        for (key, value) in properties {
            context.set_property(key.clone(), value.clone());
        }
        Ok(())
    }
}

struct Registered {
    initializer: Box<dyn TelemetryInitializer>,
    reported: AtomicBool,
}

/// Ordered list of initializers.
#[derive(Default)]
pub struct InitializerChain {
    entries: Vec<Registered>,
    failures: AtomicU64,
}

impl fmt::Debug for InitializerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .entries
            .iter()
            .map(|entry| entry.initializer.name())
            .collect();
        f.debug_struct("InitializerChain")
            .field("initializers", &names)
            .field("failures", &self.failures())
            .finish()
    }
}

impl InitializerChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `initializer`; it runs after every initializer registered before it.
    pub fn register<I>(&mut self, initializer: I) -> Result<(), ConfigError>
    where
        I: TelemetryInitializer + 'static,
    {
        if initializer.name().trim().is_empty() {
            return Err(ConfigError::InvalidInitializer(
                "initializer name must not be blank".to_string(),
            ));
        }
        self.entries.push(Registered {
            initializer: Box::new(initializer),
            reported: AtomicBool::new(false),
        });
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of failed initializer runs since creation.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Runs every initializer against `header` and returns the merged properties.
    pub fn apply(&self, header: ItemHeader<'_>) -> Properties {
        let mut merged = Properties::new();
        for entry in &self.entries {
            let mut scratch = Properties::new();
            let mut context = InitContext {
                timestamp: header.timestamp,
                severity: header.severity,
                category: header.category,
                message: header.message,
                exception: header.exception,
                properties: &mut scratch,
            };
            match entry.initializer.initialize(&mut context) {
                Ok(()) => merged.extend(scratch),
                Err(e) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    if !entry.reported.swap(true, Ordering::Relaxed) {
                        warn!(
                            "INITIALIZER | Initializer '{}' failed, its properties are skipped: {}",
                            entry.initializer.name(),
                            e
                        );
                    }
                }
            }
        }
        merged
    }
}
