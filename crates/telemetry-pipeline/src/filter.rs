// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Minimum-severity rules per category prefix.
//!
//! A rule `{category_prefix, minimum}` applies to every category starting
//! with the prefix (ASCII case-insensitive); the empty prefix applies to all
//! categories. For a given category:
//!
//! 1. the matching rule with the longest prefix wins;
//! 2. among equally long matches, the rule registered last wins;
//! 3. with no match, the default minimum applies.
//!
//! Rules are fixed once the pipeline is built.
//!
//! # Text form
//!
//! Rules can be parsed from `prefix=level` pairs separated by `,` or `;`:
//!
//! ```text
//! =trace,App.Db=warning;App.Db.Migrations=debug
//! ```

use std::str::FromStr;

use crate::error::ConfigError;
use crate::severity::Severity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    category_prefix: String,
    minimum: Severity,
}

impl FilterRule {
    pub fn new(
        category_prefix: impl Into<String>,
        minimum: Severity,
    ) -> Result<Self, ConfigError> {
        let category_prefix = category_prefix.into();
        if let Some(reason) = invalid_prefix_reason(&category_prefix) {
            return Err(ConfigError::InvalidFilterRule {
                rule: format!("{category_prefix}={minimum}"),
                reason: reason.to_string(),
            });
        }
        Ok(Self {
            category_prefix,
            minimum,
        })
    }

    #[must_use]
    pub fn category_prefix(&self) -> &str {
        &self.category_prefix
    }

    #[must_use]
    pub fn minimum(&self) -> Severity {
        self.minimum
    }

    #[must_use]
    pub fn matches(&self, category: &str) -> bool {
        category
            .get(..self.category_prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(&self.category_prefix))
    }
}

fn invalid_prefix_reason(prefix: &str) -> Option<&'static str> {
    if prefix.contains('*') {
        Some("wildcards are not supported")
    } else if prefix.chars().any(char::is_whitespace) {
        Some("category prefixes must not contain whitespace")
    } else {
        None
    }
}

impl FromStr for FilterRule {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((prefix, level)) = s.split_once('=') else {
            return Err(ConfigError::InvalidFilterRule {
                rule: s.to_string(),
                reason: "expected 'prefix=level'".to_string(),
            });
        };
        let minimum = level
            .parse::<Severity>()
            .map_err(|_| ConfigError::InvalidFilterRule {
                rule: s.to_string(),
                reason: format!("unknown severity '{}'", level.trim()),
            })?;
        FilterRule::new(prefix.trim(), minimum)
    }
}

/// Ordered rule set plus the default minimum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRules {
    rules: Vec<FilterRule>,
    default_minimum: Severity,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self::new(Severity::Information)
    }
}

impl FilterRules {
    #[must_use]
    pub fn new(default_minimum: Severity) -> Self {
        Self {
            rules: Vec::new(),
            default_minimum,
        }
    }

    /// Parses a rule list; blank entries are ignored.
    pub fn parse(rules: &str, default_minimum: Severity) -> Result<Self, ConfigError> {
        let mut parsed = Self::new(default_minimum);
        let entries = rules
            .split(|c: char| c == ',' || c == ';')
            .map(str::trim)
            .filter(|rule| !rule.is_empty());
        for rule in entries {
            parsed.push(rule.parse()?);
        }
        Ok(parsed)
    }

    #[must_use]
    pub fn with_rule(mut self, rule: FilterRule) -> Self {
        self.push(rule);
        self
    }

    pub fn push(&mut self, rule: FilterRule) {
        self.rules.push(rule);
    }

    #[must_use]
    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    #[must_use]
    pub fn default_minimum(&self) -> Severity {
        self.default_minimum
    }

    /// Effective minimum severity for `category`.
    #[must_use]
    pub fn minimum_for(&self, category: &str) -> Severity {
        let mut best: Option<&FilterRule> = None;
        for rule in self.rules.iter().filter(|rule| rule.matches(category)) {
            // `>=` lets the most recently registered rule win a tie.
            if best.map_or(true, |b| rule.category_prefix.len() >= b.category_prefix.len()) {
                best = Some(rule);
            }
        }
        best.map_or(self.default_minimum, FilterRule::minimum)
    }

    #[must_use]
    pub fn is_enabled(&self, category: &str, severity: Severity) -> bool {
        severity >= self.minimum_for(category)
    }
}
