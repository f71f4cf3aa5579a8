// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Nested enrichment scopes.
//!
//! A [`ScopeStack`] belongs to one logical execution flow (a thread or a
//! task) and is passed explicitly to the logger. There is no ambient or
//! thread-local state, so two flows can never see each other's scopes.
//!
//! # Composition
//!
//! ```text
//!   begin({Method: Main, Tenant: a})      outer
//!     begin({Tenant: b})                  inner
//!       effective = {Method: Main, Tenant: b}
//!     end(inner)
//!     effective = {Method: Main, Tenant: a}
//!   end(outer)
//! ```
//!
//! Scopes are merged outer to inner, the innermost value wins on a key
//! collision.
//!
//! # Discipline
//!
//! Scopes close in reverse order of opening. [`ScopeStack::end`] rejects a
//! handle that is not the innermost open scope ([`ScopeError::OutOfOrder`]) or
//! that was issued by another stack ([`ScopeError::ForeignScope`]) and leaves
//! every stack untouched. [`ScopeStack::scoped`] returns a guard that closes
//! the scope on drop.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::error;

use crate::error::ScopeError;
use crate::item::Properties;

static NEXT_STACK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct Frame {
    token: u64,
    properties: Properties,
}

/// Per-flow stack of open scopes.
#[derive(Debug)]
pub struct ScopeStack {
    id: u64,
    frames: Vec<Frame>,
    next_token: u64,
}

/// Proof that a scope was opened with [`ScopeStack::begin`].
///
/// Not `Clone`: a scope is ended exactly once.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "the scope stays open until its handle is passed to `ScopeStack::end`"]
pub struct ScopeHandle {
    stack_id: u64,
    token: u64,
}

impl ScopeHandle {
    #[must_use]
    pub fn stack_id(&self) -> u64 {
        self.stack_id
    }

    #[must_use]
    pub fn token(&self) -> u64 {
        self.token
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_STACK_ID.fetch_add(1, Ordering::Relaxed),
            frames: Vec::new(),
            next_token: 0,
        }
    }

    /// Process-unique identifier of this stack.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Opens a scope carrying `properties`.
    ///
    /// Keys must be non-blank.
    pub fn begin<I, K, V>(&mut self, properties: I) -> Result<ScopeHandle, ScopeError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut collected = Properties::new();
        for (key, value) in properties {
            let key = key.into();
            if key.trim().is_empty() {
                return Err(ScopeError::InvalidProperties(
                    "scope property keys must not be blank".to_string(),
                ));
            }
            collected.insert(key, value.into());
        }

        let token = self.next_token;
        self.next_token += 1;
        self.frames.push(Frame {
            token,
            properties: collected,
        });
        Ok(ScopeHandle {
            stack_id: self.id,
            token,
        })
    }

    /// Closes the scope `handle` refers to, which must be the innermost one.
    pub fn end(&mut self, handle: ScopeHandle) -> Result<(), ScopeError> {
        if handle.stack_id != self.id {
            return Err(ScopeError::ForeignScope {
                stack: self.id,
                handle,
            });
        }
        match self.frames.last() {
            Some(top) if top.token == handle.token => {
                self.frames.pop();
                Ok(())
            }
            _ => Err(ScopeError::OutOfOrder(handle)),
        }
    }

    /// Opens a scope that closes when the returned guard is dropped.
    ///
    /// The guard dereferences to this stack, so nested scopes and log calls
    /// go through it.
    pub fn scoped<I, K, V>(&mut self, properties: I) -> Result<ScopeGuard<'_>, ScopeError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let handle = self.begin(properties)?;
        Ok(ScopeGuard {
            token: handle.token,
            stack: self,
        })
    }

    /// Merge of all open scopes, outermost first, innermost wins.
    #[must_use]
    pub fn effective_properties(&self) -> Properties {
        let mut merged = Properties::new();
        self.merge_into(&mut merged);
        merged
    }

    /// Value of `key` in the innermost scope that defines it.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.properties.get(key))
            .map(String::as_str)
    }

    /// Writes the effective properties over `target`.
    pub(crate) fn merge_into(&self, target: &mut Properties) {
        for frame in &self.frames {
            for (key, value) in &frame.properties {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Scope opened by [`ScopeStack::scoped`], closed on drop.
#[derive(Debug)]
pub struct ScopeGuard<'a> {
    stack: &'a mut ScopeStack,
    token: u64,
}

impl Deref for ScopeGuard<'_> {
    type Target = ScopeStack;

    fn deref(&self) -> &ScopeStack {
        self.stack
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut ScopeStack {
        self.stack
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        let (stack_id, token) = (self.stack.id, self.token);
        let frames = &mut self.stack.frames;
        let Some(position) = frames.iter().rposition(|frame| frame.token == token) else {
            return;
        };
        if position + 1 != frames.len() {
            // Scopes begun through the handle API were left open above this guard.
            error!(
                "SCOPE | Scope guard released with {} inner scope(s) still open on stack {}, closing them",
                frames.len() - position - 1,
                stack_id
            );
        }
        frames.truncate(position);
    }
}
