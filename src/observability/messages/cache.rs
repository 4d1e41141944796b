// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the semantic answer cache.
//!
//! All cache events are `debug!`: they fire for every query shape a resolution touches.

use crate::observability::messages::StructuredLog;
use crate::pattern::{AtomicQuery, Label};
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A new query shape entered the cache and was linked into its family.
///
/// # Log Level
/// `debug!` - Per-query detail
pub struct CacheEntryCreated<'a> {
    pub query: &'a AtomicQuery,
    pub family: Option<&'a Label>,
    pub parents: usize,
    pub children: usize,
}

impl Display for CacheEntryCreated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.family {
            Some(family) => write!(
                f,
                "Cached `{}` in family '{}' with {} parents and {} children",
                self.query, family, self.parents, self.children
            ),
            None => write!(f, "Cached untyped `{}`", self.query),
        }
    }
}

impl StructuredLog for CacheEntryCreated<'_> {
    fn log(&self) {
        tracing::debug!(
            query = %self.query,
            family = self.family.map(|l| l.name()),
            parents = self.parents,
            children = self.children,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "cache_entry",
            span_name = name,
            query = %self.query,
            family = self.family.map(|l| l.name()),
        )
    }
}

/// Answers of a parent query were specialised into one of its children.
///
/// # Log Level
/// `debug!` - Per-query detail
pub struct AnswersPropagated<'a> {
    pub parent: &'a AtomicQuery,
    pub child: &'a AtomicQuery,
    pub count: usize,
}

impl Display for AnswersPropagated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Propagated {} answers from `{}` to `{}`",
            self.count, self.parent, self.child
        )
    }
}

impl StructuredLog for AnswersPropagated<'_> {
    fn log(&self) {
        tracing::debug!(
            parent = %self.parent,
            child = %self.child,
            count = self.count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "answers_propagated",
            span_name = name,
            parent = %self.parent,
            child = %self.child,
        )
    }
}

/// A query reached a completeness level.
///
/// # Log Level
/// `debug!` - Per-query detail
pub struct CompletenessAcknowledged<'a> {
    pub query: &'a AtomicQuery,
    /// `db_complete` or `complete`.
    pub level: &'a str,
}

impl Display for CompletenessAcknowledged<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "`{}` is {}", self.query, self.level)
    }
}

impl StructuredLog for CompletenessAcknowledged<'_> {
    fn log(&self) {
        tracing::debug!(query = %self.query, level = self.level, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "completeness",
            span_name = name,
            query = %self.query,
            level = self.level,
        )
    }
}
