// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for resolution episodes and the reasoner driver.
//!
//! This module contains message types for logging events related to:
//! * Dataflow episode lifecycle (start, completion, failure)
//! * Fixpoint iteration over cyclical rule sets
//! * Negation pre-resolution

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A dataflow episode started for a query.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use dagwood_reasoner::observability::messages::engine::EpisodeStarted;
///
/// let msg = EpisodeStarted {
///     query: "{ $x isa person; }",
///     iteration: 1,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct EpisodeStarted<'a> {
    pub query: &'a str,
    pub iteration: usize,
}

impl Display for EpisodeStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Starting resolution episode {} for {}",
            self.iteration, self.query
        )
    }
}

impl StructuredLog for EpisodeStarted<'_> {
    fn log(&self) {
        tracing::info!(
            query = self.query,
            iteration = self.iteration,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "episode",
            span_name = name,
            query = self.query,
            iteration = self.iteration,
        )
    }
}

/// A dataflow episode went quiet.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use dagwood_reasoner::observability::messages::engine::EpisodeCompleted;
/// use std::time::Duration;
///
/// let msg = EpisodeCompleted {
///     query: "{ $x isa person; }",
///     iteration: 1,
///     answers: 3,
///     duration: Duration::from_millis(12),
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct EpisodeCompleted<'a> {
    pub query: &'a str,
    pub iteration: usize,
    pub answers: usize,
    pub duration: std::time::Duration,
}

impl Display for EpisodeCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Resolution episode {} for {} produced {} answers in {:?}",
            self.iteration, self.query, self.answers, self.duration
        )
    }
}

impl StructuredLog for EpisodeCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            query = self.query,
            iteration = self.iteration,
            answers = self.answers,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "episode_completed",
            span_name = name,
            query = self.query,
            iteration = self.iteration,
            duration = ?self.duration,
        )
    }
}

/// A dataflow episode failed.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use dagwood_reasoner::observability::messages::engine::EpisodeFailed;
///
/// let error = std::io::Error::new(std::io::ErrorKind::Other, "test error");
/// let msg = EpisodeFailed {
///     query: "{ $x isa person; }",
///     error: &error,
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct EpisodeFailed<'a> {
    pub query: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for EpisodeFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Resolution of {} failed: {}", self.query, self.error)
    }
}

impl StructuredLog for EpisodeFailed<'_> {
    fn log(&self) {
        tracing::error!(
            query = self.query,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "episode_failed",
            span_name = name,
            query = self.query,
            error = %self.error,
        )
    }
}

/// Cyclical rules may still produce answers; another episode runs.
///
/// # Log Level
/// `debug!` - Iteration detail
pub struct ReiterationRequired<'a> {
    pub query: &'a str,
    pub iteration: usize,
    pub new_answers: usize,
}

impl Display for ReiterationRequired<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Episode {} for {} found {} new answers, reiterating",
            self.iteration, self.query, self.new_answers
        )
    }
}

impl StructuredLog for ReiterationRequired<'_> {
    fn log(&self) {
        tracing::debug!(
            query = self.query,
            iteration = self.iteration,
            new_answers = self.new_answers,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "reiteration",
            span_name = name,
            query = self.query,
            iteration = self.iteration,
        )
    }
}

/// Resolution finished with every answer found.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ResolutionCompleted<'a> {
    pub query: &'a str,
    pub iterations: usize,
    pub answers: usize,
}

impl Display for ResolutionCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Resolved {} to {} answers after {} episodes",
            self.query, self.answers, self.iterations
        )
    }
}

impl StructuredLog for ResolutionCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            query = self.query,
            iterations = self.iterations,
            answers = self.answers,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "resolution",
            span_name = name,
            query = self.query,
            iterations = self.iterations,
        )
    }
}

/// Resolution stopped early and returns what it has.
///
/// # Log Level
/// `warn!` - Degraded result
pub struct PartialResultReturned<'a> {
    pub query: &'a str,
    pub answers: usize,
    pub reason: &'a dyn std::error::Error,
}

impl Display for PartialResultReturned<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Returning {} answers for {} after: {}",
            self.answers, self.query, self.reason
        )
    }
}

impl StructuredLog for PartialResultReturned<'_> {
    fn log(&self) {
        tracing::warn!(
            query = self.query,
            answers = self.answers,
            reason = %self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "partial_result",
            span_name = name,
            query = self.query,
            answers = self.answers,
        )
    }
}

/// A negated conjunction was resolved ahead of the query that negates it.
///
/// # Log Level
/// `debug!` - Per-query detail
pub struct NegationResolved<'a> {
    pub negation: &'a str,
    pub answers: usize,
}

impl Display for NegationResolved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Negated {} has {} answers", self.negation, self.answers)
    }
}

impl StructuredLog for NegationResolved<'_> {
    fn log(&self) {
        tracing::debug!(negation = self.negation, answers = self.answers, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("negation", span_name = name, negation = self.negation)
    }
}
