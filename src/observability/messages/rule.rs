// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for rule set construction and ordering.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Rules were validated and their priorities computed.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use dagwood_reasoner::observability::messages::rule::RuleSetBuilt;
///
/// let msg = RuleSetBuilt {
///     rule_count: 4,
///     stratified: true,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct RuleSetBuilt {
    pub rule_count: usize,
    /// Some rule body negates, so strata come from the type graph.
    pub stratified: bool,
}

impl Display for RuleSetBuilt {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.stratified {
            write!(f, "Built {} rules in negation strata", self.rule_count)
        } else {
            write!(f, "Built {} rules ordered by priority", self.rule_count)
        }
    }
}

impl StructuredLog for RuleSetBuilt {
    fn log(&self) {
        tracing::info!(
            rule_count = self.rule_count,
            stratified = self.stratified,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "rule_set",
            span_name = name,
            rule_count = self.rule_count,
            stratified = self.stratified,
        )
    }
}

/// One rule in firing order.
///
/// # Log Level
/// `debug!` - Ordering detail
pub struct RuleScheduled<'a> {
    pub rule: &'a str,
    pub position: usize,
    pub depth: usize,
}

impl Display for RuleScheduled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Rule '{}' fires at position {} (depth {})",
            self.rule, self.position, self.depth
        )
    }
}

impl StructuredLog for RuleScheduled<'_> {
    fn log(&self) {
        tracing::debug!(
            rule = self.rule,
            position = self.position,
            depth = self.depth,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("rule_scheduled", span_name = name, rule = self.rule)
    }
}
