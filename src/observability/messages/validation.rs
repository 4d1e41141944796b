// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Events emitted by `config::validate_config`.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A `sup` chain that returns to where it started. `cycle` repeats its first label last.
pub struct CyclicTypeHierarchy<'a> {
    pub cycle: &'a [&'a str],
}

impl Display for CyclicTypeHierarchy<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Type hierarchy loops: {}", self.cycle.join(" sub "))
    }
}

impl StructuredLog for CyclicTypeHierarchy<'_> {
    fn log(&self) {
        tracing::error!(
            cycle = self.cycle.join(" -> "),
            types_in_cycle = self.cycle.len().saturating_sub(1),
            "{}",
            self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("validation", name = name, cycle = self.cycle.join(" -> "))
    }
}

/// A type, rule, query or data item names a label the schema does not define.
pub struct UnresolvedLabel<'a> {
    pub context: &'a str,
    pub label: &'a str,
}

impl Display for UnresolvedLabel<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}: no type or role is labelled '{}'", self.context, self.label)
    }
}

impl StructuredLog for UnresolvedLabel<'_> {
    fn log(&self) {
        let implicit = self.label.starts_with('@');
        tracing::error!(
            context = self.context,
            label = self.label,
            implicit,
            "{}",
            self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("validation", name = name, label = self.label)
    }
}

/// A rule concludes a type that no configured query or other rule reads.
pub struct UnreachableRule<'a> {
    pub rule: &'a str,
    pub head: &'a str,
}

impl Display for UnreachableRule<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Rule '{}' concludes '{}', which nothing queries; it will never fire",
            self.rule, self.head
        )
    }
}

impl StructuredLog for UnreachableRule<'_> {
    fn log(&self) {
        tracing::warn!(rule = self.rule, head = self.head, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("validation", name = name, rule = self.rule)
    }
}

pub struct ValidationStarted {
    pub type_count: usize,
    pub rule_count: usize,
}

impl Display for ValidationStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Validating schema: {} types, {} rules",
            self.type_count, self.rule_count
        )
    }
}

impl StructuredLog for ValidationStarted {
    fn log(&self) {
        tracing::info!(types = self.type_count, rules = self.rule_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "validation",
            name = name,
            types = self.type_count,
            rules = self.rule_count
        )
    }
}

/// Emitted once every check passed; unreachable rules are counted as warnings.
pub struct ValidationCompleted {
    pub type_count: usize,
    pub rule_count: usize,
    pub warning_count: usize,
}

impl Display for ValidationCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Schema valid: {} types, {} rules",
            self.type_count, self.rule_count
        )?;
        match self.warning_count {
            0 => Ok(()),
            1 => write!(f, " (1 unreachable rule)"),
            n => write!(f, " ({} unreachable rules)", n),
        }
    }
}

impl StructuredLog for ValidationCompleted {
    fn log(&self) {
        if self.warning_count > 0 {
            tracing::warn!(
                types = self.type_count,
                rules = self.rule_count,
                unreachable_rules = self.warning_count,
                "{}",
                self
            );
        } else {
            tracing::info!(types = self.type_count, rules = self.rule_count, "{}", self);
        }
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "validation",
            name = name,
            unreachable_rules = self.warning_count
        )
    }
}

pub struct ValidationFailed {
    pub error_count: usize,
}

impl Display for ValidationFailed {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Schema rejected with {} errors", self.error_count)
    }
}

impl StructuredLog for ValidationFailed {
    fn log(&self) {
        tracing::error!(errors = self.error_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("validation", name = name, errors = self.error_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_read_as_sub_chains() {
        let cycle = ["person", "agent", "person"];
        let msg = CyclicTypeHierarchy { cycle: &cycle };
        assert_eq!(msg.to_string(), "Type hierarchy loops: person sub agent sub person");
    }

    #[test]
    fn completion_mentions_unreachable_rules_only_when_present() {
        let clean = ValidationCompleted {
            type_count: 4,
            rule_count: 1,
            warning_count: 0,
        };
        let noisy = ValidationCompleted {
            warning_count: 2,
            ..clean
        };
        assert_eq!(clean.to_string(), "Schema valid: 4 types, 1 rules");
        assert_eq!(
            noisy.to_string(),
            "Schema valid: 4 types, 1 rules (2 unreachable rules)"
        );
    }
}
