// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

/// Errors that can occur while validating a reasoner configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The type hierarchy loops back on itself
    CyclicTypeHierarchy {
        /// The cycle path through `sup` links
        cycle: Vec<String>,
    },
    /// A type, role or rule references a label that is not defined
    UnknownLabel {
        /// Where the reference was found
        context: String,
        /// The label that couldn't be resolved
        label: String,
    },
    /// Two type definitions share a label
    DuplicateLabel { label: String },
    /// Two rules share a label
    DuplicateRule { rule: String },
    /// A rule definition could not be turned into an inference rule
    InvalidRule { rule: String, reason: String },
    /// Data references a concept id that is not defined
    UnknownConcept { context: String, id: String },
    /// Two data concepts share an id
    DuplicateConcept { id: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::CyclicTypeHierarchy { cycle } => {
                write!(f, "Cyclic type hierarchy detected: {}", cycle.join(" -> "))
            }
            ValidationError::UnknownLabel { context, label } => {
                write!(f, "{} references '{}' which does not exist", context, label)
            }
            ValidationError::DuplicateLabel { label } => {
                write!(f, "Duplicate type label: '{}'", label)
            }
            ValidationError::DuplicateRule { rule } => {
                write!(f, "Duplicate rule label: '{}'", rule)
            }
            ValidationError::InvalidRule { rule, reason } => {
                write!(f, "Rule '{}' is invalid: {}", rule, reason)
            }
            ValidationError::UnknownConcept { context, id } => {
                write!(f, "{} references concept '{}' which does not exist", context, id)
            }
            ValidationError::DuplicateConcept { id } => {
                write!(f, "Duplicate concept id: '{}'", id)
            }
        }
    }
}

impl std::error::Error for ValidationError {}
