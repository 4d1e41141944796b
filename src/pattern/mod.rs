// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Pattern model consumed by the reasoner core.
//!
//! The query language itself lives outside this crate. What the reasoner needs is a small,
//! concrete vocabulary it can unify, subsume and specialise:
//!
//! * [`Variable`], [`Label`], [`ConceptId`], [`Value`] and [`Concept`] - the leaves
//! * [`ConceptMap`] - one answer, a mapping from variables to concepts
//! * [`Atom`] and [`Predicate`] - the constraints of a query
//! * [`AtomicQuery`] and [`Conjunction`] - what gets cached and what gets resolved
//! * [`Unifier`], [`MultiUnifier`] and [`SemanticDifference`] - how queries relate
//!
//! Variables whose name starts with `_` are anonymous (generated); every other variable
//! is user-defined and survives answer projection.

mod answer;
mod atom;
mod query;
mod unifier;

pub use answer::ConceptMap;
pub use atom::{Atom, Comparator, Predicate, RolePlayer};
pub use query::{AtomicQuery, Conjunction, QueryKey};
pub use unifier::{unify, MultiUnifier, SemanticDifference, Unifier, UnifyMode};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

const IMPLICIT_HAS_PREFIX: &str = "@has-";

/// A query variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variable(String);

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Anonymous variables are generated by the reasoner and never reach the caller.
    pub fn is_user_defined(&self) -> bool {
        !self.0.starts_with('_')
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// A schema label: type, relation, attribute or role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Label of the implicit relation that represents ownership of `attribute`.
    pub fn implicit_has(attribute: &Label) -> Self {
        Self(format!("{}{}", IMPLICIT_HAS_PREFIX, attribute.0))
    }

    pub fn implicit_owner_role(attribute: &Label) -> Self {
        Self(format!("{}{}-owner", IMPLICIT_HAS_PREFIX, attribute.0))
    }

    pub fn implicit_value_role(attribute: &Label) -> Self {
        Self(format!("{}{}-value", IMPLICIT_HAS_PREFIX, attribute.0))
    }

    /// For `@has-age` returns `age`; `None` for any label that is not an implicit relation.
    pub fn implicit_attribute(&self) -> Option<Label> {
        let rest = self.0.strip_prefix(IMPLICIT_HAS_PREFIX)?;
        if rest.ends_with("-owner") || rest.ends_with("-value") {
            return None;
        }
        Some(Label::new(rest))
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptId(String);

impl ConceptId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ConceptId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attribute value. Floating point values are deliberately absent: answers are hashed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Long(i64),
    Boolean(bool),
    String(String),
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Long(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "\"{}\"", v),
        }
    }
}

/// A stored (or transiently inferred) concept.
///
/// Identity is the concept id. `attributes` is the ownership snapshot taken when the concept
/// was read, which is what `has` predicates are checked against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub id: ConceptId,
    pub label: Label,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub attributes: BTreeSet<(Label, Value)>,
}

impl Concept {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: ConceptId::new(id),
            label: Label::new(label),
            value: None,
            attributes: BTreeSet::new(),
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_attribute(mut self, label: impl Into<String>, value: Value) -> Self {
        self.attributes.insert((Label::new(label), value));
        self
    }

    pub fn owns(&self, attribute: &Label, value: &Value) -> bool {
        self.attributes
            .iter()
            .any(|(label, owned)| label == attribute && owned == value)
    }
}

impl PartialEq for Concept {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Concept {}

impl Hash for Concept {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Concept {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Concept {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Display for Concept {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}:{}={}", self.label, self.id, value),
            None => write!(f, "{}:{}", self.label, self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concept_identity_is_the_id() {
        let a = Concept::new("V1", "person").with_attribute("age", Value::Long(30));
        let b = Concept::new("V1", "person");
        assert_eq!(a, b);
        assert!(a.owns(&Label::new("age"), &Value::Long(30)));
        assert!(!b.owns(&Label::new("age"), &Value::Long(30)));
    }

    #[test]
    fn implicit_has_labels_round_trip_to_their_attribute() {
        let age = Label::new("age");
        assert_eq!(Label::implicit_has(&age).implicit_attribute(), Some(age.clone()));
        assert_eq!(Label::implicit_owner_role(&age).implicit_attribute(), None);
        assert_eq!(Label::new("friendship").implicit_attribute(), None);
    }

    #[test]
    fn anonymous_variables_are_not_user_defined() {
        assert!(Variable::new("x").is_user_defined());
        assert!(!Variable::new("_r0").is_user_defined());
    }
}
