// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Schema and storage collaborators.
//!
//! [`Schema`] answers type-hierarchy questions (`sups`, `subs`, `is_subtype`) and carries the
//! persisted rule definitions. [`Storage`] is the raw, uncached evaluation of atomic queries
//! that the semantic cache sits in front of; [`InMemoryGraph`] implements it for the binary
//! and for tests.

mod storage;

pub use storage::{InMemoryGraph, Storage};

use crate::pattern::{AtomicQuery, Conjunction, Label};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const IMPLICIT_OWNER_SUFFIX: &str = "-owner";
const IMPLICIT_VALUE_SUFFIX: &str = "-value";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Entity,
    Relation,
    Attribute,
    Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub label: Label,
    pub kind: TypeKind,
    #[serde(default)]
    pub sup: Option<Label>,
}

/// A persisted rule: `when` the body holds, `then` the head holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub label: String,
    pub when: Conjunction,
    pub then: AtomicQuery,
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: BTreeMap<Label, TypeDefinition>,
    rules: Vec<RuleDefinition>,
}

impl Schema {
    pub fn new(types: Vec<TypeDefinition>, rules: Vec<RuleDefinition>) -> Self {
        Self {
            types: types.into_iter().map(|t| (t.label.clone(), t)).collect(),
            rules,
        }
    }

    pub fn with_type(mut self, label: &str, kind: TypeKind, sup: Option<&str>) -> Self {
        let label = Label::new(label);
        self.types.insert(
            label.clone(),
            TypeDefinition {
                label,
                kind,
                sup: sup.map(Label::new),
            },
        );
        self
    }

    pub fn with_rule(mut self, rule: RuleDefinition) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[RuleDefinition] {
        &self.rules
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.values()
    }

    /// Defined labels, plus the implicit ownership relation and roles of every attribute type.
    pub fn contains(&self, label: &Label) -> bool {
        self.types.contains_key(label) || self.implicit_kind(label).is_some()
    }

    pub fn kind(&self, label: &Label) -> Option<TypeKind> {
        self.types
            .get(label)
            .map(|t| t.kind)
            .or_else(|| self.implicit_kind(label))
    }

    pub fn sup(&self, label: &Label) -> Option<&Label> {
        self.types.get(label).and_then(|t| t.sup.as_ref())
    }

    /// Ancestors of `label`, nearest first, `label` itself excluded.
    pub fn sups(&self, label: &Label) -> Vec<Label> {
        let mut ancestors = Vec::new();
        let mut current = self.sup(label);
        while let Some(sup) = current {
            if sup == label || ancestors.contains(sup) {
                break;
            }
            ancestors.push(sup.clone());
            current = self.sup(sup);
        }
        ancestors
    }

    /// `label` and every type that transitively specialises it.
    pub fn subs(&self, label: &Label) -> BTreeSet<Label> {
        let mut descendants = BTreeSet::from([label.clone()]);
        let mut frontier = vec![label.clone()];
        while let Some(current) = frontier.pop() {
            for definition in self.types.values() {
                if definition.sup.as_ref() == Some(&current)
                    && descendants.insert(definition.label.clone())
                {
                    frontier.push(definition.label.clone());
                }
            }
        }
        descendants
    }

    /// Reflexive subtype check.
    pub fn is_subtype(&self, sub: &Label, sup: &Label) -> bool {
        sub == sup || self.sups(sub).contains(sup)
    }

    fn implicit_kind(&self, label: &Label) -> Option<TypeKind> {
        if let Some(attribute) = label.implicit_attribute() {
            return self.is_attribute(&attribute).then_some(TypeKind::Relation);
        }
        let rest = label.name().strip_prefix("@has-")?;
        let attribute = rest
            .strip_suffix(IMPLICIT_OWNER_SUFFIX)
            .or_else(|| rest.strip_suffix(IMPLICIT_VALUE_SUFFIX))?;
        self.is_attribute(&Label::new(attribute))
            .then_some(TypeKind::Role)
    }

    fn is_attribute(&self, label: &Label) -> bool {
        self.types
            .get(label)
            .is_some_and(|t| t.kind == TypeKind::Attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::default()
            .with_type("person", TypeKind::Entity, None)
            .with_type("employee", TypeKind::Entity, Some("person"))
            .with_type("manager", TypeKind::Entity, Some("employee"))
            .with_type("age", TypeKind::Attribute, None)
    }

    #[test]
    fn sups_walk_nearest_first() {
        let schema = schema();
        assert_eq!(
            schema.sups(&Label::new("manager")),
            vec![Label::new("employee"), Label::new("person")]
        );
        assert!(schema.sups(&Label::new("person")).is_empty());
    }

    #[test]
    fn subs_include_the_type_itself() {
        let subs = schema().subs(&Label::new("employee"));
        assert_eq!(subs.len(), 2);
        assert!(subs.contains(&Label::new("employee")));
        assert!(subs.contains(&Label::new("manager")));
    }

    #[test]
    fn subtyping_is_reflexive_and_transitive() {
        let schema = schema();
        assert!(schema.is_subtype(&Label::new("manager"), &Label::new("person")));
        assert!(schema.is_subtype(&Label::new("person"), &Label::new("person")));
        assert!(!schema.is_subtype(&Label::new("person"), &Label::new("manager")));
    }

    #[test]
    fn attribute_types_carry_implicit_ownership_labels() {
        let schema = schema();
        let age = Label::new("age");
        assert_eq!(schema.kind(&Label::implicit_has(&age)), Some(TypeKind::Relation));
        assert_eq!(schema.kind(&Label::implicit_owner_role(&age)), Some(TypeKind::Role));
        assert!(!schema.contains(&Label::implicit_has(&Label::new("person"))));
    }

    #[test]
    fn cyclic_hierarchy_does_not_hang() {
        let schema = Schema::default()
            .with_type("a", TypeKind::Entity, Some("b"))
            .with_type("b", TypeKind::Entity, Some("a"));
        assert_eq!(schema.sups(&Label::new("a")), vec![Label::new("b")]);
    }
}
