// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{Concept, ConceptId, Variable};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

/// One answer: an assignment of concepts to variables.
///
/// The `inferred` flag records whether any rule took part in producing the answer. It is
/// not part of answer identity, so an answer found both in storage and by a rule is still
/// one answer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConceptMap {
    map: BTreeMap<Variable, Concept>,
    #[serde(skip)]
    inferred: bool,
}

impl ConceptMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, variable: Variable, concept: Concept) -> Self {
        self.map.insert(variable, concept);
        self
    }

    pub fn insert(&mut self, variable: Variable, concept: Concept) -> Option<Concept> {
        self.map.insert(variable, concept)
    }

    pub fn get(&self, variable: &Variable) -> Option<&Concept> {
        self.map.get(variable)
    }

    pub fn contains(&self, variable: &Variable) -> bool {
        self.map.contains_key(variable)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Concept)> {
        self.map.iter()
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.map.keys()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn is_inferred(&self) -> bool {
        self.inferred
    }

    pub fn inferred(mut self, inferred: bool) -> Self {
        self.inferred = inferred;
        self
    }

    /// True when every variable in `variables` has a concept.
    pub fn covers<'a>(&self, variables: impl IntoIterator<Item = &'a Variable>) -> bool {
        variables.into_iter().all(|v| self.map.contains_key(v))
    }

    /// Restricts the answer to `variables`, keeping the inferred flag.
    pub fn project(&self, variables: &BTreeSet<Variable>) -> ConceptMap {
        ConceptMap {
            map: self
                .map
                .iter()
                .filter(|(v, _)| variables.contains(*v))
                .map(|(v, c)| (v.clone(), c.clone()))
                .collect(),
            inferred: self.inferred,
        }
    }

    /// Drops anonymous variables.
    pub fn user_defined(&self) -> ConceptMap {
        ConceptMap {
            map: self
                .map
                .iter()
                .filter(|(v, _)| v.is_user_defined())
                .map(|(v, c)| (v.clone(), c.clone()))
                .collect(),
            inferred: self.inferred,
        }
    }

    /// Joins two answers; `None` when they disagree on a shared variable.
    pub fn merge(&self, other: &ConceptMap) -> Option<ConceptMap> {
        let mut merged = self.clone();
        for (variable, concept) in &other.map {
            match merged.map.get(variable) {
                Some(existing) if existing != concept => return None,
                Some(_) => {}
                None => {
                    merged.map.insert(variable.clone(), concept.clone());
                }
            }
        }
        merged.inferred = self.inferred || other.inferred;
        Some(merged)
    }

    pub fn ids(&self) -> BTreeMap<Variable, ConceptId> {
        self.map
            .iter()
            .map(|(v, c)| (v.clone(), c.id.clone()))
            .collect()
    }
}

impl PartialEq for ConceptMap {
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl Eq for ConceptMap {}

impl Hash for ConceptMap {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.map.hash(state);
    }
}

impl FromIterator<(Variable, Concept)> for ConceptMap {
    fn from_iter<T: IntoIterator<Item = (Variable, Concept)>>(iter: T) -> Self {
        Self {
            map: iter.into_iter().collect(),
            inferred: false,
        }
    }
}

impl Display for ConceptMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (variable, concept)) in self.map.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", variable, concept)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Variable {
        Variable::new(name)
    }

    #[test]
    fn inferred_flag_is_not_part_of_identity() {
        let stored = ConceptMap::new().with(var("x"), Concept::new("V1", "person"));
        let derived = stored.clone().inferred(true);
        assert_eq!(stored, derived);
        assert!(derived.is_inferred());
    }

    #[test]
    fn merge_rejects_conflicting_bindings() {
        let left = ConceptMap::new().with(var("x"), Concept::new("V1", "person"));
        let agreeing = ConceptMap::new()
            .with(var("x"), Concept::new("V1", "person"))
            .with(var("y"), Concept::new("V2", "person"));
        let conflicting = ConceptMap::new().with(var("x"), Concept::new("V9", "person"));

        let merged = left.merge(&agreeing).expect("answers agree on $x");
        assert_eq!(merged.len(), 2);
        assert!(left.merge(&conflicting).is_none());
    }

    #[test]
    fn user_defined_drops_anonymous_variables() {
        let answer = ConceptMap::new()
            .with(var("x"), Concept::new("V1", "person"))
            .with(var("_r"), Concept::new("R1", "friendship"));
        let projected = answer.user_defined();
        assert!(projected.contains(&var("x")));
        assert!(!projected.contains(&var("_r")));
    }
}
