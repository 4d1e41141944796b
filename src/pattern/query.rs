// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::unifier::{unify, MultiUnifier, UnifyMode};
use super::{Atom, ConceptId, ConceptMap, Label, Predicate, RolePlayer, Variable};
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{Display, Formatter};

/// Structural key of an atomic query: equal for alpha-equivalent queries.
///
/// Identifier values are not part of the key, so `$x isa person, iid V1` and
/// `$y isa person, iid V2` share a key and are told apart by answer indexing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single central atom plus the predicates constraining its variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtomicQuery {
    pub atom: Atom,
    #[serde(default)]
    pub predicates: BTreeSet<Predicate>,
}

impl AtomicQuery {
    pub fn new(atom: Atom) -> Self {
        Self {
            atom,
            predicates: BTreeSet::new(),
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.insert(predicate);
        self
    }

    /// The schema concept the query is about; queries are grouped into families by it.
    pub fn label(&self) -> Option<&Label> {
        self.atom.label()
    }

    pub fn atom_variables(&self) -> BTreeSet<Variable> {
        self.atom.variables()
    }

    pub fn variables(&self) -> BTreeSet<Variable> {
        let mut variables = self.atom.variables();
        for predicate in &self.predicates {
            variables.extend(predicate.variables().into_iter().cloned());
        }
        variables
    }

    pub fn bound_ids(&self) -> BTreeMap<Variable, ConceptId> {
        self.predicates
            .iter()
            .filter_map(|p| match p {
                Predicate::Id { var, id } => Some((var.clone(), id.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn has_id_predicate(&self) -> bool {
        self.predicates.iter().any(Predicate::is_identifying)
    }

    /// No atom variable is left free.
    pub fn is_ground(&self) -> bool {
        let bound = self.bound_ids();
        self.atom.variables().iter().all(|v| bound.contains_key(v))
    }

    /// Pins every atom variable bound in `bounds` with an identifier predicate.
    pub fn with_bounds(&self, bounds: &ConceptMap) -> AtomicQuery {
        let mut bound = self.clone();
        for variable in self.atom.variables() {
            if let Some(concept) = bounds.get(&variable) {
                bound.predicates.insert(Predicate::Id {
                    var: variable,
                    id: concept.id.clone(),
                });
            }
        }
        bound
    }

    pub fn without_ids(&self) -> AtomicQuery {
        AtomicQuery {
            atom: self.atom.clone(),
            predicates: self
                .predicates
                .iter()
                .filter(|p| !p.is_identifying())
                .cloned()
                .collect(),
        }
    }

    pub fn rename(&self, f: &impl Fn(&Variable) -> Variable) -> AtomicQuery {
        AtomicQuery {
            atom: self.atom.rename(f),
            predicates: self.predicates.iter().map(|p| p.rename(f)).collect(),
        }
    }

    pub fn satisfied_by(&self, answer: &ConceptMap, schema: &Schema) -> bool {
        self.predicates.iter().all(|p| p.evaluate(answer, schema))
    }

    pub fn key(&self) -> QueryKey {
        let atom = self.canonical_atom();
        let mut order = atom.ordered_variables();
        let mut extra: Vec<Variable> = self
            .variables()
            .into_iter()
            .filter(|v| !order.contains(v))
            .collect();
        extra.sort();
        order.extend(extra);
        let names: HashMap<Variable, String> = order
            .iter()
            .enumerate()
            .map(|(i, v)| (v.clone(), format!("v{}", i)))
            .collect();
        let name = |v: &Variable| names.get(v).cloned().unwrap_or_else(|| v.name().to_string());

        let renamed = atom.rename(&|v| Variable::new(name(v)));
        let mut fragments: Vec<String> = self
            .predicates
            .iter()
            .map(|p| p.key_fragment(&name))
            .collect();
        fragments.sort();
        fragments.dedup();
        QueryKey(format!("{}|{}", renamed, fragments.join(",")))
    }

    /// Every way of renaming `self` into the alpha-equivalent `other`.
    pub fn alpha_unifiers(&self, other: &AtomicQuery, schema: &Schema) -> MultiUnifier {
        let target: BTreeSet<String> = other
            .predicates
            .iter()
            .map(|p| p.key_fragment(&|v: &Variable| v.name().to_string()))
            .collect();
        unify(&self.atom, &other.atom, schema, UnifyMode::Exact)
            .into_iter()
            .filter(|u| {
                let renamed: BTreeSet<String> = self
                    .predicates
                    .iter()
                    .map(|p| p.rename(&|v| u.rename(v)))
                    .map(|p| p.key_fragment(&|v: &Variable| v.name().to_string()))
                    .collect();
                renamed == target
            })
            .collect()
    }

    /// Unifiers (parent variables to child variables) under which `self` subsumes `child`:
    /// every answer to `child` is, after renaming, an answer to `self`.
    pub fn subsumption_unifiers(&self, child: &AtomicQuery, schema: &Schema) -> MultiUnifier {
        unify(&self.atom, &child.atom, schema, UnifyMode::Subsumptive)
            .into_iter()
            .filter(|u| {
                self.predicates.iter().all(|parent_predicate| {
                    let renamed = parent_predicate.rename(&|v| u.rename(v));
                    child
                        .predicates
                        .iter()
                        .any(|child_predicate| child_predicate.entails(&renamed, schema))
                })
            })
            .collect()
    }

    pub fn subsumes(&self, child: &AtomicQuery, schema: &Schema) -> bool {
        !self.subsumption_unifiers(child, schema).is_empty()
    }

    /// Role players reordered so that the key does not depend on the order they were written.
    fn canonical_atom(&self) -> Atom {
        match &self.atom {
            Atom::Relation {
                var,
                label,
                role_players,
            } => {
                let mut sorted: Vec<RolePlayer> = role_players.clone();
                sorted.sort_by_cached_key(|rp| {
                    (
                        rp.role.as_ref().map(|r| r.name().to_string()),
                        self.signature(&rp.player),
                    )
                });
                Atom::Relation {
                    var: var.clone(),
                    label: label.clone(),
                    role_players: sorted,
                }
            }
            other => other.clone(),
        }
    }

    /// Name-independent description of the predicates touching `variable`.
    fn signature(&self, variable: &Variable) -> String {
        let mut fragments: Vec<String> = self
            .predicates
            .iter()
            .filter(|p| p.variables().contains(&variable))
            .map(|p| {
                p.key_fragment(&|v: &Variable| {
                    if v == variable {
                        "*".to_string()
                    } else {
                        "_".to_string()
                    }
                })
            })
            .collect();
        fragments.sort();
        fragments.join(",")
    }
}

impl Display for AtomicQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.atom)?;
        for predicate in &self.predicates {
            write!(f, "; {}", predicate)?;
        }
        Ok(())
    }
}

/// A conjunctive query: the body of a rule or a query submitted by a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Conjunction {
    pub atoms: Vec<Atom>,
    #[serde(default)]
    pub predicates: BTreeSet<Predicate>,
    #[serde(default)]
    pub negations: Vec<Conjunction>,
}

impl Conjunction {
    pub fn new(atoms: Vec<Atom>) -> Self {
        Self {
            atoms,
            predicates: BTreeSet::new(),
            negations: Vec::new(),
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.insert(predicate);
        self
    }

    pub fn with_negation(mut self, negation: Conjunction) -> Self {
        self.negations.push(negation);
        self
    }

    /// Variables bound by the positive part of the conjunction.
    pub fn variables(&self) -> BTreeSet<Variable> {
        let mut variables: BTreeSet<Variable> =
            self.atoms.iter().flat_map(|a| a.variables()).collect();
        for predicate in &self.predicates {
            variables.extend(predicate.variables().into_iter().cloned());
        }
        variables
    }

    /// One atomic query per atom, carrying the predicates that only mention its variables.
    pub fn atomic_queries(&self) -> Vec<AtomicQuery> {
        self.atoms
            .iter()
            .map(|atom| {
                let scope = atom.variables();
                AtomicQuery {
                    atom: atom.clone(),
                    predicates: self
                        .predicates
                        .iter()
                        .filter(|p| p.variables().iter().all(|v| scope.contains(*v)))
                        .cloned()
                        .collect(),
                }
            })
            .collect()
    }

    pub fn has_negation(&self) -> bool {
        !self.negations.is_empty()
    }

    pub fn labels(&self) -> BTreeSet<Label> {
        self.atoms.iter().filter_map(|a| a.label().cloned()).collect()
    }

    pub fn negated_labels(&self) -> BTreeSet<Label> {
        self.negations.iter().flat_map(|n| n.labels()).collect()
    }

    pub fn negated_queries(&self) -> Vec<AtomicQuery> {
        self.negations
            .iter()
            .flat_map(|n| n.atomic_queries())
            .collect()
    }

    pub fn with_bounds(&self, bounds: &ConceptMap) -> Conjunction {
        let mut bound = self.clone();
        for variable in self.variables() {
            if let Some(concept) = bounds.get(&variable) {
                bound.predicates.insert(Predicate::Id {
                    var: variable,
                    id: concept.id.clone(),
                });
            }
        }
        bound
    }

    pub fn rename(&self, f: &impl Fn(&Variable) -> Variable) -> Conjunction {
        Conjunction {
            atoms: self.atoms.iter().map(|a| a.rename(f)).collect(),
            predicates: self.predicates.iter().map(|p| p.rename(f)).collect(),
            negations: self.negations.iter().map(|n| n.rename(f)).collect(),
        }
    }

    pub fn satisfied_by(&self, answer: &ConceptMap, schema: &Schema) -> bool {
        self.predicates.iter().all(|p| p.evaluate(answer, schema))
    }

    /// Identity of the conjunction as written; used to key conjunction controllers.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl Display for Conjunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for atom in &self.atoms {
            write!(f, " {};", atom)?;
        }
        for predicate in &self.predicates {
            write!(f, " {};", predicate)?;
        }
        for negation in &self.negations {
            write!(f, " not {};", negation)?;
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Comparator, Concept, Value};
    use crate::schema::{Schema, TypeKind};

    fn schema() -> Schema {
        Schema::default()
            .with_type("person", TypeKind::Entity, None)
            .with_type("friendship", TypeKind::Relation, None)
            .with_type("friend", TypeKind::Role, None)
            .with_type("age", TypeKind::Attribute, None)
    }

    fn friendship(r: &str, x: &str, y: &str) -> AtomicQuery {
        AtomicQuery::new(Atom::relation(
            r,
            "friendship",
            vec![RolePlayer::new(Some("friend"), x), RolePlayer::new(Some("friend"), y)],
        ))
    }

    #[test]
    fn alpha_equivalent_queries_share_a_key() {
        let a = friendship("r", "x", "y").with_predicate(Predicate::id("x", "V1"));
        let b = friendship("q", "b", "a").with_predicate(Predicate::id("a", "V2"));
        assert_eq!(a.key(), b.key());

        let c = friendship("r", "x", "y").with_predicate(Predicate::value(
            "x",
            Comparator::Eq,
            Value::Long(1),
        ));
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn symmetric_relation_has_two_alpha_unifiers() {
        let a = friendship("r", "x", "y");
        let b = friendship("q", "a", "b");
        assert_eq!(a.alpha_unifiers(&b, &schema()).len(), 2);
    }

    #[test]
    fn id_bound_query_is_subsumed_by_the_unbound_one() {
        let schema = schema();
        let parent = AtomicQuery::new(Atom::isa("x", "person"));
        let child =
            AtomicQuery::new(Atom::isa("y", "person")).with_predicate(Predicate::id("y", "V1"));
        assert!(parent.subsumes(&child, &schema));
        assert!(!child.subsumes(&parent, &schema));
    }

    #[test]
    fn value_predicates_subsume_by_entailment() {
        let schema = schema();
        let parent = AtomicQuery::new(Atom::isa("x", "age")).with_predicate(Predicate::value(
            "x",
            Comparator::Gt,
            Value::Long(18),
        ));
        let child = AtomicQuery::new(Atom::isa("x", "age")).with_predicate(Predicate::value(
            "x",
            Comparator::Eq,
            Value::Long(30),
        ));
        assert!(parent.subsumes(&child, &schema));
        assert!(!child.subsumes(&parent, &schema));
    }

    #[test]
    fn ground_queries_bind_every_atom_variable() {
        let query = AtomicQuery::new(Atom::isa("x", "person"));
        let bounds = ConceptMap::new().with(Variable::new("x"), Concept::new("V1", "person"));
        assert!(!query.is_ground());
        assert!(query.with_bounds(&bounds).is_ground());
        assert!(!query.with_bounds(&bounds).without_ids().is_ground());
    }

    #[test]
    fn conjunction_splits_predicates_by_atom_scope() {
        let body = Conjunction::new(vec![Atom::isa("x", "person"), Atom::has("x", "a", "age")])
            .with_predicate(Predicate::value("a", Comparator::Gt, Value::Long(18)));
        let queries = body.atomic_queries();
        assert_eq!(queries.len(), 2);
        assert!(queries[0].predicates.is_empty());
        assert_eq!(queries[1].predicates.len(), 1);
    }
}
