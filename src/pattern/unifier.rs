// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{Atom, AtomicQuery, ConceptMap, Label, Predicate, RolePlayer, Variable};
use crate::schema::Schema;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

/// How two atoms are allowed to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnifyMode {
    /// Rule head (from) onto a parent query (to). The head may be more specific than the
    /// parent and may carry role players the parent does not mention.
    Rule,
    /// Alpha-equivalence: a bijective renaming with identical labels and roles.
    Exact,
    /// A general query (from) onto a more specific one (to) of the same shape.
    Subsumptive,
}

/// A variable renaming `from -> to`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Unifier {
    mapping: BTreeMap<Variable, Variable>,
}

impl Unifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity<'a>(variables: impl IntoIterator<Item = &'a Variable>) -> Self {
        Self {
            mapping: variables
                .into_iter()
                .map(|v| (v.clone(), v.clone()))
                .collect(),
        }
    }

    /// Adds `from -> to`, returning `false` when it contradicts an existing mapping. With
    /// `injective` set, two sources may not share a target either.
    pub fn insert(&mut self, from: Variable, to: Variable, injective: bool) -> bool {
        if let Some(existing) = self.mapping.get(&from) {
            return existing == &to;
        }
        if injective && self.mapping.values().any(|v| v == &to) {
            return false;
        }
        self.mapping.insert(from, to);
        true
    }

    pub fn get(&self, from: &Variable) -> Option<&Variable> {
        self.mapping.get(from)
    }

    /// The target of `variable`, or the variable itself when it is not mapped.
    pub fn rename(&self, variable: &Variable) -> Variable {
        self.mapping
            .get(variable)
            .cloned()
            .unwrap_or_else(|| variable.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Variable)> {
        self.mapping.iter()
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    pub fn domain(&self) -> BTreeSet<Variable> {
        self.mapping.keys().cloned().collect()
    }

    pub fn codomain(&self) -> BTreeSet<Variable> {
        self.mapping.values().cloned().collect()
    }

    /// `to -> from`. When several sources share a target the smallest source wins.
    pub fn inverse(&self) -> Unifier {
        let mut mapping = BTreeMap::new();
        for (from, to) in &self.mapping {
            mapping.entry(to.clone()).or_insert_with(|| from.clone());
        }
        Unifier { mapping }
    }

    /// Renames an answer over `from` variables into one over `to` variables. Unmapped
    /// variables are dropped. `None` when two sources map to the same target with
    /// different concepts.
    pub fn apply_to_answer(&self, answer: &ConceptMap) -> Option<ConceptMap> {
        let mut renamed = ConceptMap::new().inferred(answer.is_inferred());
        for (from, to) in &self.mapping {
            if let Some(concept) = answer.get(from) {
                match renamed.get(to) {
                    Some(existing) if existing != concept => return None,
                    Some(_) => {}
                    None => {
                        renamed.insert(to.clone(), concept.clone());
                    }
                }
            }
        }
        Some(renamed)
    }

    /// Carries bounds over `to` variables back onto every `from` variable mapped to them.
    pub fn invert_answer(&self, bounds: &ConceptMap) -> ConceptMap {
        let mut inverted = ConceptMap::new().inferred(bounds.is_inferred());
        for (from, to) in &self.mapping {
            if let Some(concept) = bounds.get(to) {
                inverted.insert(from.clone(), concept.clone());
            }
        }
        inverted
    }

    /// `self` followed by `next`.
    pub fn compose(&self, next: &Unifier) -> Unifier {
        Unifier {
            mapping: self
                .mapping
                .iter()
                .map(|(from, to)| (from.clone(), next.rename(to)))
                .collect(),
        }
    }
}

impl Display for Unifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, (from, to)) in self.mapping.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}->{}", from, to)?;
        }
        write!(f, "]")
    }
}

/// The set of all unifiers between two atoms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiUnifier {
    unifiers: BTreeSet<Unifier>,
}

impl MultiUnifier {
    pub fn insert(&mut self, unifier: Unifier) -> bool {
        self.unifiers.insert(unifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Unifier> {
        self.unifiers.iter()
    }

    pub fn len(&self) -> usize {
        self.unifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unifiers.is_empty()
    }
}

impl IntoIterator for MultiUnifier {
    type Item = Unifier;
    type IntoIter = std::collections::btree_set::IntoIter<Unifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.unifiers.into_iter()
    }
}

impl FromIterator<Unifier> for MultiUnifier {
    fn from_iter<T: IntoIterator<Item = Unifier>>(iter: T) -> Self {
        Self {
            unifiers: iter.into_iter().collect(),
        }
    }
}

/// Computes every unifier from `from` onto `to` permitted by `mode`.
///
/// Atoms only unify with atoms of the same shape. Labels are compared against the schema:
/// in [`UnifyMode::Rule`] the head label must be a subtype of the parent's, in
/// [`UnifyMode::Subsumptive`] the specific (to) label must be a subtype of the general one,
/// and [`UnifyMode::Exact`] demands equal labels. A missing label on the receiving side
/// matches anything.
pub fn unify(from: &Atom, to: &Atom, schema: &Schema, mode: UnifyMode) -> MultiUnifier {
    let mut unifiers = MultiUnifier::default();
    if !labels_compatible(from.label(), to.label(), schema, mode) {
        return unifiers;
    }
    let injective = mode != UnifyMode::Rule;
    match (from, to) {
        (Atom::Isa { var: f, .. }, Atom::Isa { var: t, .. }) => {
            let mut unifier = Unifier::new();
            unifier.insert(f.clone(), t.clone(), injective);
            unifiers.insert(unifier);
        }
        (
            Atom::Has {
                owner: fo,
                attribute: fa,
                ..
            },
            Atom::Has {
                owner: to_owner,
                attribute: ta,
                ..
            },
        ) => {
            let mut unifier = Unifier::new();
            if unifier.insert(fo.clone(), to_owner.clone(), injective)
                && unifier.insert(fa.clone(), ta.clone(), injective)
            {
                unifiers.insert(unifier);
            }
        }
        (
            Atom::Relation {
                var: fv,
                role_players: frps,
                ..
            },
            Atom::Relation {
                var: tv,
                role_players: trps,
                ..
            },
        ) => {
            if mode != UnifyMode::Rule && frps.len() != trps.len() {
                return unifiers;
            }
            if trps.len() > frps.len() {
                return unifiers;
            }
            let mut base = Unifier::new();
            if !base.insert(fv.clone(), tv.clone(), injective) {
                return unifiers;
            }
            let mut used = vec![false; frps.len()];
            match_role_players(frps, trps, 0, &mut used, base, schema, mode, &mut unifiers);
        }
        _ => {}
    }
    unifiers
}

fn labels_compatible(
    from: Option<&Label>,
    to: Option<&Label>,
    schema: &Schema,
    mode: UnifyMode,
) -> bool {
    match mode {
        UnifyMode::Exact => from == to,
        UnifyMode::Rule => match (from, to) {
            (_, None) => true,
            (Some(head), Some(parent)) => schema.is_subtype(head, parent),
            (None, Some(_)) => false,
        },
        UnifyMode::Subsumptive => match (from, to) {
            (None, _) => true,
            (Some(general), Some(specific)) => schema.is_subtype(specific, general),
            (Some(_), None) => false,
        },
    }
}

fn roles_compatible(from: &RolePlayer, to: &RolePlayer, schema: &Schema, mode: UnifyMode) -> bool {
    match mode {
        UnifyMode::Exact | UnifyMode::Subsumptive => from.role == to.role,
        UnifyMode::Rule => match (&from.role, &to.role) {
            (_, None) => true,
            (Some(head), Some(parent)) => schema.is_subtype(head, parent),
            (None, Some(_)) => false,
        },
    }
}

/// Assigns a distinct `from` role player to each `to` role player, backtracking over choices.
#[allow(clippy::too_many_arguments)]
fn match_role_players(
    from: &[RolePlayer],
    to: &[RolePlayer],
    index: usize,
    used: &mut [bool],
    unifier: Unifier,
    schema: &Schema,
    mode: UnifyMode,
    out: &mut MultiUnifier,
) {
    if index == to.len() {
        out.insert(unifier);
        return;
    }
    let target = &to[index];
    for (j, candidate) in from.iter().enumerate() {
        if used[j] || !roles_compatible(candidate, target, schema, mode) {
            continue;
        }
        let mut extended = unifier.clone();
        if !extended.insert(
            candidate.player.clone(),
            target.player.clone(),
            mode != UnifyMode::Rule,
        ) {
            continue;
        }
        used[j] = true;
        match_role_players(from, to, index + 1, used, extended, schema, mode, out);
        used[j] = false;
    }
}

/// What a child query asks for beyond what its parent guarantees, expressed over the
/// child's variables. Parent answers that pass [`SemanticDifference::apply`] are answers
/// to the child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SemanticDifference {
    predicates: BTreeSet<Predicate>,
}

impl SemanticDifference {
    /// `unifier` renames parent variables into child variables.
    pub fn between(
        parent: &AtomicQuery,
        child: &AtomicQuery,
        unifier: &Unifier,
        schema: &Schema,
    ) -> Self {
        let guaranteed: Vec<Predicate> = parent
            .predicates
            .iter()
            .map(|p| p.rename(&|v| unifier.rename(v)))
            .collect();
        let mut predicates: BTreeSet<Predicate> = child
            .predicates
            .iter()
            .filter(|c| !guaranteed.iter().any(|g| g.entails(c, schema)))
            .cloned()
            .collect();
        if parent.label() != child.label() {
            if let Some(label) = child.label() {
                predicates.insert(Predicate::Type {
                    var: child.atom.central_variable().clone(),
                    label: label.clone(),
                });
            }
        }
        Self { predicates }
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn predicates(&self) -> &BTreeSet<Predicate> {
        &self.predicates
    }

    pub fn apply(&self, answer: &ConceptMap, schema: &Schema) -> bool {
        self.predicates.iter().all(|p| p.evaluate(answer, schema))
    }
}
