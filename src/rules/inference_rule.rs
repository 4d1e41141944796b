// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::RuleSet;
use crate::errors::{RuleError, StorageError};
use crate::pattern::{
    unify, Atom, AtomicQuery, Concept, ConceptId, ConceptMap, Conjunction, Label, MultiUnifier,
    Predicate, RolePlayer, Unifier, UnifyMode, Variable,
};
use crate::schema::{RuleDefinition, Schema, Storage};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::sync::{Arc, OnceLock};

/// Static firing order of a rule. Lower fires first.
///
/// `depth` is the length of the longest chain of rules feeding this rule's body, measured
/// on the rule dependency graph with recursive groups collapsed. Rules resolvable from stored
/// data alone sit at depth zero. Ties go to the rule whose head type has more ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionPriority {
    pub depth: usize,
    pub ancestors: usize,
}

impl Ord for ResolutionPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.depth
            .cmp(&other.depth)
            .then_with(|| other.ancestors.cmp(&self.ancestors))
    }
}

impl PartialOrd for ResolutionPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One application of a rule against a parent query: the entry point for resolving the
/// rule as a dataflow subgraph.
#[derive(Debug, Clone)]
pub struct ResolutionState {
    /// The rule after rewriting and constraint propagation.
    pub rule: Arc<InferenceRule>,
    /// Head variables to parent variables.
    pub unifier: Unifier,
    /// Parent bounds carried over to head variables.
    pub head_bounds: ConceptMap,
    pub materialise: bool,
}

/// A rule made ready for resolution: body conjunction, head query and memoised derived
/// fields. Rewrites return new rules; a rule is never mutated after construction.
#[derive(Debug, Clone)]
pub struct InferenceRule {
    label: String,
    body: Conjunction,
    head: AtomicQuery,
    priority: OnceLock<ResolutionPriority>,
    conclusion_atom: OnceLock<Atom>,
    materialised_head: OnceLock<bool>,
}

impl InferenceRule {
    /// Validates `definition` against `schema`.
    pub fn new(definition: &RuleDefinition, schema: &Schema) -> Result<Self, RuleError> {
        let rule = Self::from_parts(
            definition.label.clone(),
            definition.when.clone(),
            definition.then.clone(),
        );
        rule.validate(schema)?;
        Ok(rule)
    }

    fn from_parts(label: String, body: Conjunction, head: AtomicQuery) -> Self {
        Self {
            label,
            body,
            head,
            priority: OnceLock::new(),
            conclusion_atom: OnceLock::new(),
            materialised_head: OnceLock::new(),
        }
    }

    /// Same rule identity and priority with a new body/head.
    fn derive(&self, body: Conjunction, head: AtomicQuery) -> Self {
        let derived = Self::from_parts(self.label.clone(), body, head);
        if let Some(priority) = self.priority.get() {
            let _ = derived.priority.set(*priority);
        }
        derived
    }

    fn validate(&self, schema: &Schema) -> Result<(), RuleError> {
        let rule = self.label.clone();
        if self.body.atoms.is_empty() {
            return Err(RuleError::EmptyBody { rule });
        }
        let head_label = match &self.head.atom {
            Atom::Relation { label, .. } | Atom::Has { label, .. } => label.clone(),
            Atom::Isa { .. } => {
                return Err(RuleError::UnsupportedHead {
                    rule,
                    head: self.head.to_string(),
                })
            }
        };
        if head_label.is_none() {
            return Err(RuleError::UntypedHead { rule });
        }
        if let Atom::Relation { role_players, .. } = &self.head.atom {
            if role_players.iter().any(|rp| rp.role.is_none()) {
                return Err(RuleError::UntypedHead { rule });
            }
        }

        for label in self.referenced_labels() {
            if !schema.contains(&label) {
                return Err(RuleError::UnknownLabel {
                    rule,
                    label: label.to_string(),
                });
            }
        }

        let body_variables = self.body.variables();
        let pinned = self.head.bound_ids();
        let instance = match &self.head.atom {
            Atom::Relation { var, .. } => Some(var),
            _ => None,
        };
        for variable in self.head.atom.variables() {
            let bound = body_variables.contains(&variable)
                || pinned.contains_key(&variable)
                || Some(&variable) == instance;
            if !bound {
                return Err(RuleError::UnboundHeadVariable {
                    rule,
                    variable: variable.to_string(),
                });
            }
        }
        Ok(())
    }

    fn referenced_labels(&self) -> Vec<Label> {
        let mut labels: Vec<Label> = Vec::new();
        let mut atoms: Vec<&Atom> = self.body.atoms.iter().collect();
        atoms.extend(self.body.negations.iter().flat_map(|n| n.atoms.iter()));
        atoms.push(&self.head.atom);
        for atom in atoms {
            labels.extend(atom.label().cloned());
            if let Atom::Relation { role_players, .. } = atom {
                labels.extend(role_players.iter().filter_map(|rp| rp.role.clone()));
            }
        }
        let predicates = self
            .body
            .predicates
            .iter()
            .chain(self.head.predicates.iter());
        for predicate in predicates {
            match predicate {
                Predicate::Type { label, .. } => labels.push(label.clone()),
                Predicate::Has { attribute, .. } => labels.push(attribute.clone()),
                _ => {}
            }
        }
        labels
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn body(&self) -> &Conjunction {
        &self.body
    }

    pub fn head(&self) -> &AtomicQuery {
        &self.head
    }

    pub fn head_variables(&self) -> BTreeSet<Variable> {
        self.head.variables()
    }

    pub fn body_variables(&self) -> BTreeSet<Variable> {
        self.body.variables()
    }

    /// Types the body reads, negated ones included.
    pub fn when_types(&self) -> BTreeSet<Label> {
        let mut types = self.body.labels();
        types.extend(self.body.negated_labels());
        types
    }

    pub fn then_types(&self) -> BTreeSet<Label> {
        self.head.label().cloned().into_iter().collect()
    }

    /// Head and body share no variable.
    pub fn has_disconnected_head(&self) -> bool {
        self.head_variables().is_disjoint(&self.body_variables())
    }

    /// The head atom unification runs against. Heads are validated to be typed, so this is
    /// the head atom with its label and role types made explicit.
    pub fn conclusion_atom(&self) -> &Atom {
        self.conclusion_atom.get_or_init(|| self.head.atom.clone())
    }

    pub fn resolution_priority(&self, rules: &RuleSet) -> ResolutionPriority {
        *self.priority.get_or_init(|| rules.compute_priority(self))
    }

    pub fn requires_materialisation(&self, parent: &Atom) -> bool {
        let head = *self.materialised_head.get_or_init(|| {
            self.has_disconnected_head() || self.conclusion_atom().requires_materialisation()
        });
        head || parent.requires_materialisation()
    }

    /// Every unifier from the conclusion onto `parent`. An untyped parent first takes the
    /// conclusion's type.
    pub fn get_multi_unifier(&self, parent: &Atom, schema: &Schema) -> MultiUnifier {
        let conclusion = self.conclusion_atom();
        let typed_parent = match (parent.label(), conclusion.label()) {
            (None, Some(label)) => parent.with_label(label.clone()),
            _ => parent.clone(),
        };
        unify(conclusion, &typed_parent, schema, UnifyMode::Rule)
    }

    /// Applies the three rewrites in order: body normalisation, attribute head to implicit
    /// ownership relation, anonymous head variables to user-defined names.
    pub fn rewrite(&self, parent: &Atom, schema: &Schema) -> InferenceRule {
        self.rewrite_body(schema)
            .rewrite_attribute_head(parent)
            .rewrite_head_variables(parent)
    }

    fn rewrite_body(&self, schema: &Schema) -> InferenceRule {
        let mut atoms: Vec<Atom> = Vec::with_capacity(self.body.atoms.len());
        for atom in &self.body.atoms {
            if !atoms.contains(atom) {
                atoms.push(atom.clone());
            }
        }
        let typed: BTreeMap<&Variable, &Label> = atoms
            .iter()
            .filter_map(|atom| match atom {
                Atom::Isa {
                    var,
                    label: Some(label),
                } => Some((var, label)),
                _ => None,
            })
            .collect();
        let predicates: BTreeSet<Predicate> = self
            .body
            .predicates
            .iter()
            .filter(|p| match p {
                Predicate::Type { var, label } => typed
                    .get(var)
                    .map_or(true, |actual| !schema.is_subtype(actual, label)),
                _ => true,
            })
            .cloned()
            .collect();
        if atoms.len() == self.body.atoms.len() && predicates.len() == self.body.predicates.len() {
            return self.clone();
        }
        let body = Conjunction {
            atoms,
            predicates,
            negations: self.body.negations.clone(),
        };
        self.derive(body, self.head.clone())
    }

    fn rewrite_attribute_head(&self, parent: &Atom) -> InferenceRule {
        let Atom::Has {
            owner,
            attribute,
            label: Some(attribute_label),
        } = &self.head.atom
        else {
            return self.clone();
        };
        let Atom::Relation {
            label: Some(parent_label),
            ..
        } = parent
        else {
            return self.clone();
        };
        if parent_label.implicit_attribute().is_none() {
            return self.clone();
        }
        let atom = Atom::Relation {
            var: Variable::new("_has"),
            label: Some(Label::implicit_has(attribute_label)),
            role_players: vec![
                RolePlayer {
                    role: Some(Label::implicit_owner_role(attribute_label)),
                    player: owner.clone(),
                },
                RolePlayer {
                    role: Some(Label::implicit_value_role(attribute_label)),
                    player: attribute.clone(),
                },
            ],
        };
        let head = AtomicQuery {
            atom,
            predicates: self.head.predicates.clone(),
        };
        self.derive(self.body.clone(), head)
    }

    fn rewrite_head_variables(&self, parent: &Atom) -> InferenceRule {
        let parent_named = match parent {
            Atom::Relation { var, .. } => var.is_user_defined(),
            _ => false,
        };
        if !parent_named && !parent.requires_role_expansion() {
            return self.clone();
        }
        let body_variables = self.body_variables();
        let anonymous: Vec<Variable> = self
            .head
            .atom
            .variables()
            .into_iter()
            .filter(|v| !v.is_user_defined() && !body_variables.contains(v))
            .collect();
        if anonymous.is_empty() {
            return self.clone();
        }
        let rename = |v: &Variable| {
            if anonymous.contains(v) {
                Variable::new(format!("head-{}", v.name().trim_start_matches('_')))
            } else {
                v.clone()
            }
        };
        self.derive(self.body.clone(), self.head.rename(&rename))
    }

    /// Merges the parent's value, type and ownership constraints into the body so the body
    /// is already filtered by them. Only relation and ownership parents are propagated.
    pub fn propagate_constraints(&self, parent: &AtomicQuery, unifier: &Unifier) -> InferenceRule {
        if !(parent.atom.is_relation() || parent.atom.is_has()) {
            return self.clone();
        }
        let to_head = unifier.inverse();
        let body_variables = self.body_variables();
        let mut body = self.body.clone();
        for predicate in &parent.predicates {
            if predicate.is_identifying() || matches!(predicate, Predicate::Neq { .. }) {
                continue;
            }
            let mapped = predicate
                .variables()
                .iter()
                .all(|v| to_head.get(v).is_some_and(|h| body_variables.contains(h)));
            if mapped {
                body.predicates.insert(predicate.rename(&|v| to_head.rename(v)));
            }
        }
        if body.predicates.len() == self.body.predicates.len() {
            return self.clone();
        }
        self.derive(body, self.head.clone())
    }

    /// Prepares one application of this rule to `parent`, whose current bounds are
    /// `parent_bounds`.
    pub fn sub_goal(
        &self,
        parent: &AtomicQuery,
        unifier: &Unifier,
        parent_bounds: &ConceptMap,
    ) -> ResolutionState {
        let rule = self.propagate_constraints(parent, unifier);
        let materialise = rule.requires_materialisation(&parent.atom);
        ResolutionState {
            rule: Arc::new(rule),
            unifier: unifier.clone(),
            head_bounds: unifier.invert_answer(parent_bounds),
            materialise,
        }
    }

    /// Builds the head answer for one body answer. With `materialise` the conclusion is
    /// written through `storage`; otherwise relation instances get a deterministic transient
    /// id. `None` when a head constraint rejects the answer.
    pub fn conclude(
        &self,
        body_answer: &ConceptMap,
        storage: &dyn Storage,
        schema: &Schema,
        materialise: bool,
    ) -> Result<Option<ConceptMap>, StorageError> {
        let pinned = self.head.bound_ids();
        let mut head = ConceptMap::new().inferred(true);
        let resolve = |variable: &Variable| -> Result<Option<Concept>, StorageError> {
            if let Some(concept) = body_answer.get(variable) {
                return Ok(Some(concept.clone()));
            }
            match pinned.get(variable) {
                Some(id) => storage
                    .concept(id)
                    .map(Some)
                    .ok_or_else(|| StorageError::UnknownConcept(id.to_string())),
                None => Ok(None),
            }
        };

        match &self.head.atom {
            Atom::Relation {
                var,
                label: Some(label),
                role_players,
            } => {
                let mut players = Vec::with_capacity(role_players.len());
                for rp in role_players {
                    let Some(concept) = resolve(&rp.player)? else {
                        return Ok(None);
                    };
                    let role = rp.role.clone().unwrap_or_else(|| label.clone());
                    players.push((role, concept.id.clone()));
                    head.insert(rp.player.clone(), concept);
                }
                let relation = match resolve(var)? {
                    Some(existing) => existing,
                    None if materialise => storage.insert_relation(label, &players)?,
                    None => transient_relation(label, &players),
                };
                head.insert(var.clone(), relation);
            }
            Atom::Has {
                owner,
                attribute,
                label: Some(_),
            } => {
                let (Some(owner_concept), Some(attribute_concept)) =
                    (resolve(owner)?, resolve(attribute)?)
                else {
                    return Ok(None);
                };
                let owner_concept = if materialise {
                    storage.insert_ownership(&owner_concept.id, &attribute_concept.id)?;
                    storage
                        .concept(&owner_concept.id)
                        .ok_or_else(|| StorageError::UnknownConcept(owner_concept.id.to_string()))?
                } else {
                    let mut snapshot = owner_concept.clone();
                    if let Some(value) = &attribute_concept.value {
                        snapshot
                            .attributes
                            .insert((attribute_concept.label.clone(), value.clone()));
                    }
                    snapshot
                };
                head.insert(owner.clone(), owner_concept);
                head.insert(attribute.clone(), attribute_concept);
            }
            _ => return Ok(None),
        }

        Ok(self.head.satisfied_by(&head, schema).then_some(head))
    }
}

/// Transient relation concept whose id only depends on the relation's label and players, so
/// concluding the same relation twice yields the same concept.
fn transient_relation(label: &Label, players: &[(Label, ConceptId)]) -> Concept {
    if let Some(attribute) = label.implicit_attribute() {
        let find = |role: Label| {
            players
                .iter()
                .find(|(r, _)| r == &role)
                .map(|(_, id)| id.to_string())
                .unwrap_or_default()
        };
        let owner = find(Label::implicit_owner_role(&attribute));
        let value = find(Label::implicit_value_role(&attribute));
        return Concept::new(format!("@has:{}:{}", owner, value), label.name());
    }
    let mut sorted: Vec<String> = players
        .iter()
        .map(|(role, id)| format!("{}={}", role, id))
        .collect();
    sorted.sort();
    Concept::new(format!("{}({})", label, sorted.join(",")), label.name())
}

impl PartialEq for InferenceRule {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label && self.body == other.body && self.head == other.head
    }
}

impl Eq for InferenceRule {}

impl Display for InferenceRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: when {} then {}", self.label, self.body, self.head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Comparator, Value};
    use crate::schema::{InMemoryGraph, TypeKind};

    fn schema() -> Schema {
        Schema::default()
            .with_type("person", TypeKind::Entity, None)
            .with_type("friend", TypeKind::Role, None)
            .with_type("friendship", TypeKind::Relation, None)
            .with_type("knows", TypeKind::Relation, None)
            .with_type("nickname", TypeKind::Attribute, None)
            .with_type("age", TypeKind::Attribute, None)
    }

    fn pair(var: &str, label: &str, x: &str, y: &str) -> Atom {
        Atom::relation(
            var,
            label,
            vec![
                RolePlayer::new(Some("friend"), x),
                RolePlayer::new(Some("friend"), y),
            ],
        )
    }

    fn definition(when: Conjunction, then: AtomicQuery) -> RuleDefinition {
        RuleDefinition {
            label: "rule".into(),
            when,
            then,
        }
    }

    fn knows_rule() -> InferenceRule {
        let def = definition(
            Conjunction::new(vec![pair("_f", "friendship", "x", "y")]),
            AtomicQuery::new(pair("_k", "knows", "x", "y")),
        );
        InferenceRule::new(&def, &schema()).unwrap()
    }

    #[test]
    fn construction_rejects_malformed_rules() {
        let schema = schema();
        let empty = definition(
            Conjunction::default(),
            AtomicQuery::new(pair("_k", "knows", "x", "y")),
        );
        assert!(matches!(
            InferenceRule::new(&empty, &schema),
            Err(RuleError::EmptyBody { .. })
        ));

        let isa_head = definition(
            Conjunction::new(vec![Atom::isa("x", "person")]),
            AtomicQuery::new(Atom::isa("x", "person")),
        );
        assert!(matches!(
            InferenceRule::new(&isa_head, &schema),
            Err(RuleError::UnsupportedHead { .. })
        ));

        let unknown = definition(
            Conjunction::new(vec![Atom::isa("x", "robot")]),
            AtomicQuery::new(pair("_k", "knows", "x", "x")),
        );
        assert!(matches!(
            InferenceRule::new(&unknown, &schema),
            Err(RuleError::UnknownLabel { .. })
        ));

        let unbound = definition(
            Conjunction::new(vec![Atom::isa("x", "person")]),
            AtomicQuery::new(pair("_k", "knows", "x", "y")),
        );
        assert!(matches!(
            InferenceRule::new(&unbound, &schema),
            Err(RuleError::UnboundHeadVariable { variable, .. }) if variable == "$y"
        ));

        let untyped = definition(
            Conjunction::new(vec![Atom::isa("x", "person")]),
            AtomicQuery::new(Atom::Has {
                owner: Variable::new("x"),
                attribute: Variable::new("n"),
                label: None,
            })
            .with_predicate(Predicate::id("n", "N1")),
        );
        assert!(matches!(
            InferenceRule::new(&untyped, &schema),
            Err(RuleError::UntypedHead { .. })
        ));
    }

    #[test]
    fn pinned_head_variables_count_as_bound() {
        let def = definition(
            Conjunction::new(vec![Atom::isa("x", "person")]),
            AtomicQuery::new(Atom::has("x", "n", "nickname"))
                .with_predicate(Predicate::id("n", "N1")),
        );
        assert!(InferenceRule::new(&def, &schema()).is_ok());
    }

    #[test]
    fn disconnected_head_always_materialises() {
        let def = definition(
            Conjunction::new(vec![Atom::isa("p", "person")]),
            AtomicQuery::new(pair("_k", "knows", "a", "b"))
                .with_predicate(Predicate::id("a", "V1"))
                .with_predicate(Predicate::id("b", "V2")),
        );
        let rule = InferenceRule::new(&def, &schema()).unwrap();
        assert!(rule.has_disconnected_head());
        for parent in [
            pair("_q", "knows", "s", "t"),
            Atom::Relation {
                var: Variable::new("_q"),
                label: None,
                role_players: vec![RolePlayer::new(None, "s")],
            },
            Atom::isa("s", "person"),
        ] {
            assert!(rule.requires_materialisation(&parent));
        }
    }

    #[test]
    fn connected_anonymous_heads_stream_transiently() {
        let rule = knows_rule();
        assert!(!rule.has_disconnected_head());
        assert!(!rule.requires_materialisation(&pair("_q", "knows", "s", "t")));
        assert!(rule.requires_materialisation(&pair("k", "knows", "s", "t")));
    }

    #[test]
    fn symmetric_heads_unify_both_ways() {
        let rule = knows_rule();
        let unifiers = rule.get_multi_unifier(&pair("_q", "knows", "s", "t"), &schema());
        assert_eq!(unifiers.len(), 2);
    }

    #[test]
    fn untyped_parents_take_the_conclusion_type() {
        let rule = knows_rule();
        let parent = Atom::Relation {
            var: Variable::new("_q"),
            label: None,
            role_players: vec![
                RolePlayer::new(Some("friend"), "s"),
                RolePlayer::new(Some("friend"), "t"),
            ],
        };
        assert!(!rule.get_multi_unifier(&parent, &schema()).is_empty());
    }

    #[test]
    fn body_rewrite_drops_duplicates_and_entailed_types() {
        let def = definition(
            Conjunction::new(vec![
                Atom::isa("x", "person"),
                Atom::isa("x", "person"),
                pair("_f", "friendship", "x", "y"),
            ])
            .with_predicate(Predicate::Type {
                var: Variable::new("x"),
                label: Label::new("person"),
            }),
            AtomicQuery::new(pair("_k", "knows", "x", "y")),
        );
        let rule = InferenceRule::new(&def, &schema()).unwrap();
        let rewritten = rule.rewrite(&pair("_q", "knows", "s", "t"), &schema());
        assert_eq!(rewritten.body().atoms.len(), 2);
        assert!(rewritten.body().predicates.is_empty());
        assert_eq!(rule.body().atoms.len(), 3);
    }

    #[test]
    fn attribute_heads_become_ownership_relations_for_relation_parents() {
        let def = definition(
            Conjunction::new(vec![Atom::has("x", "n", "nickname")]),
            AtomicQuery::new(Atom::has("x", "n", "nickname")),
        );
        let schema = schema();
        let rule = InferenceRule::new(&def, &schema).unwrap();
        let nickname = Label::new("nickname");
        let parent = Atom::Relation {
            var: Variable::new("_q"),
            label: Some(Label::implicit_has(&nickname)),
            role_players: vec![
                RolePlayer {
                    role: Some(Label::implicit_owner_role(&nickname)),
                    player: Variable::new("o"),
                },
                RolePlayer {
                    role: Some(Label::implicit_value_role(&nickname)),
                    player: Variable::new("v"),
                },
            ],
        };
        let rewritten = rule.rewrite(&parent, &schema);
        assert!(rewritten.head().atom.is_relation());
        assert_eq!(rewritten.get_multi_unifier(&parent, &schema).len(), 1);

        let unchanged = rule.rewrite(&Atom::has("o", "v", "nickname"), &schema);
        assert!(unchanged.head().atom.is_has());
    }

    #[test]
    fn named_parents_rename_anonymous_head_variables() {
        let rule = knows_rule();
        let rewritten = rule.rewrite(&pair("k", "knows", "s", "t"), &schema());
        assert!(rewritten
            .head_variables()
            .contains(&Variable::new("head-k")));
        let untouched = rule.rewrite(&pair("_q", "knows", "s", "t"), &schema());
        assert_eq!(untouched.head(), rule.head());
    }

    #[test]
    fn parent_constraints_reach_the_body() {
        let def = definition(
            Conjunction::new(vec![pair("_f", "friendship", "x", "y"), Atom::has("x", "a", "age")]),
            AtomicQuery::new(pair("_k", "knows", "x", "y")),
        );
        let rule = InferenceRule::new(&def, &schema()).unwrap();
        let parent = AtomicQuery::new(pair("_q", "knows", "s", "t"))
            .with_predicate(Predicate::has("s", "age", Value::Long(30)))
            .with_predicate(Predicate::id("t", "V2"));
        let unifier = rule
            .get_multi_unifier(&parent.atom, &schema())
            .into_iter()
            .find(|u| u.get(&Variable::new("x")) == Some(&Variable::new("s")))
            .unwrap();
        let propagated = rule.propagate_constraints(&parent, &unifier);
        assert!(propagated
            .body()
            .predicates
            .contains(&Predicate::has("x", "age", Value::Long(30))));
        assert!(!propagated.body().predicates.iter().any(|p| p.is_identifying()));

        let isa_parent = AtomicQuery::new(Atom::isa("s", "person"))
            .with_predicate(Predicate::value("s", Comparator::Gt, Value::Long(1)));
        assert_eq!(rule.propagate_constraints(&isa_parent, &unifier), rule);
    }

    #[test]
    fn sub_goal_carries_parent_bounds_into_the_head() {
        let rule = knows_rule();
        let parent = AtomicQuery::new(pair("_q", "knows", "s", "t"));
        let unifier = rule
            .get_multi_unifier(&parent.atom, &schema())
            .into_iter()
            .find(|u| u.get(&Variable::new("x")) == Some(&Variable::new("s")))
            .unwrap();
        let bounds = ConceptMap::new().with(Variable::new("s"), Concept::new("V1", "person"));
        let state = rule.sub_goal(&parent, &unifier, &bounds);
        assert_eq!(
            state.head_bounds.get(&Variable::new("x")).map(|c| c.id.as_str()),
            Some("V1")
        );
        assert!(!state.materialise);
    }

    #[test]
    fn conclude_builds_stable_transient_relations() {
        let schema = Arc::new(schema());
        let graph = InMemoryGraph::new(Arc::clone(&schema));
        let rule = knows_rule();
        let body = ConceptMap::new()
            .with(Variable::new("_f"), Concept::new("F1", "friendship"))
            .with(Variable::new("x"), Concept::new("V1", "person"))
            .with(Variable::new("y"), Concept::new("V2", "person"));
        let first = rule.conclude(&body, &graph, &schema, false).unwrap().unwrap();
        let second = rule.conclude(&body, &graph, &schema, false).unwrap().unwrap();
        assert!(first.is_inferred());
        assert_eq!(first.get(&Variable::new("_k")), second.get(&Variable::new("_k")));
        assert_eq!(graph.query_count(), 0);
    }

    #[test]
    fn conclude_materialises_ownerships() {
        let schema = Arc::new(schema());
        let graph = InMemoryGraph::new(Arc::clone(&schema));
        graph.add_concept("V1", "person", None).unwrap();
        graph
            .add_concept("N1", "nickname", Some(Value::String("bob".into())))
            .unwrap();
        let def = definition(
            Conjunction::new(vec![Atom::isa("x", "person")]),
            AtomicQuery::new(Atom::has("x", "n", "nickname"))
                .with_predicate(Predicate::id("n", "N1")),
        );
        let rule = InferenceRule::new(&def, &schema).unwrap();
        let body = ConceptMap::new().with(Variable::new("x"), Concept::new("V1", "person"));
        let head = rule.conclude(&body, &graph, &schema, true).unwrap().unwrap();
        let owner = head.get(&Variable::new("x")).unwrap();
        assert!(owner.owns(&Label::new("nickname"), &Value::String("bob".into())));
        assert!(graph
            .concept(&ConceptId::new("V1"))
            .unwrap()
            .owns(&Label::new("nickname"), &Value::String("bob".into())));
    }

    #[test]
    fn priorities_order_by_depth_then_specificity() {
        let shallow_specific = ResolutionPriority { depth: 0, ancestors: 3 };
        let shallow_general = ResolutionPriority { depth: 0, ancestors: 0 };
        let deep = ResolutionPriority { depth: 1, ancestors: 5 };
        assert!(shallow_specific < shallow_general);
        assert!(shallow_general < deep);
    }
}
