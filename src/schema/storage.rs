// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{Schema, TypeKind};
use crate::errors::StorageError;
use crate::pattern::{
    Atom, AtomicQuery, Concept, ConceptId, ConceptMap, Label, RolePlayer, Value, Variable,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Raw, uncached query evaluation plus the writes needed to materialise rule conclusions.
///
/// Implementations are shared between every processor of an episode, so they must be safe to
/// call from any task.
pub trait Storage: Send + Sync {
    /// Every stored answer to `query`, over the variables of its atom.
    fn get(&self, query: &AtomicQuery) -> Result<Vec<ConceptMap>, StorageError>;

    fn concept(&self, id: &ConceptId) -> Option<Concept>;

    /// Writes a relation instance, returning the existing one if an identical instance is
    /// already stored.
    fn insert_relation(
        &self,
        label: &Label,
        role_players: &[(Label, ConceptId)],
    ) -> Result<Concept, StorageError>;

    /// Records that `owner` has `attribute`; returns the attribute concept.
    fn insert_ownership(
        &self,
        owner: &ConceptId,
        attribute: &ConceptId,
    ) -> Result<Concept, StorageError>;

    /// Number of `get` calls served so far.
    fn query_count(&self) -> usize;
}

#[derive(Debug, Clone)]
struct StoredConcept {
    label: Label,
    value: Option<Value>,
}

#[derive(Debug, Default)]
struct GraphState {
    concepts: BTreeMap<ConceptId, StoredConcept>,
    relations: BTreeMap<ConceptId, Vec<(Label, ConceptId)>>,
    ownerships: BTreeSet<(ConceptId, ConceptId)>,
    next_id: u64,
}

impl GraphState {
    fn snapshot(&self, id: &ConceptId) -> Option<Concept> {
        let stored = self.concepts.get(id)?;
        let attributes = self
            .ownerships
            .iter()
            .filter(|(owner, _)| owner == id)
            .filter_map(|(_, attribute)| {
                let owned = self.concepts.get(attribute)?;
                Some((owned.label.clone(), owned.value.clone()?))
            })
            .collect();
        Some(Concept {
            id: id.clone(),
            label: stored.label.clone(),
            value: stored.value.clone(),
            attributes,
        })
    }

    fn fresh_id(&mut self, label: &Label) -> ConceptId {
        self.next_id += 1;
        ConceptId::new(format!("{}#{}", label, self.next_id))
    }
}

/// In-memory concept graph. Relations are stored with their role players; attribute
/// ownership doubles as the implicit `@has-<attribute>` relation.
pub struct InMemoryGraph {
    schema: Arc<Schema>,
    state: RwLock<GraphState>,
    queries: AtomicUsize,
}

impl InMemoryGraph {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            state: RwLock::new(GraphState::default()),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn add_concept(
        &self,
        id: &str,
        label: &str,
        value: Option<Value>,
    ) -> Result<(), StorageError> {
        let label = Label::new(label);
        if !self.schema.contains(&label) {
            return Err(StorageError::UnknownType(label.to_string()));
        }
        let mut state = self.state.write();
        let id = ConceptId::new(id);
        if state.concepts.contains_key(&id) {
            return Err(StorageError::DuplicateConcept(id.to_string()));
        }
        state.concepts.insert(id, StoredConcept { label, value });
        Ok(())
    }

    pub fn add_relation(
        &self,
        id: &str,
        label: &str,
        role_players: &[(&str, &str)],
    ) -> Result<(), StorageError> {
        self.add_concept(id, label, None)?;
        let mut state = self.state.write();
        let mut players = Vec::with_capacity(role_players.len());
        for (role, player) in role_players {
            let player = ConceptId::new(*player);
            if !state.concepts.contains_key(&player) {
                return Err(StorageError::UnknownConcept(player.to_string()));
            }
            players.push((Label::new(*role), player));
        }
        state.relations.insert(ConceptId::new(id), players);
        Ok(())
    }

    pub fn add_ownership(&self, owner: &str, attribute: &str) -> Result<(), StorageError> {
        self.insert_ownership(&ConceptId::new(owner), &ConceptId::new(attribute))
            .map(|_| ())
    }

    fn matches_label(&self, actual: &Label, wanted: Option<&Label>) -> bool {
        wanted.map_or(true, |wanted| self.schema.is_subtype(actual, wanted))
    }

    fn answer_isa(
        &self,
        state: &GraphState,
        var: &Variable,
        label: Option<&Label>,
    ) -> Vec<ConceptMap> {
        state
            .concepts
            .iter()
            .filter(|(_, stored)| self.matches_label(&stored.label, label))
            .filter_map(|(id, _)| state.snapshot(id))
            .map(|concept| ConceptMap::new().with(var.clone(), concept))
            .collect()
    }

    fn answer_has(
        &self,
        state: &GraphState,
        owner: &Variable,
        attribute: &Variable,
        label: Option<&Label>,
    ) -> Vec<ConceptMap> {
        state
            .ownerships
            .iter()
            .filter_map(|(o, a)| {
                let stored = state.concepts.get(a)?;
                if !self.matches_label(&stored.label, label) {
                    return None;
                }
                Some(
                    ConceptMap::new()
                        .with(owner.clone(), state.snapshot(o)?)
                        .with(attribute.clone(), state.snapshot(a)?),
                )
            })
            .collect()
    }

    fn answer_relation(
        &self,
        state: &GraphState,
        var: &Variable,
        label: Option<&Label>,
        role_players: &[RolePlayer],
    ) -> Vec<ConceptMap> {
        let mut answers = Vec::new();
        for (relation, players) in self.relation_instances(state, label) {
            let mut used = vec![false; players.len()];
            let base = ConceptMap::new().with(var.clone(), relation);
            self.assign_players(state, role_players, &players, 0, &mut used, base, &mut answers);
        }
        answers
    }

    /// Stored relations plus the implicit ownership relations when `label` asks for one.
    fn relation_instances(
        &self,
        state: &GraphState,
        label: Option<&Label>,
    ) -> Vec<(Concept, Vec<(Label, ConceptId)>)> {
        if let Some(attribute) = label.and_then(Label::implicit_attribute) {
            return state
                .ownerships
                .iter()
                .filter(|(_, a)| {
                    state
                        .concepts
                        .get(a)
                        .is_some_and(|c| self.schema.is_subtype(&c.label, &attribute))
                })
                .map(|(o, a)| {
                    let implicit = Concept::new(
                        format!("@has:{}:{}", o, a),
                        Label::implicit_has(&attribute).name(),
                    );
                    let players = vec![
                        (Label::implicit_owner_role(&attribute), o.clone()),
                        (Label::implicit_value_role(&attribute), a.clone()),
                    ];
                    (implicit, players)
                })
                .collect();
        }
        state
            .relations
            .iter()
            .filter_map(|(id, players)| {
                let concept = state.snapshot(id)?;
                self.matches_label(&concept.label, label)
                    .then(|| (concept, players.clone()))
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn assign_players(
        &self,
        state: &GraphState,
        wanted: &[RolePlayer],
        stored: &[(Label, ConceptId)],
        index: usize,
        used: &mut [bool],
        answer: ConceptMap,
        out: &mut Vec<ConceptMap>,
    ) {
        if index == wanted.len() {
            out.push(answer);
            return;
        }
        let target = &wanted[index];
        for (j, (role, player)) in stored.iter().enumerate() {
            if used[j] || !self.matches_label(role, target.role.as_ref()) {
                continue;
            }
            let Some(concept) = state.snapshot(player) else {
                continue;
            };
            let Some(extended) =
                answer.merge(&ConceptMap::new().with(target.player.clone(), concept))
            else {
                continue;
            };
            used[j] = true;
            self.assign_players(state, wanted, stored, index + 1, used, extended, out);
            used[j] = false;
        }
    }
}

impl Storage for InMemoryGraph {
    fn get(&self, query: &AtomicQuery) -> Result<Vec<ConceptMap>, StorageError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read();
        let candidates = match &query.atom {
            Atom::Isa { var, label } => self.answer_isa(&state, var, label.as_ref()),
            Atom::Has {
                owner,
                attribute,
                label,
            } => self.answer_has(&state, owner, attribute, label.as_ref()),
            Atom::Relation {
                var,
                label,
                role_players,
            } => self.answer_relation(&state, var, label.as_ref(), role_players),
        };
        let mut seen = HashSet::new();
        Ok(candidates
            .into_iter()
            .filter(|answer| query.satisfied_by(answer, &self.schema))
            .filter(|answer| seen.insert(answer.clone()))
            .collect())
    }

    fn concept(&self, id: &ConceptId) -> Option<Concept> {
        self.state.read().snapshot(id)
    }

    fn insert_relation(
        &self,
        label: &Label,
        role_players: &[(Label, ConceptId)],
    ) -> Result<Concept, StorageError> {
        if let Some(attribute) = label.implicit_attribute() {
            let player = |role: Label| {
                role_players
                    .iter()
                    .find(|(r, _)| r == &role)
                    .map(|(_, p)| p.clone())
                    .ok_or_else(|| StorageError::UnknownConcept(role.to_string()))
            };
            let owner = player(Label::implicit_owner_role(&attribute))?;
            let value = player(Label::implicit_value_role(&attribute))?;
            self.insert_ownership(&owner, &value)?;
            return Ok(Concept::new(
                format!("@has:{}:{}", owner, value),
                label.name(),
            ));
        }
        if self.schema.kind(label) != Some(TypeKind::Relation) {
            return Err(StorageError::UnknownType(label.to_string()));
        }

        let mut state = self.state.write();
        for (_, player) in role_players {
            if !state.concepts.contains_key(player) {
                return Err(StorageError::UnknownConcept(player.to_string()));
            }
        }
        let mut wanted: Vec<(Label, ConceptId)> = role_players.to_vec();
        wanted.sort();
        let existing = state.relations.iter().find_map(|(id, players)| {
            let mut players = players.clone();
            players.sort();
            let same_label = state.concepts.get(id).is_some_and(|c| &c.label == label);
            (same_label && players == wanted).then(|| id.clone())
        });
        let id = match existing {
            Some(id) => id,
            None => {
                let id = state.fresh_id(label);
                state.concepts.insert(
                    id.clone(),
                    StoredConcept {
                        label: label.clone(),
                        value: None,
                    },
                );
                state.relations.insert(id.clone(), role_players.to_vec());
                tracing::debug!(relation = %id, label = %label, "materialised relation");
                id
            }
        };
        state
            .snapshot(&id)
            .ok_or_else(|| StorageError::UnknownConcept(id.to_string()))
    }

    fn insert_ownership(
        &self,
        owner: &ConceptId,
        attribute: &ConceptId,
    ) -> Result<Concept, StorageError> {
        let mut state = self.state.write();
        if !state.concepts.contains_key(owner) {
            return Err(StorageError::UnknownConcept(owner.to_string()));
        }
        let stored = state
            .concepts
            .get(attribute)
            .ok_or_else(|| StorageError::UnknownConcept(attribute.to_string()))?;
        let kind = self.schema.kind(&stored.label);
        if kind != Some(TypeKind::Attribute) {
            return Err(StorageError::KindMismatch {
                concept: attribute.to_string(),
                expected: "attribute".to_string(),
                actual: kind.map_or_else(|| "unknown".to_string(), |k| format!("{:?}", k)),
            });
        }
        state.ownerships.insert((owner.clone(), attribute.clone()));
        state
            .snapshot(attribute)
            .ok_or_else(|| StorageError::UnknownConcept(attribute.to_string()))
    }

    fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Predicate;

    fn graph() -> InMemoryGraph {
        let schema = Schema::default()
            .with_type("person", TypeKind::Entity, None)
            .with_type("employee", TypeKind::Entity, Some("person"))
            .with_type("friendship", TypeKind::Relation, None)
            .with_type("friend", TypeKind::Role, None)
            .with_type("age", TypeKind::Attribute, None);
        let graph = InMemoryGraph::new(Arc::new(schema));
        graph.add_concept("alice", "person", None).unwrap();
        graph.add_concept("bob", "employee", None).unwrap();
        graph.add_concept("age30", "age", Some(Value::Long(30))).unwrap();
        graph
            .add_relation("f1", "friendship", &[("friend", "alice"), ("friend", "bob")])
            .unwrap();
        graph.add_ownership("alice", "age30").unwrap();
        graph
    }

    #[test]
    fn isa_matches_subtypes() {
        let graph = graph();
        let answers = graph.get(&AtomicQuery::new(Atom::isa("x", "person"))).unwrap();
        assert_eq!(answers.len(), 2);
        let answers = graph.get(&AtomicQuery::new(Atom::isa("x", "employee"))).unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(graph.query_count(), 2);
    }

    #[test]
    fn symmetric_relation_yields_both_role_assignments() {
        let graph = graph();
        let query = AtomicQuery::new(Atom::relation(
            "r",
            "friendship",
            vec![RolePlayer::new(Some("friend"), "x"), RolePlayer::new(Some("friend"), "y")],
        ));
        assert_eq!(graph.get(&query).unwrap().len(), 2);

        let bound = query.with_predicate(Predicate::id("x", "alice"));
        assert_eq!(graph.get(&bound).unwrap().len(), 1);
    }

    #[test]
    fn ownership_is_visible_as_has_and_as_implicit_relation() {
        let graph = graph();
        let has = graph.get(&AtomicQuery::new(Atom::has("x", "a", "age"))).unwrap();
        assert_eq!(has.len(), 1);

        let age = Label::new("age");
        let implicit = AtomicQuery::new(Atom::Relation {
            var: Variable::new("_r"),
            label: Some(Label::implicit_has(&age)),
            role_players: vec![RolePlayer {
                role: Some(Label::implicit_owner_role(&age)),
                player: Variable::new("x"),
            }],
        });
        assert_eq!(graph.get(&implicit).unwrap().len(), 1);

        let alice = graph.concept(&ConceptId::new("alice")).unwrap();
        assert!(alice.owns(&age, &Value::Long(30)));
    }

    #[test]
    fn relation_materialisation_is_idempotent() {
        let graph = graph();
        let players = vec![
            (Label::new("friend"), ConceptId::new("bob")),
            (Label::new("friend"), ConceptId::new("alice")),
        ];
        let first = graph.insert_relation(&Label::new("friendship"), &players).unwrap();
        assert_eq!(first.id, ConceptId::new("f1"));

        let players = vec![(Label::new("friend"), ConceptId::new("alice"))];
        let created = graph.insert_relation(&Label::new("friendship"), &players).unwrap();
        let again = graph.insert_relation(&Label::new("friendship"), &players).unwrap();
        assert_eq!(created.id, again.id);
    }

    #[test]
    fn ownership_requires_an_attribute() {
        let graph = graph();
        let err = graph
            .insert_ownership(&ConceptId::new("alice"), &ConceptId::new("bob"))
            .unwrap_err();
        assert!(matches!(err, StorageError::KindMismatch { .. }));
    }
}
