// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::entry::{Binding, CacheEntry};
use crate::errors::QueryCacheError;
use crate::observability::messages::cache::{
    AnswersPropagated, CacheEntryCreated, CompletenessAcknowledged,
};
use crate::observability::messages::StructuredLog;
use crate::pattern::{AtomicQuery, ConceptMap, Label, SemanticDifference, Unifier};
use crate::schema::{Schema, Storage};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Answer cache in front of [`Storage`] that reuses answers across queries related by
/// subsumption.
///
/// Entries live in an arena and refer to each other by index. Every entry belongs to the
/// family of its label's root type, and within a family an identifier-free entry is the
/// parent of every entry it subsumes.
pub struct SemanticCache {
    storage: Arc<dyn Storage>,
    schema: Arc<Schema>,
    entries: Vec<CacheEntry>,
    index: HashMap<String, usize>,
    families: HashMap<Option<Label>, Vec<usize>>,
}

impl SemanticCache {
    pub fn new(storage: Arc<dyn Storage>, schema: Arc<Schema>) -> Self {
        Self {
            storage,
            schema,
            entries: Vec::new(),
            index: HashMap::new(),
            families: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Answers held across every entry.
    pub fn answer_count(&self) -> usize {
        self.entries.iter().map(|e| e.answers().len()).sum()
    }

    /// Drops every entry; completeness starts over.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.families.clear();
    }

    /// The family `query` belongs to: the root of its label's type hierarchy.
    pub fn family_of(&self, query: &AtomicQuery) -> Option<Label> {
        let label = query.label()?;
        Some(self.schema.sups(label).pop().unwrap_or_else(|| label.clone()))
    }

    pub fn parents_of(&self, query: &AtomicQuery) -> Vec<AtomicQuery> {
        self.find(query)
            .map(|e| {
                self.entries[e]
                    .parents
                    .iter()
                    .map(|&p| self.entries[p].query.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn children_of(&self, query: &AtomicQuery) -> Vec<AtomicQuery> {
        self.find(query)
            .map(|e| {
                self.entries[e]
                    .children
                    .iter()
                    .map(|&c| self.entries[c].query.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Records one answer to `query`. Returns whether the answer was new.
    pub fn record(
        &mut self,
        query: &AtomicQuery,
        answer: ConceptMap,
    ) -> Result<bool, QueryCacheError> {
        if !answer.covers(&query.atom_variables()) {
            return Err(QueryCacheError::IncompleteAnswer {
                query: query.to_string(),
                answer: answer.to_string(),
            });
        }
        let entry = match self.find(query) {
            Some(entry) => entry,
            None => self.create_entry(query)?,
        };
        self.insert(entry, query, &answer)
    }

    /// Every cached answer to `query`, fetching from storage first unless the query is
    /// already known to hold every stored answer.
    pub fn get_answer_stream(
        &mut self,
        query: &AtomicQuery,
    ) -> Result<Vec<ConceptMap>, QueryCacheError> {
        let entry = match self.find(query) {
            Some(entry) => entry,
            None => self.create_entry(query)?,
        };
        if query.is_ground() {
            let parents: Vec<usize> = self.entries[entry].parents.iter().copied().collect();
            for parent in parents {
                self.propagate(parent, entry, true)?;
            }
            // A ground query has at most one answer.
            if !self.is_db_complete(query) && self.answers_query(query) {
                self.ack_db_completeness(query)?;
            }
        }
        if !self.is_db_complete(query) {
            for answer in self.storage.get(query)? {
                self.insert(entry, query, &answer)?;
            }
            self.ack_db_completeness(query)?;
        }
        self.read(entry, query)
    }

    /// Whether the cache already holds an answer to `query`, either under its own entry or
    /// under the identifier-free entry its bindings index into.
    pub fn answers_query(&self, query: &AtomicQuery) -> bool {
        [query.clone(), query.without_ids()].iter().any(|shape| {
            self.find(shape)
                .and_then(|entry| self.read_filtered(entry, shape, query).ok())
                .is_some_and(|answers| !answers.is_empty())
        })
    }

    pub fn is_db_complete(&self, query: &AtomicQuery) -> bool {
        self.check(query, |entry, binding| entry.is_db_complete(binding))
    }

    pub fn is_complete(&self, query: &AtomicQuery) -> bool {
        self.check(query, |entry, binding| entry.complete.contains(binding))
    }

    /// Marks every answer to `query`, inferred ones included, as cached. Identifier-free
    /// queries pass completeness on to all their descendants together with their answers.
    pub fn ack_completeness(&mut self, query: &AtomicQuery) -> Result<(), QueryCacheError> {
        let entry = match self.find(query) {
            Some(entry) => entry,
            None => self.create_entry(query)?,
        };
        for binding in self.bindings(entry, query)? {
            self.entries[entry].complete.insert(binding);
        }
        CompletenessAcknowledged {
            query: &self.entries[entry].query,
            level: "complete",
        }
        .log();
        if self.entries[entry].complete.is_all() {
            self.cascade(entry, true)?;
        }
        Ok(())
    }

    /// Marks every stored answer to `query` as cached.
    pub fn ack_db_completeness(&mut self, query: &AtomicQuery) -> Result<(), QueryCacheError> {
        let entry = match self.find(query) {
            Some(entry) => entry,
            None => self.create_entry(query)?,
        };
        for binding in self.bindings(entry, query)? {
            self.entries[entry].db_complete.insert(binding);
        }
        CompletenessAcknowledged {
            query: &self.entries[entry].query,
            level: "db_complete",
        }
        .log();
        if self.entries[entry].db_complete.is_all() {
            self.cascade(entry, false)?;
        }
        Ok(())
    }

    /// Pushes the answers of `parent` down into `child`. Only non-inferred answers move
    /// unless `inferred` is set. Returns how many answers were new to the child.
    pub fn propagate_answers(
        &mut self,
        parent: &AtomicQuery,
        child: &AtomicQuery,
        inferred: bool,
    ) -> Result<usize, QueryCacheError> {
        let (Some(p), Some(c)) = (self.find(parent), self.find(child)) else {
            return Err(QueryCacheError::Unfamilied {
                query: child.to_string(),
            });
        };
        if self.entries[p].family != self.entries[c].family {
            return Err(QueryCacheError::Unfamilied {
                query: child.to_string(),
            });
        }
        self.propagate(p, c, inferred)
    }

    /// Answers of a complete entry asking for every instance of exactly `label`, paired with
    /// that entry's query. `None` when no such entry exists.
    pub fn complete_family_answers(
        &self,
        label: &Label,
    ) -> Option<Vec<(AtomicQuery, ConceptMap)>> {
        let family = Some(self.schema.sups(label).pop().unwrap_or_else(|| label.clone()));
        let members = self.families.get(&family)?;
        members
            .iter()
            .map(|&i| &self.entries[i])
            .find(|entry| {
                entry.query.label() == Some(label)
                    && entry.query.predicates.is_empty()
                    && entry.complete.is_all()
            })
            .map(|entry| {
                entry
                    .answers()
                    .iter()
                    .map(|answer| (entry.query.clone(), answer.clone()))
                    .collect()
            })
    }

    fn find(&self, query: &AtomicQuery) -> Option<usize> {
        self.index.get(query.key().as_str()).copied()
    }

    fn check(&self, query: &AtomicQuery, f: impl Fn(&CacheEntry, &Binding) -> bool) -> bool {
        let Some(entry) = self.find(query) else {
            return false;
        };
        match self.bindings(entry, query) {
            Ok(bindings) => bindings.iter().any(|b| f(&self.entries[entry], b)),
            Err(_) => false,
        }
    }

    /// Renamings of `query` onto the entry's query. Equal keys guarantee at least one.
    fn to_entry(&self, entry: usize, query: &AtomicQuery) -> Result<Vec<Unifier>, QueryCacheError> {
        let unifiers: Vec<Unifier> = query
            .alpha_unifiers(&self.entries[entry].query, &self.schema)
            .into_iter()
            .collect();
        if unifiers.is_empty() {
            return Err(QueryCacheError::Unfamilied {
                query: query.to_string(),
            });
        }
        Ok(unifiers)
    }

    fn bindings(&self, entry: usize, query: &AtomicQuery) -> Result<Vec<Binding>, QueryCacheError> {
        let ids = query.bound_ids();
        Ok(self
            .to_entry(entry, query)?
            .iter()
            .map(|u| ids.iter().map(|(v, id)| (u.rename(v), id.clone())).collect())
            .collect())
    }

    fn create_entry(&mut self, query: &AtomicQuery) -> Result<usize, QueryCacheError> {
        let family = self.family_of(query);
        let index = self.entries.len();
        let mut entry = CacheEntry::new(query.clone(), family.clone());
        let has_ids = entry.has_ids();

        let members = self.families.get(&family).cloned().unwrap_or_default();
        for other in members {
            let existing = &self.entries[other];
            if !existing.has_ids() && existing.query.subsumes(query, &self.schema) {
                entry.parents.insert(other);
            } else if !has_ids && query.subsumes(&existing.query, &self.schema) {
                entry.children.insert(other);
            }
        }
        for &parent in &entry.parents {
            self.entries[parent].children.insert(index);
        }
        for &child in &entry.children {
            self.entries[child].parents.insert(index);
        }

        CacheEntryCreated {
            query,
            family: family.as_ref(),
            parents: entry.parents.len(),
            children: entry.children.len(),
        }
        .log();

        self.index.insert(query.key().as_str().to_string(), index);
        self.families.entry(family).or_default().push(index);
        let parents: Vec<usize> = entry.parents.iter().copied().collect();
        self.entries.push(entry);

        for parent in parents {
            if self.entries[parent].complete.is_all() {
                self.propagate(parent, index, true)?;
                self.entries[index].complete.set_all();
            } else if self.entries[parent].db_complete.is_all() {
                self.propagate(parent, index, false)?;
                self.entries[index].db_complete.set_all();
            }
        }
        Ok(index)
    }

    fn insert(
        &mut self,
        entry: usize,
        query: &AtomicQuery,
        answer: &ConceptMap,
    ) -> Result<bool, QueryCacheError> {
        let mut added = false;
        for unifier in self.to_entry(entry, query)? {
            if let Some(renamed) = unifier.apply_to_answer(answer) {
                added |= self.entries[entry].insert(renamed);
            }
        }
        Ok(added)
    }

    fn read(&self, entry: usize, query: &AtomicQuery) -> Result<Vec<ConceptMap>, QueryCacheError> {
        self.read_filtered(entry, query, query)
    }

    /// Answers of `entry` renamed onto `shape`'s variables and kept when `filter` holds.
    fn read_filtered(
        &self,
        entry: usize,
        shape: &AtomicQuery,
        filter: &AtomicQuery,
    ) -> Result<Vec<ConceptMap>, QueryCacheError> {
        let Some(to_entry) = self.to_entry(entry, shape)?.into_iter().next() else {
            return Ok(Vec::new());
        };
        let from_entry = to_entry.inverse();
        let mut seen = HashSet::new();
        Ok(self.entries[entry]
            .answers()
            .iter()
            .filter_map(|answer| from_entry.apply_to_answer(answer))
            .filter(|answer| filter.satisfied_by(answer, &self.schema))
            .filter(|answer| seen.insert(answer.clone()))
            .collect())
    }

    /// Specialises every eligible answer of `parent` into `child`.
    fn propagate(
        &mut self,
        parent: usize,
        child: usize,
        inferred: bool,
    ) -> Result<usize, QueryCacheError> {
        let general = self.entries[parent].query.clone();
        let specific = self.entries[child].query.without_ids();
        let required = specific.atom_variables();
        let mut specialised = Vec::new();
        for unifier in general.subsumption_unifiers(&specific, &self.schema) {
            let difference =
                SemanticDifference::between(&general, &specific, &unifier, &self.schema);
            for answer in self.entries[parent].answers() {
                if !inferred && answer.is_inferred() {
                    continue;
                }
                let Some(renamed) = unifier.apply_to_answer(answer) else {
                    continue;
                };
                if !difference.apply(&renamed, &self.schema) {
                    continue;
                }
                if !renamed.covers(&required) {
                    return Err(QueryCacheError::IncompleteAnswer {
                        query: specific.to_string(),
                        answer: renamed.to_string(),
                    });
                }
                specialised.push(renamed);
            }
        }
        let added = specialised
            .into_iter()
            .filter(|answer| self.entries[child].insert(answer.clone()))
            .count();
        if added > 0 {
            AnswersPropagated {
                parent: &general,
                child: &self.entries[child].query,
                count: added,
            }
            .log();
        }
        Ok(added)
    }

    /// Hands completeness of `root` down through its descendants, answers first.
    fn cascade(&mut self, root: usize, complete: bool) -> Result<(), QueryCacheError> {
        let mut queue = VecDeque::from([root]);
        let mut visited = HashSet::from([root]);
        while let Some(parent) = queue.pop_front() {
            let children: Vec<usize> = self.entries[parent].children.iter().copied().collect();
            for child in children {
                if !visited.insert(child) {
                    continue;
                }
                let done = if complete {
                    self.entries[child].complete.is_all()
                } else {
                    self.entries[child].db_complete.is_all()
                };
                if done {
                    continue;
                }
                self.propagate(parent, child, complete)?;
                if complete {
                    self.entries[child].complete.set_all();
                } else {
                    self.entries[child].db_complete.set_all();
                }
                queue.push_back(child);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Atom, Comparator, Concept, Predicate, RolePlayer, Value, Variable};
    use crate::schema::{InMemoryGraph, TypeKind};
    use proptest::prelude::*;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::default()
                .with_type("person", TypeKind::Entity, None)
                .with_type("employee", TypeKind::Entity, Some("person"))
                .with_type("age", TypeKind::Attribute, None)
                .with_type("friend", TypeKind::Role, None)
                .with_type("friendship", TypeKind::Relation, None),
        )
    }

    fn graph(schema: &Arc<Schema>) -> Arc<InMemoryGraph> {
        let graph = InMemoryGraph::new(Arc::clone(schema));
        for (id, age) in [("a", 30), ("b", 40), ("c", 30)] {
            graph.add_concept(id, "person", None).unwrap();
            let attribute = format!("age-{id}");
            graph
                .add_concept(&attribute, "age", Some(Value::Long(age)))
                .unwrap();
            graph.add_ownership(id, &attribute).unwrap();
        }
        Arc::new(graph)
    }

    fn people() -> AtomicQuery {
        AtomicQuery::new(Atom::isa("x", "person"))
    }

    fn ids(answers: &[ConceptMap], var: &str) -> Vec<String> {
        let mut ids: Vec<String> = answers
            .iter()
            .filter_map(|a| a.get(&Variable::new(var)))
            .map(|c| c.id.to_string())
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn complete_parents_answer_children_without_storage() {
        let schema = schema();
        let graph = graph(&schema);
        let mut cache = SemanticCache::new(graph.clone(), Arc::clone(&schema));

        let all = cache.get_answer_stream(&people()).unwrap();
        assert_eq!(ids(&all, "x"), vec!["a", "b", "c"]);
        cache.ack_completeness(&people()).unwrap();
        let served = graph.query_count();

        let thirty = AtomicQuery::new(Atom::isa("x", "person"))
            .with_predicate(Predicate::has("x", "age", Value::Long(30)));
        let answers = cache.get_answer_stream(&thirty).unwrap();
        assert_eq!(ids(&answers, "x"), vec!["a", "c"]);
        assert_eq!(graph.query_count(), served);
        assert!(cache.is_complete(&thirty));
        assert_eq!(cache.parents_of(&thirty), vec![people()]);
    }

    #[test]
    fn alpha_equivalent_queries_share_an_entry() {
        let schema = schema();
        let mut cache = SemanticCache::new(graph(&schema), Arc::clone(&schema));
        cache.get_answer_stream(&people()).unwrap();
        let renamed = AtomicQuery::new(Atom::isa("who", "person"));
        assert!(cache.is_db_complete(&renamed));
        let answers = cache.get_answer_stream(&renamed).unwrap();
        assert_eq!(ids(&answers, "who"), vec!["a", "b", "c"]);
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn ground_queries_track_completeness_per_binding() {
        let schema = schema();
        let mut cache = SemanticCache::new(graph(&schema), Arc::clone(&schema));
        let a = people().with_predicate(Predicate::id("x", "a"));
        let b = people().with_predicate(Predicate::id("x", "b"));

        let answers = cache.get_answer_stream(&a).unwrap();
        assert_eq!(ids(&answers, "x"), vec!["a"]);
        cache.ack_completeness(&a).unwrap();
        assert!(cache.is_complete(&a));
        assert!(!cache.is_complete(&b));
        assert!(!cache.is_db_complete(&b));
        assert!(cache.answers_query(&a));
        assert!(!cache.answers_query(&b));
    }

    #[test]
    fn ground_queries_read_through_incomplete_parents() {
        let schema = schema();
        let graph = graph(&schema);
        let mut cache = SemanticCache::new(graph.clone(), Arc::clone(&schema));
        let inferred = ConceptMap::new()
            .with(Variable::new("x"), Concept::new("z", "person"))
            .inferred(true);
        cache.record(&people(), inferred).unwrap();

        let z = people().with_predicate(Predicate::id("x", "z"));
        let answers = cache.get_answer_stream(&z).unwrap();
        assert_eq!(ids(&answers, "x"), vec!["z"]);
        assert!(answers[0].is_inferred());
    }

    #[test]
    fn answered_ground_queries_skip_storage() {
        let schema = schema();
        let graph = graph(&schema);
        let mut cache = SemanticCache::new(graph.clone(), Arc::clone(&schema));
        cache
            .record(
                &people(),
                ConceptMap::new().with(Variable::new("x"), Concept::new("a", "person")),
            )
            .unwrap();

        let a = people().with_predicate(Predicate::id("x", "a"));
        let answers = cache.get_answer_stream(&a).unwrap();

        assert_eq!(ids(&answers, "x"), vec!["a"]);
        assert_eq!(graph.query_count(), 0);
        assert!(cache.is_db_complete(&a));
        assert!(!cache.is_db_complete(&people()));

        let b = people().with_predicate(Predicate::id("x", "b"));
        let answers = cache.get_answer_stream(&b).unwrap();
        assert_eq!(ids(&answers, "x"), vec!["b"]);
        assert_eq!(graph.query_count(), 1);
    }

    #[test]
    fn completeness_reaches_existing_descendants() {
        let schema = schema();
        let mut cache = SemanticCache::new(graph(&schema), Arc::clone(&schema));
        let over_thirty =
            people().with_predicate(Predicate::value("x", Comparator::Gt, Value::Long(0)));
        let employees = AtomicQuery::new(Atom::isa("x", "employee"));
        cache
            .record(
                &employees,
                ConceptMap::new().with(Variable::new("x"), Concept::new("e", "employee")),
            )
            .unwrap();
        cache
            .record(
                &over_thirty,
                ConceptMap::new().with(Variable::new("x"), Concept::new("a", "person")),
            )
            .unwrap();
        cache
            .record(
                &people(),
                ConceptMap::new().with(Variable::new("x"), Concept::new("e", "employee")),
            )
            .unwrap();

        assert_eq!(cache.children_of(&people()).len(), 2);
        cache.ack_completeness(&people()).unwrap();
        assert!(cache.is_complete(&employees));
        assert!(cache.is_complete(&over_thirty));
        assert!(cache.is_db_complete(&employees));
    }

    #[test]
    fn symmetric_answers_are_indexed_under_both_assignments() {
        let schema = schema();
        let mut cache = SemanticCache::new(graph(&schema), Arc::clone(&schema));
        let friendship = AtomicQuery::new(Atom::relation(
            "_r",
            "friendship",
            vec![
                RolePlayer::new(Some("friend"), "x"),
                RolePlayer::new(Some("friend"), "y"),
            ],
        ));
        let answer = ConceptMap::new()
            .with(Variable::new("_r"), Concept::new("f", "friendship"))
            .with(Variable::new("x"), Concept::new("a", "person"))
            .with(Variable::new("y"), Concept::new("b", "person"));
        cache.record(&friendship, answer).unwrap();
        let from_b = friendship.with_predicate(Predicate::id("x", "b"));
        assert!(cache.answers_query(&from_b));
    }

    #[test]
    fn answers_missing_query_variables_are_rejected() {
        let schema = schema();
        let mut cache = SemanticCache::new(graph(&schema), Arc::clone(&schema));
        let err = cache.record(&people(), ConceptMap::new()).unwrap_err();
        assert!(matches!(err, QueryCacheError::IncompleteAnswer { .. }));
    }

    #[test]
    fn propagation_between_unrelated_families_is_refused() {
        let schema = schema();
        let mut cache = SemanticCache::new(graph(&schema), Arc::clone(&schema));
        let ages = AtomicQuery::new(Atom::isa("y", "age"));
        cache.get_answer_stream(&people()).unwrap();
        cache.get_answer_stream(&ages).unwrap();
        assert!(matches!(
            cache.propagate_answers(&people(), &ages, true),
            Err(QueryCacheError::Unfamilied { .. })
        ));
    }

    #[test]
    fn clear_forgets_completeness() {
        let schema = schema();
        let mut cache = SemanticCache::new(graph(&schema), Arc::clone(&schema));
        cache.get_answer_stream(&people()).unwrap();
        cache.ack_completeness(&people()).unwrap();
        cache.clear();
        assert_eq!(cache.entry_count(), 0);
        assert!(!cache.is_complete(&people()));
    }

    proptest! {
        #[test]
        fn recording_twice_changes_nothing(ids in proptest::collection::vec(0u8..8, 1..16)) {
            let schema = schema();
            let mut once = SemanticCache::new(graph(&schema), Arc::clone(&schema));
            let mut twice = SemanticCache::new(graph(&schema), Arc::clone(&schema));
            for id in &ids {
                let answer = ConceptMap::new()
                    .with(Variable::new("x"), Concept::new(format!("p{id}"), "person"));
                once.record(&people(), answer.clone()).unwrap();
                twice.record(&people(), answer.clone()).unwrap();
                let again = twice.record(&people(), answer).unwrap();
                prop_assert!(!again);
            }
            once.ack_completeness(&people()).unwrap();
            twice.ack_completeness(&people()).unwrap();
            let left = once.get_answer_stream(&people()).unwrap();
            let right = twice.get_answer_stream(&people()).unwrap();
            prop_assert_eq!(left, right);
        }

        #[test]
        fn specialised_answers_belong_to_the_parent(
            ages in proptest::collection::vec(20i64..24, 1..10),
            wanted in 20i64..24,
        ) {
            let schema = schema();
            let graph = InMemoryGraph::new(Arc::clone(&schema));
            for (i, age) in ages.iter().enumerate() {
                let person = format!("p{i}");
                let attribute = format!("age-{i}");
                graph.add_concept(&person, "person", None).unwrap();
                graph
                    .add_concept(&attribute, "age", Some(Value::Long(*age)))
                    .unwrap();
                graph.add_ownership(&person, &attribute).unwrap();
            }
            let mut cache = SemanticCache::new(Arc::new(graph), Arc::clone(&schema));
            let parent = people();
            let child = AtomicQuery::new(Atom::isa("y", "person"))
                .with_predicate(Predicate::has("y", "age", Value::Long(wanted)));

            let general = cache.get_answer_stream(&parent).unwrap();
            cache.ack_completeness(&parent).unwrap();
            let specific = cache.get_answer_stream(&child).unwrap();

            let expected = ages.iter().filter(|&&age| age == wanted).count();
            prop_assert_eq!(specific.len(), expected);
            let to_child = parent
                .subsumption_unifiers(&child, &schema)
                .into_iter()
                .next()
                .unwrap();
            let to_parent = to_child.inverse();
            let identity = Unifier::identity(&child.atom_variables());
            for answer in &specific {
                prop_assert!(child.satisfied_by(answer, &schema));
                let generalised = to_parent.apply_to_answer(answer).unwrap();
                prop_assert!(general.contains(&generalised));
                let round_trip = identity
                    .apply_to_answer(&identity.inverse().apply_to_answer(answer).unwrap())
                    .unwrap();
                prop_assert_eq!(&round_trip, answer);
            }
        }

        #[test]
        fn completeness_is_monotonic(acks in proptest::collection::vec(0u8..3, 1..12)) {
            let schema = schema();
            let mut cache = SemanticCache::new(graph(&schema), Arc::clone(&schema));
            let queries = [
                people(),
                AtomicQuery::new(Atom::isa("x", "employee")),
                people().with_predicate(Predicate::has("x", "age", Value::Long(30))),
            ];
            let mut completed: Vec<usize> = Vec::new();
            for ack in acks {
                let query = &queries[ack as usize];
                cache.get_answer_stream(query).unwrap();
                cache.ack_completeness(query).unwrap();
                completed.push(ack as usize);
                for &done in &completed {
                    prop_assert!(cache.is_complete(&queries[done]));
                    prop_assert!(cache.is_db_complete(&queries[done]));
                }
            }
        }
    }
}
