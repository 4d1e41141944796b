// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::pattern::{AtomicQuery, ConceptId, ConceptMap, Label, Variable};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Identifier bindings of one query variant, over the entry's own variables.
pub(super) type Binding = BTreeMap<Variable, ConceptId>;

/// Which variants of an entry's query have reached a completeness level.
///
/// `all` covers every binding at once and is only ever set for entries whose query carries
/// no identifier predicate, or by propagation from such an entry.
#[derive(Debug, Default)]
pub(super) struct Completeness {
    all: bool,
    bindings: HashSet<Binding>,
}

impl Completeness {
    pub(super) fn contains(&self, binding: &Binding) -> bool {
        self.all || self.bindings.contains(binding)
    }

    pub(super) fn is_all(&self) -> bool {
        self.all
    }

    pub(super) fn set_all(&mut self) {
        self.all = true;
        self.bindings.clear();
    }

    pub(super) fn insert(&mut self, binding: Binding) {
        if binding.is_empty() {
            self.set_all();
        } else if !self.all {
            self.bindings.insert(binding);
        }
    }
}

/// One structural query shape. Queries that only differ in identifier values share an
/// entry; their answers are kept together and told apart when read.
#[derive(Debug)]
pub(super) struct CacheEntry {
    /// The first query recorded for this shape; answers are stored over its variables.
    pub(super) query: AtomicQuery,
    pub(super) family: Option<Label>,
    answers: Vec<ConceptMap>,
    seen: HashSet<ConceptMap>,
    pub(super) parents: BTreeSet<usize>,
    pub(super) children: BTreeSet<usize>,
    pub(super) db_complete: Completeness,
    pub(super) complete: Completeness,
}

impl CacheEntry {
    pub(super) fn new(query: AtomicQuery, family: Option<Label>) -> Self {
        Self {
            query,
            family,
            answers: Vec::new(),
            seen: HashSet::new(),
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            db_complete: Completeness::default(),
            complete: Completeness::default(),
        }
    }

    /// Adds an answer over the entry's variables; `false` if it was already there.
    pub(super) fn insert(&mut self, answer: ConceptMap) -> bool {
        if self.seen.contains(&answer) {
            return false;
        }
        self.seen.insert(answer.clone());
        self.answers.push(answer);
        true
    }

    pub(super) fn answers(&self) -> &[ConceptMap] {
        &self.answers
    }

    pub(super) fn has_ids(&self) -> bool {
        self.query.has_id_predicate()
    }

    pub(super) fn is_db_complete(&self, binding: &Binding) -> bool {
        self.db_complete.contains(binding) || self.complete.contains(binding)
    }
}
