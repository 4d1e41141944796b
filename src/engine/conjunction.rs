// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::processor::{ProcessorBehaviour, ProcessorContext};
use crate::engine::request::{AnswerTransform, Bounds, ControllerId};
use crate::errors::ResolutionError;
use crate::pattern::{AtomicQuery, ConceptMap, Conjunction, Variable};
use crate::reactive::{ReactiveId, SourceFactory};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Left-to-right join over the atoms of a conjunction.
///
/// Level `k` holds partial answers covering the first `k + 1` atoms. Every partial answer
/// reaching the expand stage after level `k` opens one connection to the concludable
/// controller of atom `k + 1`, bounded by the variables the two share; the answers that
/// come back are merged with the partial answer on the producer side. Complete answers are
/// filtered by the conjunction's predicates and negations before the hub.
pub struct ConjunctionProcessor {
    conjunction: Conjunction,
    bounds: ConceptMap,
    plan: Vec<AtomicQuery>,
    buffers: Vec<ReactiveId>,
    /// Expand stage -> the level its packets open connections for.
    levels: HashMap<ReactiveId, usize>,
}

impl ConjunctionProcessor {
    pub fn new(conjunction: Conjunction, bounds: ConceptMap) -> Self {
        let bound: BTreeSet<Variable> = bounds.variables().cloned().collect();
        let plan = plan(&conjunction, &bound);
        Self {
            conjunction,
            bounds,
            plan,
            buffers: Vec::new(),
            levels: HashMap::new(),
        }
    }

    fn request_level(&self, ctx: &mut ProcessorContext<'_>, level: usize, partial: ConceptMap) {
        let query = self.plan[level].clone();
        let bounds = partial.project(&query.atom_variables()).inferred(false);
        let merge: AnswerTransform = Arc::new(move |answer: ConceptMap| answer.merge(&partial));
        ctx.request_connection(
            ControllerId::concludable(query),
            Bounds::Answer(bounds),
            vec![merge],
            self.buffers[level],
        );
    }
}

impl ProcessorBehaviour for ConjunctionProcessor {
    fn setup(&mut self, ctx: &mut ProcessorContext<'_>) -> Result<ReactiveId, ResolutionError> {
        let mut accept = acceptor(
            &self.conjunction,
            Arc::clone(&ctx.registry.schema),
            Arc::clone(&ctx.registry.negations),
        );
        let filter = ctx
            .graph
            .flat_map(move |answer| accept(answer).map(|kept| kept.into_iter().collect()));
        let distinct = ctx.graph.distinct();
        let hub = ctx.graph.broadcast();
        ctx.connect(filter, distinct);
        ctx.connect(distinct, hub);

        if self.plan.is_empty() {
            let seed = self.bounds.clone();
            let source: SourceFactory<ConceptMap> = Box::new(move || {
                Ok(Box::new(std::iter::once(seed)) as Box<dyn Iterator<Item = ConceptMap> + Send>)
            });
            let source = ctx.graph.source(source);
            ctx.connect(source, filter);
            return Ok(hub);
        }

        self.buffers = (0..self.plan.len()).map(|_| ctx.graph.buffer()).collect();
        for level in 1..self.plan.len() {
            let expand = ctx.graph.expand();
            ctx.connect(self.buffers[level - 1], expand);
            ctx.connect(expand, self.buffers[level]);
            self.levels.insert(expand, level);
        }
        let last = self.buffers[self.plan.len() - 1];
        ctx.connect(last, filter);

        self.request_level(ctx, 0, self.bounds.clone());
        Ok(hub)
    }

    fn on_expand(
        &mut self,
        ctx: &mut ProcessorContext<'_>,
        stage: ReactiveId,
        packet: ConceptMap,
    ) -> Result<(), ResolutionError> {
        match self.levels.get(&stage) {
            Some(&level) => {
                self.request_level(ctx, level, packet);
                Ok(())
            }
            None => panic!("{} is not an expand stage of {}", stage, ctx.name()),
        }
    }
}

/// Orders the atoms so each one shares as many variables as possible with what is already
/// bound. Ties keep the written order.
pub(crate) fn plan(conjunction: &Conjunction, bound: &BTreeSet<Variable>) -> Vec<AtomicQuery> {
    let mut remaining = conjunction.atomic_queries();
    let mut bound = bound.clone();
    let mut ordered = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let mut best = 0;
        let mut best_score = None;
        for (index, query) in remaining.iter().enumerate() {
            let pinned = query.bound_ids();
            let score = query
                .atom_variables()
                .iter()
                .filter(|v| bound.contains(*v) || pinned.contains_key(*v))
                .count();
            if best_score.map_or(true, |best| score > best) {
                best = index;
                best_score = Some(score);
            }
        }
        let next = remaining.remove(best);
        bound.extend(next.atom_variables());
        ordered.push(next);
    }
    ordered
}

/// Final check on a complete answer: predicates spanning several atoms, then negations.
/// A negation rejects the answer when any of its answers agrees with it on the variables
/// the two share.
fn acceptor(
    conjunction: &Conjunction,
    schema: Arc<crate::schema::Schema>,
    negations: Arc<crate::engine::registry::NegationTable>,
) -> impl FnMut(ConceptMap) -> Result<Option<ConceptMap>, ResolutionError> + Send + 'static {
    let conjunction = conjunction.clone();
    let outer = conjunction.variables();
    let shared: Vec<(String, BTreeSet<Variable>)> = conjunction
        .negations
        .iter()
        .map(|negation| {
            let shared = negation.variables().intersection(&outer).cloned().collect();
            (negation.key(), shared)
        })
        .collect();

    move |answer: ConceptMap| {
        if !conjunction.satisfied_by(&answer, &schema) {
            return Ok(None);
        }
        for (key, shared) in &shared {
            let Some(table) = negations.get(key) else {
                return Err(ResolutionError::NegationCycle {
                    negation: key.clone(),
                });
            };
            if table
                .iter()
                .any(|negated| negated.project(shared).merge(&answer).is_some())
            {
                return Ok(None);
            }
        }
        Ok(Some(answer))
    }
}
