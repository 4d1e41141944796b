// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::processor::{ProcessorBehaviour, ProcessorContext};
use crate::engine::request::{AnswerTransform, Bounds, ControllerId};
use crate::errors::ResolutionError;
use crate::pattern::{AtomicQuery, ConceptMap, Unifier};
use crate::reactive::{ReactiveId, SourceFactory};
use crate::schema::Schema;
use std::sync::Arc;

/// Answers one atomic query under fixed bounds: whatever the cache (and behind it storage)
/// holds, plus one conclusion stream per applicable rule and unifier while the bound query
/// is not yet known to be complete. Inferred answers are recorded into the cache on their
/// way to the hub.
pub struct ConcludableProcessor {
    query: AtomicQuery,
    bounds: ConceptMap,
}

impl ConcludableProcessor {
    pub fn new(query: AtomicQuery, bounds: ConceptMap) -> Self {
        Self { query, bounds }
    }
}

impl ProcessorBehaviour for ConcludableProcessor {
    fn setup(&mut self, ctx: &mut ProcessorContext<'_>) -> Result<ReactiveId, ResolutionError> {
        let registry = Arc::clone(ctx.registry);
        let bound = self.query.with_bounds(&self.bounds);
        registry.record_resolved(bound.clone());

        let buffer = ctx.graph.buffer();
        let record = {
            let cache = Arc::clone(&registry.cache);
            let bound = bound.clone();
            ctx.graph.flat_map(move |answer: ConceptMap| {
                if answer.is_inferred() {
                    cache.lock().record(&bound, answer.clone())?;
                }
                Ok(vec![answer])
            })
        };
        let distinct = ctx.graph.distinct();
        let hub = ctx.graph.broadcast();
        ctx.connect(buffer, record);
        ctx.connect(record, distinct);
        ctx.connect(distinct, hub);

        let stored: SourceFactory<ConceptMap> = {
            let cache = Arc::clone(&registry.cache);
            let bound = bound.clone();
            Box::new(move || {
                let answers = cache.lock().get_answer_stream(&bound)?;
                Ok(Box::new(answers.into_iter()) as Box<dyn Iterator<Item = ConceptMap> + Send>)
            })
        };
        let stored = ctx.graph.source(stored);
        ctx.connect(stored, buffer);

        if registry.cache.lock().is_complete(&bound) {
            return Ok(hub);
        }

        for (rule, unifiers) in registry.rules.applicable_rules(&bound) {
            for unifier in unifiers.iter() {
                let state = rule.sub_goal(&bound, unifier, &self.bounds);
                let transform = unify_back(
                    unifier.clone(),
                    self.bounds.clone(),
                    bound.clone(),
                    Arc::clone(&registry.schema),
                );
                ctx.request_connection(
                    ControllerId::conclusion(state.rule, state.materialise),
                    Bounds::Head(state.head_bounds),
                    vec![transform],
                    buffer,
                );
            }
        }
        Ok(hub)
    }
}

/// Carries a head answer back onto the query's variables, keeping it only when it agrees
/// with the bounds and satisfies the query's own predicates.
fn unify_back(
    unifier: Unifier,
    bounds: ConceptMap,
    query: AtomicQuery,
    schema: Arc<Schema>,
) -> AnswerTransform {
    let scope = query.atom_variables();
    Arc::new(move |answer: ConceptMap| {
        let renamed = unifier.apply_to_answer(&answer)?.inferred(true);
        let merged = renamed.merge(&bounds)?.project(&scope);
        (merged.covers(&scope) && query.satisfied_by(&merged, &schema)).then_some(merged)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Atom, Concept, Predicate, RolePlayer, Variable};
    use crate::schema::TypeKind;

    fn v(name: &str) -> Variable {
        Variable::new(name)
    }

    #[test]
    fn head_answers_are_renamed_checked_and_marked_inferred() {
        let schema = Arc::new(
            Schema::default()
                .with_type("person", TypeKind::Entity, None)
                .with_type("knows", TypeKind::Relation, None),
        );
        let query = AtomicQuery::new(Atom::relation(
            "r",
            "knows",
            vec![RolePlayer::new(None, "a"), RolePlayer::new(None, "b")],
        ))
        .with_predicate(Predicate::id("a", "V1"));
        let mut unifier = Unifier::new();
        unifier.insert(v("_k"), v("r"), true);
        unifier.insert(v("x"), v("a"), true);
        unifier.insert(v("y"), v("b"), true);
        let bounds = ConceptMap::new().with(v("a"), Concept::new("V1", "person"));
        let transform = unify_back(unifier, bounds, query, schema);

        let head = |from: &str| {
            ConceptMap::new()
                .with(v("_k"), Concept::new(format!("knows({})", from), "knows"))
                .with(v("x"), Concept::new(from, "person"))
                .with(v("y"), Concept::new("V3", "person"))
        };
        let kept = transform(head("V1")).expect("agrees with the bounds");
        assert!(kept.is_inferred());
        assert_eq!(kept.get(&v("b")).map(|c| c.id.as_str()), Some("V3"));
        assert!(transform(head("V2")).is_none());
    }
}
