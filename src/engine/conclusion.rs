// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::processor::{ProcessorBehaviour, ProcessorContext};
use crate::engine::request::{Bounds, ControllerId};
use crate::errors::ResolutionError;
use crate::pattern::ConceptMap;
use crate::reactive::ReactiveId;
use crate::rules::InferenceRule;
use std::sync::Arc;

/// Turns answers of a rule body into answers of its head. Bounds are over the head's
/// variables; the part the body can use is passed on to the body's conjunction controller.
pub struct ConclusionProcessor {
    rule: Arc<InferenceRule>,
    materialise: bool,
    bounds: ConceptMap,
}

impl ConclusionProcessor {
    pub fn new(rule: Arc<InferenceRule>, materialise: bool, bounds: ConceptMap) -> Self {
        Self {
            rule,
            materialise,
            bounds,
        }
    }
}

impl ProcessorBehaviour for ConclusionProcessor {
    fn setup(&mut self, ctx: &mut ProcessorContext<'_>) -> Result<ReactiveId, ResolutionError> {
        let conclude = {
            let rule = Arc::clone(&self.rule);
            let storage = Arc::clone(&ctx.registry.storage);
            let schema = Arc::clone(&ctx.registry.schema);
            let bounds = self.bounds.clone();
            let materialise = self.materialise;
            ctx.graph.flat_map(move |body_answer: ConceptMap| {
                let head = rule.conclude(&body_answer, storage.as_ref(), &schema, materialise)?;
                Ok(head
                    .filter(|head| head.merge(&bounds).is_some())
                    .into_iter()
                    .collect())
            })
        };
        let distinct = ctx.graph.distinct();
        let hub = ctx.graph.broadcast();
        ctx.connect(conclude, distinct);
        ctx.connect(distinct, hub);

        let body_bounds = self
            .bounds
            .project(&self.rule.body_variables())
            .inferred(false);
        ctx.request_connection(
            ControllerId::conjunction(self.rule.body().clone()),
            Bounds::Answer(body_bounds),
            Vec::new(),
            conclude,
        );
        Ok(hub)
    }
}
