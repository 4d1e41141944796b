// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::mailbox::Mailbox;
use crate::engine::processor::ProcessorHandle;
use crate::pattern::{AtomicQuery, ConceptMap, Conjunction};
use crate::reactive::ReactiveId;
use crate::rules::InferenceRule;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Applied on the producer side between its hub and the new output; `None` drops the answer.
pub type AnswerTransform = Arc<dyn Fn(ConceptMap) -> Option<ConceptMap> + Send + Sync>;

/// What a processor is asked to answer for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Bounds {
    /// A partial answer over the variables of the query being resolved.
    Answer(ConceptMap),
    /// Parent bounds carried onto the head variables of a rule.
    Head(ConceptMap),
}

impl Bounds {
    pub fn concepts(&self) -> &ConceptMap {
        match self {
            Bounds::Answer(map) | Bounds::Head(map) => map,
        }
    }
}

impl Display for Bounds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Bounds::Answer(map) => write!(f, "{}", map),
            Bounds::Head(map) => write!(f, "head {}", map),
        }
    }
}

/// Names the controller a request is routed to. Two ids are the same controller when their
/// keys match.
#[derive(Debug, Clone)]
pub enum ControllerId {
    Concludable {
        key: String,
        query: AtomicQuery,
    },
    Conclusion {
        key: String,
        rule: Arc<InferenceRule>,
        materialise: bool,
    },
    Conjunction {
        key: String,
        conjunction: Conjunction,
    },
}

impl ControllerId {
    /// Keyed by the query as written: answers come back over its own variable names.
    pub fn concludable(query: AtomicQuery) -> Self {
        ControllerId::Concludable {
            key: format!("concludable[{}]", query),
            query,
        }
    }

    pub fn conclusion(rule: Arc<InferenceRule>, materialise: bool) -> Self {
        let mode = if materialise { "materialise" } else { "stream" };
        ControllerId::Conclusion {
            key: format!("conclusion[{}|{}]", rule, mode),
            rule,
            materialise,
        }
    }

    pub fn conjunction(conjunction: Conjunction) -> Self {
        ControllerId::Conjunction {
            key: format!("conjunction[{}]", conjunction.key()),
            conjunction,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            ControllerId::Concludable { key, .. }
            | ControllerId::Conclusion { key, .. }
            | ControllerId::Conjunction { key, .. } => key,
        }
    }

    /// Prefix of the names given to this controller's processors.
    pub fn kind(&self) -> &'static str {
        match self {
            ControllerId::Concludable { .. } => "concludable",
            ControllerId::Conclusion { .. } => "conclusion",
            ControllerId::Conjunction { .. } => "conjunction",
        }
    }
}

impl PartialEq for ControllerId {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ControllerId {}

impl Hash for ControllerId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl Display for ControllerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Where the producer sends answers once the connection is finished.
#[derive(Clone)]
pub enum Consumer {
    Processor(ProcessorHandle),
    Driver(Mailbox<DriverMessage>),
}

/// Messages the episode driver receives.
pub enum DriverMessage {
    Connected {
        input: ReactiveId,
        output: ReactiveId,
        producer: ProcessorHandle,
    },
    Answer {
        input: ReactiveId,
        answer: ConceptMap,
    },
}

/// A consumer's ask for a stream of answers. Routed by the registry to the controller named
/// by `controller`, which hands it to the processor for `bounds`.
pub struct Request {
    /// The consumer-side input the producer's new output will feed.
    pub input: ReactiveId,
    pub consumer: Consumer,
    pub controller: ControllerId,
    pub bounds: Bounds,
    pub transforms: Vec<AnswerTransform>,
}

impl Request {
    /// Runs the transform chain in order.
    pub fn transform(transforms: &[AnswerTransform], answer: ConceptMap) -> Option<ConceptMap> {
        transforms
            .iter()
            .try_fold(answer, |answer, transform| transform(answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Atom, Concept, Variable};

    #[test]
    fn controller_ids_compare_by_key() {
        let a = ControllerId::concludable(AtomicQuery::new(Atom::isa("x", "person")));
        let b = ControllerId::concludable(AtomicQuery::new(Atom::isa("x", "person")));
        let c = ControllerId::concludable(AtomicQuery::new(Atom::isa("y", "person")));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.kind(), "concludable");
    }

    #[test]
    fn transforms_run_in_order_and_stop_at_the_first_rejection() {
        let x = Variable::new("x");
        let tag: AnswerTransform = Arc::new(|answer: ConceptMap| Some(answer.inferred(true)));
        let only_v1: AnswerTransform = {
            let x = x.clone();
            Arc::new(move |answer: ConceptMap| {
                (answer.get(&x).map(|c| c.id.as_str()) == Some("V1")).then_some(answer)
            })
        };
        let chain = vec![tag, only_v1];

        let v1 = ConceptMap::new().with(x.clone(), Concept::new("V1", "person"));
        let v2 = ConceptMap::new().with(x, Concept::new("V2", "person"));
        let kept = Request::transform(&chain, v1).expect("V1 passes");
        assert!(kept.is_inferred());
        assert!(Request::transform(&chain, v2).is_none());
    }

    #[test]
    fn head_and_answer_bounds_are_distinct() {
        let map = ConceptMap::new().with(Variable::new("x"), Concept::new("V1", "person"));
        assert_ne!(Bounds::Answer(map.clone()), Bounds::Head(map.clone()));
        assert_eq!(Bounds::Head(map.clone()).concepts(), &map);
    }
}
