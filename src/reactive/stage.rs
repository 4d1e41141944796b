// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::ReactiveId;
use crate::errors::ResolutionError;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

pub type SourceFactory<P> =
    Box<dyn FnOnce() -> Result<Box<dyn Iterator<Item = P> + Send>, ResolutionError> + Send>;
pub type MapFn<P> = Box<dyn FnMut(P) -> P + Send>;
pub type FlatMapFn<P> = Box<dyn FnMut(P) -> Result<Vec<P>, ResolutionError> + Send>;

pub(super) enum SourceState<P> {
    Pending(SourceFactory<P>),
    Running(Box<dyn Iterator<Item = P> + Send>),
    Exhausted,
}

pub(super) enum Stage<P> {
    Source(Option<SourceState<P>>),
    Map(MapFn<P>),
    FlatMap {
        f: FlatMapFn<P>,
        pending: VecDeque<P>,
    },
    Buffer(VecDeque<P>),
    Distinct(HashSet<P>),
    Broadcast {
        log: Vec<P>,
        cursors: BTreeMap<ReactiveId, usize>,
    },
    Expand,
    Input {
        ready: bool,
        pulled: bool,
    },
    Output {
        waiting: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Arity {
    None,
    One,
    Many,
}

impl<P> Stage<P> {
    pub(super) fn name(&self) -> &'static str {
        match self {
            Stage::Source(_) => "source",
            Stage::Map(_) => "map",
            Stage::FlatMap { .. } => "flat_map",
            Stage::Buffer(_) => "buffer",
            Stage::Distinct(_) => "distinct",
            Stage::Broadcast { .. } => "broadcast",
            Stage::Expand => "expand",
            Stage::Input { .. } => "input",
            Stage::Output { .. } => "output",
        }
    }

    pub(super) fn publisher_arity(&self) -> Arity {
        match self {
            Stage::Source(_) | Stage::Input { .. } => Arity::None,
            Stage::Buffer(_) => Arity::Many,
            _ => Arity::One,
        }
    }

    pub(super) fn subscriber_arity(&self) -> Arity {
        match self {
            Stage::Output { .. } => Arity::None,
            Stage::Broadcast { .. } => Arity::Many,
            _ => Arity::One,
        }
    }
}

/// A stage plus its wiring.
pub(super) struct Node<P> {
    pub(super) stage: Stage<P>,
    pub(super) publishers: Vec<ReactiveId>,
    pub(super) subscribers: Vec<ReactiveId>,
    /// Subscribers whose pull has not been answered yet.
    pub(super) waiting: BTreeSet<ReactiveId>,
    /// Publishers pulled and not heard from since.
    pub(super) pulling: BTreeSet<ReactiveId>,
}

impl<P> Node<P> {
    pub(super) fn new(stage: Stage<P>) -> Self {
        Self {
            stage,
            publishers: Vec::new(),
            subscribers: Vec::new(),
            waiting: BTreeSet::new(),
            pulling: BTreeSet::new(),
        }
    }

    pub(super) fn has_demand(&self) -> bool {
        match &self.stage {
            Stage::Output { waiting } => *waiting,
            _ => !self.waiting.is_empty(),
        }
    }
}
