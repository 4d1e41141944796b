// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cache::SemanticCache;
use crate::config::consts::{DEFAULT_EPISODE_TIMEOUT_MS, DEFAULT_MAX_ITERATIONS};
use crate::engine::mailbox::Mailbox;
use crate::engine::monitor::{EpisodeState, Monitor};
use crate::engine::registry::{ControllerRegistry, NegationTable};
use crate::engine::request::{Bounds, Consumer, ControllerId, DriverMessage, Request};
use crate::errors::{FailureStrategy, ResolutionError, RuleError};
use crate::observability::messages::engine::{
    EpisodeCompleted, EpisodeFailed, EpisodeStarted, NegationResolved, PartialResultReturned,
    ReiterationRequired, ResolutionCompleted,
};
use crate::observability::messages::rule::{RuleScheduled, RuleSetBuilt};
use crate::observability::messages::StructuredLog;
use crate::pattern::{AtomicQuery, ConceptMap, Conjunction};
use crate::reactive::ReactiveId;
use crate::rules::{stratify_rules, subgraph_is_cyclical, RuleSet};
use crate::schema::{Schema, Storage};
use crate::traits::QueryResolver;

/// The driver's only input. Processor 0 is reserved for it.
const DRIVER_INPUT: ReactiveId = ReactiveId {
    processor: 0,
    seq: 1,
};

/// Bounds on the work one `resolve` call may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReasonerOptions {
    /// Wall-clock limit for a single dataflow episode.
    pub episode_timeout: Duration,
    /// Episodes allowed before a cyclical rule set is given up on.
    pub max_iterations: usize,
}

impl Default for ReasonerOptions {
    fn default() -> Self {
        Self {
            episode_timeout: Duration::from_millis(DEFAULT_EPISODE_TIMEOUT_MS),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// What a single episode left behind.
struct Episode {
    answers: Vec<ConceptMap>,
    resolved: Vec<AtomicQuery>,
    outcome: Result<(), ResolutionError>,
}

/// Resolves conjunctive queries against storage and the schema's rules.
///
/// Each call runs inside one cache lifetime: the semantic cache is cleared on entry, negated
/// conjunctions are resolved first in stratum order, then the query itself is resolved by
/// one or more dataflow episodes. Episodes repeat while the rule set is cyclical on the
/// cached instances and new answers keep appearing.
///
/// Calls are serialized; the cache belongs to whichever call holds the reasoner.
pub struct Reasoner {
    storage: Arc<dyn Storage>,
    rules: Arc<RuleSet>,
    cache: Arc<parking_lot::Mutex<SemanticCache>>,
    options: ReasonerOptions,
    failure_strategy: FailureStrategy,
    transaction: tokio::sync::Mutex<()>,
}

impl Reasoner {
    /// Builds every rule the schema defines. Fails on the first malformed rule.
    pub fn new(schema: Arc<Schema>, storage: Arc<dyn Storage>) -> Result<Self, RuleError> {
        let rules = Arc::new(RuleSet::from_schema(Arc::clone(&schema))?);
        RuleSetBuilt {
            rule_count: rules.len(),
            stratified: rules.has_negation(),
        }
        .log();
        for (position, rule) in stratify_rules(&rules).enumerate() {
            RuleScheduled {
                rule: rule.label(),
                position,
                depth: rule.resolution_priority(&rules).depth,
            }
            .log();
        }

        let cache = SemanticCache::new(Arc::clone(&storage), schema);
        Ok(Self {
            storage,
            rules,
            cache: Arc::new(parking_lot::Mutex::new(cache)),
            options: ReasonerOptions::default(),
            failure_strategy: FailureStrategy::default(),
            transaction: tokio::sync::Mutex::new(()),
        })
    }

    pub fn with_options(mut self, options: ReasonerOptions) -> Self {
        self.options = options;
        self
    }

    /// Strategy used by [`QueryResolver::resolve`].
    pub fn with_failure_strategy(mut self, failure_strategy: FailureStrategy) -> Self {
        self.failure_strategy = failure_strategy;
        self
    }

    pub fn options(&self) -> &ReasonerOptions {
        &self.options
    }

    pub fn rules(&self) -> &Arc<RuleSet> {
        &self.rules
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// The cache of the most recent call, kept until the next one starts.
    pub fn cache(&self) -> &Arc<parking_lot::Mutex<SemanticCache>> {
        &self.cache
    }

    /// Resolves every negated conjunction reachable from `query`, innermost and lowest
    /// stratum first. A negation is only resolved once every negation its own rules need
    /// is known; when none can make progress the rules negate through a cycle.
    async fn resolve_negations(
        &self,
        query: &Conjunction,
        strategy: FailureStrategy,
    ) -> Result<NegationTable, ResolutionError> {
        let mut pending: Vec<Conjunction> = Vec::new();
        for rule in stratify_rules(&self.rules) {
            for negation in &rule.body().negations {
                collect_negations(negation, &mut pending);
            }
        }
        for negation in &query.negations {
            collect_negations(negation, &mut pending);
        }

        let mut table = NegationTable::new();
        while !pending.is_empty() {
            let ready = pending.iter().position(|negation| {
                self.supporting_negations(negation)
                    .iter()
                    .all(|needed| table.contains_key(&needed.key()))
            });
            let Some(index) = ready else {
                return Err(ResolutionError::NegationCycle {
                    negation: pending[0].to_string(),
                });
            };
            let negation = pending.remove(index);
            let (answers, _) = self
                .resolve_to_fixpoint(&negation, &Arc::new(table.clone()), strategy)
                .await?;
            NegationResolved {
                negation: &negation.to_string(),
                answers: answers.len(),
            }
            .log();
            table.insert(negation.key(), answers);
        }
        Ok(table)
    }

    /// Negations that must be answered before `conjunction` can be: its own, plus those in
    /// the bodies of every rule that may feed it, transitively.
    fn supporting_negations(&self, conjunction: &Conjunction) -> Vec<Conjunction> {
        let mut needed = conjunction.negations.clone();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut frontier: Vec<Conjunction> = vec![conjunction.clone()];
        while let Some(next) = frontier.pop() {
            for atom in &next.atoms {
                let feeding = match atom.label() {
                    Some(label) => self.rules.concludes(label),
                    None => self.rules.rules().to_vec(),
                };
                for rule in feeding {
                    if !seen.insert(rule.label().to_string()) {
                        continue;
                    }
                    needed.extend(rule.body().negations.iter().cloned());
                    frontier.push(rule.body().clone());
                }
            }
        }
        needed
    }

    /// Runs episodes for `conjunction` until its answers stop changing or the rule set is
    /// known not to need another pass. Returns the answers and the number of episodes run.
    async fn resolve_to_fixpoint(
        &self,
        conjunction: &Conjunction,
        negations: &Arc<NegationTable>,
        strategy: FailureStrategy,
    ) -> Result<(Vec<ConceptMap>, usize), ResolutionError> {
        let query = conjunction.to_string();
        let mut previous: Option<(HashSet<ConceptMap>, usize)> = None;
        let mut last: Vec<ConceptMap> = Vec::new();

        for iteration in 1..=self.options.max_iterations {
            let started = EpisodeStarted {
                query: &query,
                iteration,
            };
            started.log();
            let clock = Instant::now();
            let episode = self
                .run_episode(conjunction, negations, strategy)
                .instrument(started.span("resolution_episode"))
                .await;

            match episode.outcome {
                Ok(()) => {}
                Err(error @ ResolutionError::EpisodeTimeout { .. })
                    if strategy == FailureStrategy::BestEffort =>
                {
                    PartialResultReturned {
                        query: &query,
                        answers: episode.answers.len(),
                        reason: &error,
                    }
                    .log();
                    return Ok((episode.answers, iteration));
                }
                Err(error) => {
                    EpisodeFailed {
                        query: &query,
                        error: &error,
                    }
                    .log();
                    return Err(error);
                }
            }
            EpisodeCompleted {
                query: &query,
                iteration,
                answers: episode.answers.len(),
                duration: clock.elapsed(),
            }
            .log();

            let (cyclical, cached) = {
                let cache = self.cache.lock();
                (subgraph_is_cyclical(&self.rules, &cache), cache.answer_count())
            };
            let answers: HashSet<ConceptMap> = episode.answers.iter().cloned().collect();
            let fixpoint = previous
                .as_ref()
                .is_some_and(|(seen, count)| *seen == answers && *count == cached);
            if !cyclical || fixpoint {
                self.ack_completeness(&episode.resolved)?;
                return Ok((episode.answers, iteration));
            }

            ReiterationRequired {
                query: &query,
                iteration,
                new_answers: answers
                    .len()
                    .saturating_sub(previous.as_ref().map_or(0, |(seen, _)| seen.len())),
            }
            .log();
            previous = Some((answers, cached));
            last = episode.answers;
        }

        let error = ResolutionError::IterationLimit {
            iterations: self.options.max_iterations,
        };
        if strategy == FailureStrategy::BestEffort {
            PartialResultReturned {
                query: &query,
                answers: last.len(),
                reason: &error,
            }
            .log();
            return Ok((last, self.options.max_iterations));
        }
        EpisodeFailed {
            query: &query,
            error: &error,
        }
        .log();
        Err(error)
    }

    fn ack_completeness(&self, resolved: &[AtomicQuery]) -> Result<(), ResolutionError> {
        let mut cache = self.cache.lock();
        for query in resolved {
            cache.ack_completeness(query)?;
        }
        Ok(())
    }

    /// One pass of the dataflow: a fresh monitor, registry and set of actors, driven until
    /// the monitor sees the episode go quiet, fail or time out.
    async fn run_episode(
        &self,
        conjunction: &Conjunction,
        negations: &Arc<NegationTable>,
        strategy: FailureStrategy,
    ) -> Episode {
        let token = CancellationToken::new();
        let (monitor, mut state, monitor_task) = Monitor::spawn(token.clone());
        let registry = ControllerRegistry::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.storage),
            Arc::clone(&self.rules),
            Arc::clone(negations),
            monitor.clone(),
            token,
            strategy,
        );
        let (driver, mut inbox) = Mailbox::<DriverMessage>::new(monitor.clone());

        registry.route(Request {
            input: DRIVER_INPUT,
            consumer: Consumer::Driver(driver),
            controller: ControllerId::conjunction(conjunction.clone()),
            bounds: Bounds::Answer(ConceptMap::new()),
            transforms: Vec::new(),
        });

        let mut answers = Vec::new();
        let drive = drive(&mut inbox, &mut state, &monitor, &mut answers);
        let outcome = match tokio::time::timeout(self.options.episode_timeout, drive).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ResolutionError::EpisodeTimeout {
                timeout_ms: self.options.episode_timeout.as_millis() as u64,
            }),
        };

        registry.shutdown().await;
        if let Err(error) = monitor_task.await {
            tracing::warn!(%error, "Episode monitor ended abnormally");
        }
        Episode {
            answers,
            resolved: registry.resolved(),
            outcome,
        }
    }
}

/// Pulls answers off the root conjunction until the monitor reports a terminal state.
async fn drive(
    inbox: &mut mpsc::UnboundedReceiver<DriverMessage>,
    state: &mut tokio::sync::watch::Receiver<EpisodeState>,
    monitor: &crate::engine::monitor::MonitorHandle,
    answers: &mut Vec<ConceptMap>,
) -> Result<(), ResolutionError> {
    let mut producer = None;
    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    return Err(ResolutionError::ActorStopped {
                        actor: "monitor".to_string(),
                    });
                }
                match &*state.borrow_and_update() {
                    EpisodeState::Running => {}
                    EpisodeState::Done => return Ok(()),
                    EpisodeState::Failed(error) => return Err(error.clone()),
                }
            }
            message = inbox.recv() => {
                let Some(message) = message else {
                    return Err(ResolutionError::ActorStopped {
                        actor: "driver".to_string(),
                    });
                };
                match message {
                    DriverMessage::Connected { input, output, producer: handle } => {
                        monitor.register_path(input, output);
                        handle.pull(output);
                        producer = Some((handle, output));
                    }
                    DriverMessage::Answer { input, answer } => {
                        debug_assert_eq!(input, DRIVER_INPUT);
                        answers.push(answer);
                        if let Some((handle, output)) = &producer {
                            handle.pull(*output);
                        }
                    }
                }
                monitor.processed();
            }
        }
    }
}

/// Queues `negation` after every negation nested inside it.
fn collect_negations(negation: &Conjunction, pending: &mut Vec<Conjunction>) {
    for nested in &negation.negations {
        collect_negations(nested, pending);
    }
    if !pending.iter().any(|seen| seen.key() == negation.key()) {
        pending.push(negation.clone());
    }
}

/// Answers as callers see them: user-defined variables only, each once, in a stable order.
fn present(answers: Vec<ConceptMap>) -> Vec<ConceptMap> {
    let mut seen = HashSet::new();
    let mut presented: Vec<ConceptMap> = answers
        .into_iter()
        .map(|answer| answer.user_defined())
        .filter(|answer| seen.insert(answer.clone()))
        .collect();
    presented.sort_by_cached_key(|answer| answer.to_string());
    presented
}

#[async_trait]
impl QueryResolver for Reasoner {
    async fn resolve_with_strategy(
        &self,
        query: &Conjunction,
        failure_strategy: FailureStrategy,
    ) -> Result<Vec<ConceptMap>, ResolutionError> {
        let _transaction = self.transaction.lock().await;
        self.cache.lock().clear();

        let negations = Arc::new(self.resolve_negations(query, failure_strategy).await?);
        let (answers, iterations) = self
            .resolve_to_fixpoint(query, &negations, failure_strategy)
            .await?;
        let answers = present(answers);
        ResolutionCompleted {
            query: &query.to_string(),
            iterations,
            answers: answers.len(),
        }
        .log();
        Ok(answers)
    }

    fn default_strategy(&self) -> FailureStrategy {
        self.failure_strategy
    }
}
