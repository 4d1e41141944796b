// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::cache::SemanticCache;
use crate::engine::controller::{Controller, ControllerHandle, ControllerMessage};
use crate::engine::monitor::MonitorHandle;
use crate::engine::request::{ControllerId, Request};
use crate::errors::FailureStrategy;
use crate::pattern::{AtomicQuery, ConceptMap};
use crate::rules::RuleSet;
use crate::schema::{Schema, Storage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Answers of every negated conjunction, keyed by [`crate::pattern::Conjunction::key`].
pub type NegationTable = HashMap<String, Vec<ConceptMap>>;

/// Everything the actors of one episode share, plus the controllers spawned so far.
pub struct ControllerRegistry {
    pub cache: Arc<Mutex<SemanticCache>>,
    pub storage: Arc<dyn Storage>,
    pub rules: Arc<RuleSet>,
    pub schema: Arc<Schema>,
    pub negations: Arc<NegationTable>,
    pub monitor: MonitorHandle,
    pub token: CancellationToken,
    pub failure_strategy: FailureStrategy,
    controllers: Mutex<HashMap<ControllerId, ControllerHandle>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    resolved: Mutex<Vec<AtomicQuery>>,
    /// 0 belongs to the episode driver.
    next_processor: AtomicU64,
}

impl ControllerRegistry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: Arc<Mutex<SemanticCache>>,
        storage: Arc<dyn Storage>,
        rules: Arc<RuleSet>,
        negations: Arc<NegationTable>,
        monitor: MonitorHandle,
        token: CancellationToken,
        failure_strategy: FailureStrategy,
    ) -> Arc<Self> {
        let schema = Arc::clone(rules.schema());
        Arc::new(Self {
            cache,
            storage,
            rules,
            schema,
            negations,
            monitor,
            token,
            failure_strategy,
            controllers: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
            resolved: Mutex::new(Vec::new()),
            next_processor: AtomicU64::new(1),
        })
    }

    /// Hands `request` to the controller it names, starting that controller if needed.
    pub fn route(self: &Arc<Self>, request: Request) {
        let controller = self.get_or_create(&request.controller);
        controller.send(ControllerMessage::Route(request));
    }

    fn get_or_create(self: &Arc<Self>, id: &ControllerId) -> ControllerHandle {
        let mut controllers = self.controllers.lock();
        if let Some(handle) = controllers.get(id) {
            return handle.clone();
        }
        let (controller, receiver) = Controller::new(id.clone(), Arc::clone(self));
        let handle = controller.handle().clone();
        self.tasks.lock().push(tokio::spawn(controller.run(receiver)));
        controllers.insert(id.clone(), handle.clone());
        tracing::trace!(controller = id.key(), "Controller started");
        handle
    }

    pub fn next_processor_id(&self) -> u64 {
        self.next_processor.fetch_add(1, Ordering::Relaxed)
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.lock().len()
    }

    /// Notes a bound query a concludable processor answered, for completeness bookkeeping
    /// once the episode is over.
    pub fn record_resolved(&self, query: AtomicQuery) {
        self.resolved.lock().push(query);
    }

    pub fn resolved(&self) -> Vec<AtomicQuery> {
        self.resolved.lock().clone()
    }

    /// Cancels every actor of the episode and waits for the controllers to stop.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(error) = task.await {
                tracing::warn!(%error, "Controller task ended abnormally");
            }
        }
        self.controllers.lock().clear();
    }
}
