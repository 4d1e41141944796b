// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::conclusion::ConclusionProcessor;
use crate::engine::concludable::ConcludableProcessor;
use crate::engine::conjunction::ConjunctionProcessor;
use crate::engine::mailbox::Mailbox;
use crate::engine::processor::{Processor, ProcessorBehaviour, ProcessorHandle};
use crate::engine::registry::ControllerRegistry;
use crate::engine::request::{Bounds, ControllerId, Request};
use crate::errors::{FailureStrategy, ResolutionError};
use crate::observability::messages::processor::{
    ProcessorFailed, ProcessorFaultTolerated, ProcessorSpawned,
};
use crate::observability::messages::StructuredLog;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};

pub enum ControllerMessage {
    Route(Request),
    Exception {
        processor: String,
        error: ResolutionError,
    },
}

pub type ControllerHandle = Mailbox<ControllerMessage>;

/// Owns every processor spawned for one [`ControllerId`], one per distinct set of bounds,
/// and supervises their tasks.
pub struct Controller {
    id: ControllerId,
    handle: ControllerHandle,
    registry: Arc<ControllerRegistry>,
    processors: HashMap<Bounds, ProcessorHandle>,
    tasks: JoinSet<()>,
}

impl Controller {
    pub fn new(
        id: ControllerId,
        registry: Arc<ControllerRegistry>,
    ) -> (Self, mpsc::UnboundedReceiver<ControllerMessage>) {
        let (handle, receiver) = Mailbox::new(registry.monitor.clone());
        let controller = Self {
            id,
            handle,
            registry,
            processors: HashMap::new(),
            tasks: JoinSet::new(),
        };
        (controller, receiver)
    }

    pub fn handle(&self) -> &ControllerHandle {
        &self.handle
    }

    pub async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<ControllerMessage>) {
        let token = self.registry.token.clone();
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                message = receiver.recv() => match message {
                    Some(message) => {
                        self.on_message(message);
                        self.registry.monitor.processed();
                    }
                    None => break,
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(error) = joined {
                        self.on_task_failure(error);
                    }
                }
            }
        }
        self.tasks.shutdown().await;
    }

    fn on_message(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::Route(request) => {
                let processor = match self.processors.get(&request.bounds) {
                    Some(processor) => processor.clone(),
                    None => self.spawn_processor(&request.bounds),
                };
                processor.establish_connection(request);
            }
            ControllerMessage::Exception { processor, error } => {
                self.on_exception(processor, error)
            }
        }
    }

    fn spawn_processor(&mut self, bounds: &Bounds) -> ProcessorHandle {
        let id = self.registry.next_processor_id();
        let name = format!("{}#{}", self.id.kind(), id);
        ProcessorSpawned {
            processor: &name,
            controller: self.id.key(),
            bounds: &bounds.to_string(),
        }
        .log();

        let behaviour = behaviour_for(&self.id, bounds);
        let (processor, receiver) = Processor::new(
            id,
            name,
            behaviour,
            self.handle.clone(),
            Arc::clone(&self.registry),
        );
        let handle = processor.handle().clone();
        self.tasks
            .spawn(processor.run(receiver, self.registry.token.clone()));
        self.processors.insert(bounds.clone(), handle.clone());
        handle
    }

    fn on_exception(&mut self, processor: String, error: ResolutionError) {
        match self.registry.failure_strategy {
            FailureStrategy::FailFast => {
                ProcessorFailed {
                    processor: &processor,
                    error: &error,
                }
                .log();
                self.registry.monitor.fail(error);
            }
            FailureStrategy::ContinueOnError | FailureStrategy::BestEffort => {
                let strategy = match self.registry.failure_strategy {
                    FailureStrategy::BestEffort => "best_effort",
                    _ => "continue_on_error",
                };
                ProcessorFaultTolerated {
                    processor: &processor,
                    strategy,
                    error: &error,
                }
                .log();
                let faulty: Vec<Bounds> = self
                    .processors
                    .iter()
                    .filter(|(_, handle)| handle.name() == processor)
                    .map(|(bounds, _)| bounds.clone())
                    .collect();
                for bounds in faulty {
                    if let Some(handle) = self.processors.remove(&bounds) {
                        handle.halt();
                    }
                }
            }
        }
    }

    /// A processor task that dies takes its queued messages with it, so the episode can no
    /// longer go quiet. It fails whatever the strategy.
    fn on_task_failure(&mut self, error: JoinError) {
        if error.is_cancelled() {
            return;
        }
        let reason = match error.try_into_panic() {
            Ok(payload) => payload
                .downcast_ref::<String>()
                .cloned()
                .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
                .unwrap_or_else(|| "processor panicked".to_string()),
            Err(error) => error.to_string(),
        };
        let error = ResolutionError::ProcessorFailed {
            processor: self.id.key().to_string(),
            reason,
        };
        ProcessorFailed {
            processor: self.id.key(),
            error: &error,
        }
        .log();
        self.registry.monitor.fail(error);
    }
}

fn behaviour_for(id: &ControllerId, bounds: &Bounds) -> Box<dyn ProcessorBehaviour> {
    let concepts = bounds.concepts().clone();
    match id {
        ControllerId::Concludable { query, .. } => {
            Box::new(ConcludableProcessor::new(query.clone(), concepts))
        }
        ControllerId::Conclusion {
            rule, materialise, ..
        } => Box::new(ConclusionProcessor::new(
            Arc::clone(rule),
            *materialise,
            concepts,
        )),
        ControllerId::Conjunction { conjunction, .. } => {
            Box::new(ConjunctionProcessor::new(conjunction.clone(), concepts))
        }
    }
}
