// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The processor actor.
//!
//! A processor owns one [`ReactiveGraph`] and is the only task that touches it. Other actors
//! talk to it through its [`ProcessorHandle`]. What a processor computes is supplied by a
//! [`ProcessorBehaviour`]; the actor itself only moves packets, finishes connections and
//! retries pulls that arrived before their connection did.

use crate::engine::controller::{ControllerHandle, ControllerMessage};
use crate::engine::mailbox::Mailbox;
use crate::engine::monitor::MonitorHandle;
use crate::engine::registry::ControllerRegistry;
use crate::engine::request::{
    AnswerTransform, Bounds, Consumer, ControllerId, DriverMessage, Request,
};
use crate::errors::ResolutionError;
use crate::observability::messages::processor::ConnectionEstablished;
use crate::observability::messages::StructuredLog;
use crate::pattern::ConceptMap;
use crate::reactive::{Effect, ReactiveGraph, ReactiveId};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub enum ProcessorMessage {
    Pull {
        output: ReactiveId,
    },
    Receive {
        input: ReactiveId,
        packet: ConceptMap,
        sender: ReactiveId,
    },
    EstablishConnection(Request),
    FinishConnection {
        input: ReactiveId,
        output: ReactiveId,
        producer: ProcessorHandle,
    },
    RetryPull {
        publisher: ReactiveId,
        subscriber: ReactiveId,
    },
    /// Stop answering; queued and later messages are only acknowledged.
    Halt,
}

/// Cloneable address of a processor actor. Only supports enqueueing messages.
#[derive(Clone)]
pub struct ProcessorHandle {
    name: Arc<str>,
    mailbox: Mailbox<ProcessorMessage>,
}

impl ProcessorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pull(&self, output: ReactiveId) {
        self.mailbox.send(ProcessorMessage::Pull { output });
    }

    pub fn receive(&self, input: ReactiveId, packet: ConceptMap, sender: ReactiveId) {
        self.mailbox.send(ProcessorMessage::Receive {
            input,
            packet,
            sender,
        });
    }

    pub fn establish_connection(&self, request: Request) {
        self.mailbox.send(ProcessorMessage::EstablishConnection(request));
    }

    pub fn finish_connection(
        &self,
        input: ReactiveId,
        output: ReactiveId,
        producer: ProcessorHandle,
    ) {
        self.mailbox.send(ProcessorMessage::FinishConnection {
            input,
            output,
            producer,
        });
    }

    pub fn halt(&self) {
        self.mailbox.send(ProcessorMessage::Halt);
    }

    fn send(&self, message: ProcessorMessage) {
        self.mailbox.send(message);
    }
}

/// What a processor does with its graph.
pub trait ProcessorBehaviour: Send + 'static {
    /// Builds the graph and returns the hub every connection is served from.
    fn setup(&mut self, ctx: &mut ProcessorContext<'_>) -> Result<ReactiveId, ResolutionError>;

    /// Handles a packet that reached one of the behaviour's expand stages.
    fn on_expand(
        &mut self,
        _ctx: &mut ProcessorContext<'_>,
        stage: ReactiveId,
        _packet: ConceptMap,
    ) -> Result<(), ResolutionError> {
        panic!("expand stage {} on a processor that never builds one", stage)
    }
}

/// The slice of a processor a behaviour may use while building or growing its graph.
pub struct ProcessorContext<'a> {
    pub graph: &'a mut ReactiveGraph<ConceptMap>,
    pub registry: &'a Arc<ControllerRegistry>,
    handle: &'a ProcessorHandle,
    effects: &'a mut Vec<Effect<ConceptMap>>,
}

impl ProcessorContext<'_> {
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Wires two local stages, keeping whatever the wiring set in motion.
    pub fn connect(&mut self, publisher: ReactiveId, subscriber: ReactiveId) {
        let effects = self.graph.connect(publisher, subscriber);
        self.effects.extend(effects);
    }

    /// Creates an input feeding `subscriber` and asks the controller named by `controller`
    /// for a stream of answers into it.
    pub fn request_connection(
        &mut self,
        controller: ControllerId,
        bounds: Bounds,
        transforms: Vec<AnswerTransform>,
        subscriber: ReactiveId,
    ) -> ReactiveId {
        let input = self.graph.input();
        self.registry.route(Request {
            input,
            consumer: Consumer::Processor(self.handle.clone()),
            controller,
            bounds,
            transforms,
        });
        self.connect(input, subscriber);
        input
    }
}

pub struct Processor {
    handle: ProcessorHandle,
    controller: ControllerHandle,
    registry: Arc<ControllerRegistry>,
    graph: ReactiveGraph<ConceptMap>,
    behaviour: Box<dyn ProcessorBehaviour>,
    hub: Option<ReactiveId>,
    started: bool,
    halted: bool,
    /// Input -> (producer, the producer's output feeding it).
    providers: HashMap<ReactiveId, (ProcessorHandle, ReactiveId)>,
    /// Output -> (consumer, the consumer's input it feeds).
    consumers: HashMap<ReactiveId, (Consumer, ReactiveId)>,
    pull_retries: BTreeSet<(ReactiveId, ReactiveId)>,
}

impl Processor {
    pub fn new(
        id: u64,
        name: String,
        behaviour: Box<dyn ProcessorBehaviour>,
        controller: ControllerHandle,
        registry: Arc<ControllerRegistry>,
    ) -> (Self, mpsc::UnboundedReceiver<ProcessorMessage>) {
        let (mailbox, receiver) = Mailbox::new(registry.monitor.clone());
        let handle = ProcessorHandle {
            name: name.into(),
            mailbox,
        };
        let processor = Self {
            handle,
            controller,
            registry,
            graph: ReactiveGraph::new(id),
            behaviour,
            hub: None,
            started: false,
            halted: false,
            providers: HashMap::new(),
            consumers: HashMap::new(),
            pull_retries: BTreeSet::new(),
        };
        (processor, receiver)
    }

    pub fn handle(&self) -> &ProcessorHandle {
        &self.handle
    }

    fn monitor(&self) -> &MonitorHandle {
        &self.registry.monitor
    }

    pub async fn run(
        mut self,
        mut receiver: mpsc::UnboundedReceiver<ProcessorMessage>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                message = receiver.recv() => match message {
                    Some(message) => {
                        self.on_message(message);
                        self.monitor().processed();
                    }
                    None => break,
                },
            }
        }
        tracing::trace!(
            processor = self.handle.name(),
            nodes = self.graph.len(),
            "Processor stopped"
        );
    }

    fn on_message(&mut self, message: ProcessorMessage) {
        if !self.started {
            self.started = true;
            self.setup();
        }
        if let ProcessorMessage::Halt = message {
            self.halted = true;
        }
        if self.halted {
            return;
        }
        match message {
            ProcessorMessage::Pull { output } => {
                let effects = self.graph.pull_output(output);
                self.apply(effects);
            }
            ProcessorMessage::Receive {
                input,
                packet,
                sender,
            } => {
                debug_assert!(
                    self.providers.get(&input).map(|(_, output)| *output) == Some(sender),
                    "input {} received from {} it is not bound to",
                    input,
                    sender
                );
                let effects = self.graph.receive_input(input, packet);
                self.apply(effects);
            }
            ProcessorMessage::EstablishConnection(request) => self.establish_connection(request),
            ProcessorMessage::FinishConnection {
                input,
                output,
                producer,
            } => self.finish_connection(input, output, producer),
            ProcessorMessage::RetryPull {
                publisher,
                subscriber,
            } => {
                let effects = self.graph.pull(publisher, subscriber);
                self.apply(effects);
            }
            ProcessorMessage::Halt => {}
        }
    }

    fn setup(&mut self) {
        let mut effects = Vec::new();
        let result = {
            let mut ctx = ProcessorContext {
                graph: &mut self.graph,
                registry: &self.registry,
                handle: &self.handle,
                effects: &mut effects,
            };
            self.behaviour.setup(&mut ctx)
        };
        match result {
            Ok(hub) => {
                self.hub = Some(hub);
                self.apply(effects);
            }
            Err(error) => {
                self.halted = true;
                self.raise(error);
            }
        }
    }

    /// Serves a routed request: a new output off the hub, the request's transforms in
    /// between, and the consumer told where to pull.
    fn establish_connection(&mut self, request: Request) {
        let Some(hub) = self.hub else {
            return;
        };
        let output = self.graph.output();
        let mut effects = Vec::new();
        if request.transforms.is_empty() {
            effects.extend(self.graph.connect(hub, output));
        } else {
            let transforms = request.transforms;
            let transform = self.graph.flat_map(move |answer| {
                Ok(Request::transform(&transforms, answer).into_iter().collect())
            });
            effects.extend(self.graph.connect(hub, transform));
            effects.extend(self.graph.connect(transform, output));
        }

        ConnectionEstablished {
            producer: self.handle.name(),
            input: &request.input.to_string(),
            output: &output.to_string(),
        }
        .log();

        match &request.consumer {
            Consumer::Processor(consumer) => {
                consumer.finish_connection(request.input, output, self.handle.clone())
            }
            Consumer::Driver(driver) => driver.send(DriverMessage::Connected {
                input: request.input,
                output,
                producer: self.handle.clone(),
            }),
        }
        self.consumers.insert(output, (request.consumer, request.input));
        self.apply(effects);
    }

    fn finish_connection(
        &mut self,
        input: ReactiveId,
        output: ReactiveId,
        producer: ProcessorHandle,
    ) {
        self.graph.finish_input(input);
        self.monitor().register_path(input, output);
        self.providers.insert(input, (producer, output));

        let ready: Vec<(ReactiveId, ReactiveId)> = self
            .pull_retries
            .iter()
            .filter(|(publisher, _)| *publisher == input)
            .copied()
            .collect();
        for (publisher, subscriber) in ready {
            self.pull_retries.remove(&(publisher, subscriber));
            self.handle.send(ProcessorMessage::RetryPull {
                publisher,
                subscriber,
            });
        }
    }

    /// Remembers a pull that cannot be served yet. It is re-sent as a fresh message once the
    /// publisher's connection is finished.
    fn schedule_pull_retry(&mut self, publisher: ReactiveId, subscriber: ReactiveId) {
        if self.graph.is_ready(publisher) {
            self.handle.send(ProcessorMessage::RetryPull {
                publisher,
                subscriber,
            });
        } else {
            self.pull_retries.insert((publisher, subscriber));
        }
    }

    fn apply(&mut self, effects: Vec<Effect<ConceptMap>>) {
        let mut queue: VecDeque<Effect<ConceptMap>> = effects.into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::PullRemote { input } => match self.providers.get(&input) {
                    Some((producer, output)) => producer.pull(*output),
                    None => panic!("input {} pulled before its connection finished", input),
                },
                Effect::AwaitConnection { input, subscriber } => {
                    self.schedule_pull_retry(input, subscriber)
                }
                Effect::Deliver { output, packet } => match self.consumers.get(&output) {
                    Some((Consumer::Processor(consumer), input)) => {
                        consumer.receive(*input, packet, output)
                    }
                    Some((Consumer::Driver(driver), input)) => driver.send(DriverMessage::Answer {
                        input: *input,
                        answer: packet,
                    }),
                    None => panic!("output {} has no consumer", output),
                },
                Effect::Expand { stage, packet } => {
                    let mut produced = Vec::new();
                    let result = {
                        let mut ctx = ProcessorContext {
                            graph: &mut self.graph,
                            registry: &self.registry,
                            handle: &self.handle,
                            effects: &mut produced,
                        };
                        self.behaviour.on_expand(&mut ctx, stage, packet)
                    };
                    if let Err(error) = result {
                        self.raise(error);
                    }
                    queue.extend(produced);
                }
                Effect::SourceExhausted { source } => {
                    tracing::trace!(processor = self.handle.name(), %source, "Source exhausted");
                }
                Effect::Fault { stage, error } => {
                    tracing::debug!(processor = self.handle.name(), %stage, %error, "Stage fault");
                    self.raise(error);
                }
            }
        }
    }

    /// Escalates a fault to the owning controller.
    fn raise(&self, error: ResolutionError) {
        self.controller.send(ControllerMessage::Exception {
            processor: self.handle.name().to_string(),
            error,
        });
    }
}
