// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::stage::{Arity, FlatMapFn, Node, SourceFactory, SourceState, Stage};
use super::{Effect, ReactiveId};
use crate::errors::ResolutionError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

enum Signal<P> {
    /// `subscriber` is `None` for a pull that arrived from a remote consumer.
    Pull {
        node: ReactiveId,
        subscriber: Option<ReactiveId>,
    },
    /// `publisher` is `None` for a packet that arrived from a remote producer.
    Receive {
        node: ReactiveId,
        publisher: Option<ReactiveId>,
        packet: P,
    },
}

/// Arena of reactive stages owned by a single processor.
///
/// The graph is never shared: only the owning actor touches it, so none of it is locked.
/// Wiring mistakes (a second registration on a single-use side, a pull from a stage that
/// never subscribed, a packet nobody asked for) panic.
pub struct ReactiveGraph<P> {
    owner: u64,
    next_seq: u64,
    nodes: HashMap<ReactiveId, Node<P>>,
    signals: VecDeque<Signal<P>>,
    effects: Vec<Effect<P>>,
}

impl<P> ReactiveGraph<P>
where
    P: Clone + Eq + Hash + Send + 'static,
{
    pub fn new(owner: u64) -> Self {
        Self {
            owner,
            next_seq: 0,
            nodes: HashMap::new(),
            signals: VecDeque::new(),
            effects: Vec::new(),
        }
    }

    pub fn owner(&self) -> u64 {
        self.owner
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Hands out the next identifier of this graph's owner.
    fn register_reactive(&mut self, stage: Stage<P>) -> ReactiveId {
        self.next_seq += 1;
        let id = ReactiveId {
            processor: self.owner,
            seq: self.next_seq,
        };
        self.nodes.insert(id, Node::new(stage));
        id
    }

    pub fn source(&mut self, factory: SourceFactory<P>) -> ReactiveId {
        self.register_reactive(Stage::Source(Some(SourceState::Pending(factory))))
    }

    pub fn map(&mut self, f: impl FnMut(P) -> P + Send + 'static) -> ReactiveId {
        self.register_reactive(Stage::Map(Box::new(f)))
    }

    pub fn flat_map(
        &mut self,
        f: impl FnMut(P) -> Result<Vec<P>, ResolutionError> + Send + 'static,
    ) -> ReactiveId {
        let f: FlatMapFn<P> = Box::new(f);
        self.register_reactive(Stage::FlatMap {
            f,
            pending: VecDeque::new(),
        })
    }

    pub fn buffer(&mut self) -> ReactiveId {
        self.register_reactive(Stage::Buffer(VecDeque::new()))
    }

    pub fn distinct(&mut self) -> ReactiveId {
        self.register_reactive(Stage::Distinct(HashSet::new()))
    }

    pub fn broadcast(&mut self) -> ReactiveId {
        self.register_reactive(Stage::Broadcast {
            log: Vec::new(),
            cursors: Default::default(),
        })
    }

    pub fn expand(&mut self) -> ReactiveId {
        self.register_reactive(Stage::Expand)
    }

    pub fn input(&mut self) -> ReactiveId {
        self.register_reactive(Stage::Input {
            ready: false,
            pulled: false,
        })
    }

    pub fn output(&mut self) -> ReactiveId {
        self.register_reactive(Stage::Output { waiting: false })
    }

    fn node_mut(&mut self, id: ReactiveId) -> &mut Node<P> {
        match self.nodes.get_mut(&id) {
            Some(node) => node,
            None => panic!("reactive node {} does not belong to processor {}", id, self.owner),
        }
    }

    pub fn register_publisher(&mut self, node: ReactiveId, publisher: ReactiveId) {
        let target = self.node_mut(node);
        match target.stage.publisher_arity() {
            Arity::None => panic!("{} stage {} takes no publisher", target.stage.name(), node),
            Arity::One => assert!(
                target.publishers.is_empty(),
                "publisher of {} stage {} registered twice",
                target.stage.name(),
                node
            ),
            Arity::Many => assert!(
                !target.publishers.contains(&publisher),
                "publisher {} registered twice on {}",
                publisher,
                node
            ),
        }
        target.publishers.push(publisher);
    }

    pub fn register_subscriber(&mut self, node: ReactiveId, subscriber: ReactiveId) {
        let target = self.node_mut(node);
        match target.stage.subscriber_arity() {
            Arity::None => panic!("{} stage {} takes no subscriber", target.stage.name(), node),
            Arity::One => assert!(
                target.subscribers.is_empty(),
                "subscriber of {} stage {} registered twice",
                target.stage.name(),
                node
            ),
            Arity::Many => assert!(
                !target.subscribers.contains(&subscriber),
                "subscriber {} registered twice on {}",
                subscriber,
                node
            ),
        }
        if let Stage::Broadcast { cursors, .. } = &mut target.stage {
            cursors.insert(subscriber, 0);
        }
        target.subscribers.push(subscriber);
    }

    /// Wires `publisher -> subscriber`. A subscriber that is already waiting for data pulls
    /// its new publisher straight away.
    pub fn connect(&mut self, publisher: ReactiveId, subscriber: ReactiveId) -> Vec<Effect<P>> {
        self.register_subscriber(publisher, subscriber);
        self.register_publisher(subscriber, publisher);
        if self.node_mut(subscriber).has_demand() {
            self.drive(subscriber);
        }
        self.run()
    }

    pub fn pull(&mut self, publisher: ReactiveId, subscriber: ReactiveId) -> Vec<Effect<P>> {
        self.signals.push_back(Signal::Pull {
            node: publisher,
            subscriber: Some(subscriber),
        });
        self.run()
    }

    /// A remote consumer pulled `output`.
    pub fn pull_output(&mut self, output: ReactiveId) -> Vec<Effect<P>> {
        self.signals.push_back(Signal::Pull {
            node: output,
            subscriber: None,
        });
        self.run()
    }

    /// A remote producer delivered `packet` to `input`.
    pub fn receive_input(&mut self, input: ReactiveId, packet: P) -> Vec<Effect<P>> {
        self.signals.push_back(Signal::Receive {
            node: input,
            publisher: None,
            packet,
        });
        self.run()
    }

    /// Marks `input` as bound to its remote output. Binding twice panics.
    pub fn finish_input(&mut self, input: ReactiveId) {
        match &mut self.node_mut(input).stage {
            Stage::Input { ready, .. } => {
                assert!(!*ready, "input {} connected twice", input);
                *ready = true;
            }
            other => panic!("{} stage {} is not an input", other.name(), input),
        }
    }

    pub fn is_ready(&self, input: ReactiveId) -> bool {
        matches!(
            self.nodes.get(&input).map(|n| &n.stage),
            Some(Stage::Input { ready: true, .. })
        )
    }

    fn run(&mut self) -> Vec<Effect<P>> {
        while let Some(signal) = self.signals.pop_front() {
            match signal {
                Signal::Pull { node, subscriber } => self.on_pull(node, subscriber),
                Signal::Receive {
                    node,
                    publisher,
                    packet,
                } => self.on_receive(node, publisher, packet),
            }
        }
        std::mem::take(&mut self.effects)
    }

    fn on_pull(&mut self, id: ReactiveId, subscriber: Option<ReactiveId>) {
        let node = self.node_mut(id);
        match subscriber {
            Some(subscriber) => {
                assert!(
                    node.subscribers.contains(&subscriber),
                    "{} pulled {} without subscribing to it",
                    subscriber,
                    id
                );
                node.waiting.insert(subscriber);
            }
            None => match &mut node.stage {
                Stage::Output { waiting } => *waiting = true,
                other => panic!("remote pull on {} stage {}", other.name(), id),
            },
        }
        self.drive(id);
    }

    fn on_receive(&mut self, id: ReactiveId, publisher: Option<ReactiveId>, packet: P) {
        let Some(node) = self.nodes.get_mut(&id) else {
            panic!("packet for unknown reactive node {}", id);
        };
        match publisher {
            Some(publisher) => assert!(
                node.pulling.remove(&publisher),
                "{} received from {} without pulling it",
                id,
                publisher
            ),
            None => match &mut node.stage {
                Stage::Input { pulled, .. } => {
                    assert!(*pulled, "input {} received a packet it did not pull", id);
                    *pulled = false;
                }
                other => panic!("remote packet on {} stage {}", other.name(), id),
            },
        }

        let forward = match &mut node.stage {
            Stage::Source(_) => panic!("source {} has no publisher", id),
            Stage::Map(f) => Some(f(packet)),
            Stage::FlatMap { f, pending } => {
                match f(packet) {
                    Ok(packets) => pending.extend(packets),
                    Err(error) => self.effects.push(Effect::Fault { stage: id, error }),
                }
                None
            }
            Stage::Buffer(packets) => {
                packets.push_back(packet);
                None
            }
            Stage::Distinct(seen) => seen.insert(packet.clone()).then_some(packet),
            Stage::Broadcast { log, .. } => {
                log.push(packet);
                None
            }
            Stage::Expand => {
                self.effects.push(Effect::Expand { stage: id, packet });
                None
            }
            Stage::Input { .. } => Some(packet),
            Stage::Output { waiting } => {
                assert!(*waiting, "output {} received without a remote pull", id);
                *waiting = false;
                self.effects.push(Effect::Deliver { output: id, packet });
                return;
            }
        };

        match forward {
            Some(packet) => {
                let Some(subscriber) = node.waiting.pop_first() else {
                    panic!("{} has a packet but no waiting subscriber", id);
                };
                self.signals.push_back(Signal::Receive {
                    node: subscriber,
                    publisher: Some(id),
                    packet,
                });
            }
            None => self.drive(id),
        }
    }

    /// Tries to answer waiting subscribers from what the stage holds, pulling upstream
    /// otherwise.
    fn drive(&mut self, id: ReactiveId) {
        let Some(node) = self.nodes.get_mut(&id) else {
            panic!("drive on unknown reactive node {}", id);
        };
        let signals = &mut self.signals;
        let effects = &mut self.effects;
        let first_waiting = node.waiting.first().copied();

        match &mut node.stage {
            Stage::Source(state) => {
                let Some(subscriber) = first_waiting else {
                    return;
                };
                let mut running = match state.take() {
                    Some(SourceState::Pending(factory)) => match factory() {
                        Ok(iterator) => iterator,
                        Err(error) => {
                            *state = Some(SourceState::Exhausted);
                            effects.push(Effect::Fault { stage: id, error });
                            effects.push(Effect::SourceExhausted { source: id });
                            return;
                        }
                    },
                    Some(SourceState::Running(iterator)) => iterator,
                    Some(SourceState::Exhausted) | None => {
                        *state = Some(SourceState::Exhausted);
                        return;
                    }
                };
                match running.next() {
                    Some(packet) => {
                        *state = Some(SourceState::Running(running));
                        node.waiting.remove(&subscriber);
                        signals.push_back(Signal::Receive {
                            node: subscriber,
                            publisher: Some(id),
                            packet,
                        });
                    }
                    None => {
                        *state = Some(SourceState::Exhausted);
                        effects.push(Effect::SourceExhausted { source: id });
                    }
                }
            }
            Stage::FlatMap { pending: held, .. } | Stage::Buffer(held) => {
                let Some(subscriber) = first_waiting else {
                    return;
                };
                match held.pop_front() {
                    Some(packet) => {
                        node.waiting.remove(&subscriber);
                        signals.push_back(Signal::Receive {
                            node: subscriber,
                            publisher: Some(id),
                            packet,
                        });
                    }
                    None => pull_publishers(node, id, signals),
                }
            }
            Stage::Broadcast { log, cursors } => {
                let waiting: Vec<ReactiveId> = node.waiting.iter().copied().collect();
                for subscriber in waiting {
                    let cursor = cursors.entry(subscriber).or_insert(0);
                    if let Some(packet) = log.get(*cursor) {
                        *cursor += 1;
                        node.waiting.remove(&subscriber);
                        signals.push_back(Signal::Receive {
                            node: subscriber,
                            publisher: Some(id),
                            packet: packet.clone(),
                        });
                    }
                }
                if !node.waiting.is_empty() {
                    pull_publishers(node, id, signals);
                }
            }
            Stage::Input { ready, pulled } => {
                let Some(subscriber) = first_waiting else {
                    return;
                };
                if !*ready {
                    effects.push(Effect::AwaitConnection {
                        input: id,
                        subscriber,
                    });
                } else if !*pulled {
                    *pulled = true;
                    effects.push(Effect::PullRemote { input: id });
                }
            }
            Stage::Map(_) | Stage::Distinct(_) | Stage::Expand | Stage::Output { .. } => {
                if node.has_demand() {
                    pull_publishers(node, id, signals);
                }
            }
        }
    }
}

fn pull_publishers<P>(node: &mut Node<P>, id: ReactiveId, signals: &mut VecDeque<Signal<P>>) {
    for publisher in &node.publishers {
        if node.pulling.insert(*publisher) {
            signals.push_back(Signal::Pull {
                node: *publisher,
                subscriber: Some(id),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn source_of(items: Vec<u32>) -> SourceFactory<u32> {
        Box::new(move || Ok(Box::new(items.into_iter()) as Box<dyn Iterator<Item = u32> + Send>))
    }

    fn delivered(effects: &[Effect<u32>]) -> Vec<u32> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Deliver { packet, .. } => Some(*packet),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn one_packet_per_remote_pull() {
        let mut graph = ReactiveGraph::new(1);
        let source = graph.source(source_of(vec![1, 2]));
        let double = graph.map(|x| x * 2);
        let output = graph.output();
        graph.connect(source, double);
        graph.connect(double, output);

        assert_eq!(delivered(&graph.pull_output(output)), vec![2]);
        assert_eq!(delivered(&graph.pull_output(output)), vec![4]);
        let last = graph.pull_output(output);
        assert!(delivered(&last).is_empty());
        assert!(matches!(last[..], [Effect::SourceExhausted { .. }]));
    }

    #[test]
    fn flat_map_repulls_on_empty_output_and_buffers_extras() {
        let mut graph = ReactiveGraph::new(1);
        let source = graph.source(source_of(vec![1, 2, 3]));
        let evens_twice = graph.flat_map(|x| Ok(if x % 2 == 0 { vec![x, x] } else { vec![] }));
        let output = graph.output();
        graph.connect(source, evens_twice);
        graph.connect(evens_twice, output);

        assert_eq!(delivered(&graph.pull_output(output)), vec![2]);
        assert_eq!(delivered(&graph.pull_output(output)), vec![2]);
        assert!(delivered(&graph.pull_output(output)).is_empty());
    }

    #[test]
    fn flat_map_fault_drops_the_packet() {
        let mut graph = ReactiveGraph::new(1);
        let source = graph.source(source_of(vec![1, 2]));
        let picky = graph.flat_map(|x| {
            if x == 1 {
                Err(ResolutionError::ProcessorFailed {
                    processor: "test".into(),
                    reason: "odd".into(),
                })
            } else {
                Ok(vec![x])
            }
        });
        let output = graph.output();
        graph.connect(source, picky);
        graph.connect(picky, output);

        let effects = graph.pull_output(output);
        assert!(effects.iter().any(|e| matches!(e, Effect::Fault { .. })));
        assert_eq!(delivered(&effects), vec![2]);
    }

    #[test]
    fn distinct_suppresses_repeats() {
        let mut graph = ReactiveGraph::new(1);
        let source = graph.source(source_of(vec![1, 1, 2, 1]));
        let distinct = graph.distinct();
        let output = graph.output();
        graph.connect(source, distinct);
        graph.connect(distinct, output);

        assert_eq!(delivered(&graph.pull_output(output)), vec![1]);
        assert_eq!(delivered(&graph.pull_output(output)), vec![2]);
        assert!(delivered(&graph.pull_output(output)).is_empty());
    }

    #[test]
    fn input_pulled_before_connection_asks_for_a_retry() {
        let mut graph: ReactiveGraph<u32> = ReactiveGraph::new(1);
        let input = graph.input();
        let buffer = graph.buffer();
        let output = graph.output();
        graph.connect(input, buffer);
        graph.connect(buffer, output);

        let effects = graph.pull_output(output);
        assert!(matches!(
            effects[..],
            [Effect::AwaitConnection { input: i, subscriber: s }] if i == input && s == buffer
        ));

        graph.finish_input(input);
        let effects = graph.pull(input, buffer);
        assert!(matches!(effects[..], [Effect::PullRemote { input: i }] if i == input));
        assert_eq!(delivered(&graph.receive_input(input, 7)), vec![7]);
    }

    #[test]
    fn buffer_pulls_late_publishers_while_waiting() {
        let mut graph = ReactiveGraph::new(1);
        let buffer = graph.buffer();
        let output = graph.output();
        graph.connect(buffer, output);
        assert!(graph.pull_output(output).is_empty());

        let source = graph.source(source_of(vec![5]));
        let effects = graph.connect(source, buffer);
        assert_eq!(delivered(&effects), vec![5]);
    }

    #[test]
    fn broadcast_replays_to_late_subscribers() {
        let mut graph = ReactiveGraph::new(1);
        let source = graph.source(source_of(vec![1, 2]));
        let hub = graph.broadcast();
        graph.connect(source, hub);

        let early = graph.output();
        graph.connect(hub, early);
        assert_eq!(delivered(&graph.pull_output(early)), vec![1]);
        assert_eq!(delivered(&graph.pull_output(early)), vec![2]);

        let late = graph.output();
        graph.connect(hub, late);
        assert_eq!(delivered(&graph.pull_output(late)), vec![1]);
        assert_eq!(delivered(&graph.pull_output(late)), vec![2]);
    }

    #[test]
    fn expand_turns_packets_into_effects_while_demand_lasts() {
        let mut graph = ReactiveGraph::new(1);
        let source = graph.source(source_of(vec![1, 2]));
        let expand = graph.expand();
        let buffer = graph.buffer();
        let output = graph.output();
        graph.connect(source, expand);
        graph.connect(expand, buffer);
        graph.connect(buffer, output);

        let effects = graph.pull_output(output);
        let expanded: Vec<u32> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::Expand { packet, .. } => Some(*packet),
                _ => None,
            })
            .collect();
        assert_eq!(expanded, vec![1, 2]);
        assert!(delivered(&effects).is_empty());
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn second_subscriber_on_single_use_stage_panics() {
        let mut graph: ReactiveGraph<u32> = ReactiveGraph::new(1);
        let map = graph.map(|x| x);
        let a = graph.output();
        let b = graph.output();
        graph.connect(map, a);
        graph.connect(map, b);
    }

    #[test]
    #[should_panic(expected = "connected twice")]
    fn binding_an_input_twice_panics() {
        let mut graph: ReactiveGraph<u32> = ReactiveGraph::new(1);
        let input = graph.input();
        graph.finish_input(input);
        graph.finish_input(input);
    }

    proptest! {
        #[test]
        fn receives_never_outnumber_pulls(
            items in proptest::collection::vec(0u32..8, 0..24),
            pulls in proptest::collection::vec(any::<bool>(), 0..48),
        ) {
            let mut graph = ReactiveGraph::new(1);
            let source = graph.source(source_of(items));
            let fanned = graph.flat_map(|x| Ok(vec![x; (x % 3) as usize]));
            let distinct = graph.distinct();
            let hub = graph.broadcast();
            let left = graph.output();
            let right = graph.output();
            graph.connect(source, fanned);
            graph.connect(fanned, distinct);
            graph.connect(distinct, hub);
            graph.connect(hub, left);
            graph.connect(hub, right);

            let (mut left_pulls, mut right_pulls) = (0usize, 0usize);
            let (mut left_seen, mut right_seen) = (Vec::new(), Vec::new());
            for pull_left in pulls {
                let output = if pull_left {
                    left_pulls += 1;
                    left
                } else {
                    right_pulls += 1;
                    right
                };
                for effect in graph.pull_output(output) {
                    if let Effect::Deliver { output: to, packet } = effect {
                        if to == left { left_seen.push(packet) } else { right_seen.push(packet) }
                    }
                }
                prop_assert!(left_seen.len() <= left_pulls);
                prop_assert!(right_seen.len() <= right_pulls);
            }
            let unique: HashSet<u32> = left_seen.iter().copied().collect();
            prop_assert_eq!(unique.len(), left_seen.len());
        }
    }
}
