// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Graph algorithms over rules and the types they read and write.
//!
//! # Type Dependency Graph
//!
//! Nodes are schema labels. Every rule contributes an edge from each type its body reads
//! (negated reads included) to the type its head writes, and every type has an edge to its
//! supertype, since concluding a subtype also concludes the supertype.
//!
//! # Algorithms
//!
//! - **Strongly connected components**: Tarjan's algorithm. Components come out sinks first:
//!   a component is emitted only after every component it can reach.
//! - **Stratification**: without negation, one global sort by resolution priority. With
//!   negation, strata are the components of the type dependency graph taken sources first,
//!   each sorted by priority.
//! - **Cyclicity**: a type-level cycle only forces reiteration when the cached instances of
//!   the cycle's relation and attribute types also form a cycle, or when the cache does not
//!   yet hold enough to tell.

use super::{InferenceRule, RuleSet};
use crate::cache::SemanticCache;
use crate::pattern::{Atom, ConceptId, Label};
use crate::schema::{Schema, TypeKind};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Strongly connected components of the graph spanned by `nodes` and `successors`.
/// Successors outside `nodes` are visited as well.
pub fn tarjan_scc<T, F>(nodes: &[T], successors: F) -> Vec<Vec<T>>
where
    T: Clone + Ord,
    F: Fn(&T) -> Vec<T>,
{
    struct State<T> {
        index: usize,
        indices: BTreeMap<T, usize>,
        lowlinks: BTreeMap<T, usize>,
        stack: Vec<T>,
        on_stack: BTreeSet<T>,
        components: Vec<Vec<T>>,
    }

    fn connect<T: Clone + Ord>(node: &T, successors: &dyn Fn(&T) -> Vec<T>, state: &mut State<T>) {
        state.indices.insert(node.clone(), state.index);
        state.lowlinks.insert(node.clone(), state.index);
        state.index += 1;
        state.stack.push(node.clone());
        state.on_stack.insert(node.clone());

        for next in successors(node) {
            if !state.indices.contains_key(&next) {
                connect(&next, successors, state);
                let low = state.lowlinks[node].min(state.lowlinks[&next]);
                state.lowlinks.insert(node.clone(), low);
            } else if state.on_stack.contains(&next) {
                let low = state.lowlinks[node].min(state.indices[&next]);
                state.lowlinks.insert(node.clone(), low);
            }
        }

        if state.lowlinks[node] == state.indices[node] {
            let mut component = Vec::new();
            while let Some(member) = state.stack.pop() {
                state.on_stack.remove(&member);
                let done = &member == node;
                component.push(member);
                if done {
                    break;
                }
            }
            state.components.push(component);
        }
    }

    let mut state = State {
        index: 0,
        indices: BTreeMap::new(),
        lowlinks: BTreeMap::new(),
        stack: Vec::new(),
        on_stack: BTreeSet::new(),
        components: Vec::new(),
    };
    for node in nodes {
        if !state.indices.contains_key(node) {
            connect(node, &successors, &mut state);
        }
    }
    state.components
}

/// A component is cyclic when it has more than one member or a member that is its own
/// successor.
fn is_cyclic<T: Clone + Ord>(component: &[T], successors: &impl Fn(&T) -> Vec<T>) -> bool {
    match component {
        [single] => successors(single).contains(single),
        _ => component.len() > 1,
    }
}

fn type_graph(rules: &RuleSet) -> BTreeMap<Label, BTreeSet<Label>> {
    let schema = rules.schema();
    let mut graph: BTreeMap<Label, BTreeSet<Label>> = BTreeMap::new();
    for definition in schema.types() {
        let edges = graph.entry(definition.label.clone()).or_default();
        if let Some(sup) = &definition.sup {
            edges.insert(sup.clone());
        }
    }
    for rule in rules.rules() {
        let then_types = rule.then_types();
        for when in rule.when_types() {
            graph.entry(when).or_default().extend(then_types.iter().cloned());
        }
        for then in then_types {
            graph.entry(then).or_default();
        }
    }
    graph
}

fn type_components(rules: &RuleSet) -> (BTreeMap<Label, BTreeSet<Label>>, Vec<Vec<Label>>) {
    let graph = type_graph(rules);
    let nodes: Vec<Label> = graph.keys().cloned().collect();
    let components = tarjan_scc(&nodes, |label| {
        graph
            .get(label)
            .map(|edges| edges.iter().cloned().collect())
            .unwrap_or_default()
    });
    (graph, components)
}

/// Rules in firing order. Without negation this is one sort by priority; with negation each
/// stratum's rules come out only after every stratum they read from.
pub fn stratify_rules(rules: &RuleSet) -> impl Iterator<Item = Arc<InferenceRule>> + '_ {
    let by_priority = move |mut stratum: Vec<Arc<InferenceRule>>| {
        stratum.sort_by(|a, b| {
            a.resolution_priority(rules)
                .cmp(&b.resolution_priority(rules))
                .then_with(|| a.label().cmp(b.label()))
        });
        stratum
    };

    let strata: Vec<Vec<Label>> = if rules.has_negation() {
        let (_, mut components) = type_components(rules);
        components.reverse();
        components
    } else {
        Vec::new()
    };

    let unstratified = (!rules.has_negation()).then(|| by_priority(rules.rules().to_vec()));

    let stratified = strata.into_iter().flat_map(move |stratum| {
        let members: BTreeSet<Label> = stratum.into_iter().collect();
        let concluding: Vec<Arc<InferenceRule>> = rules
            .rules()
            .iter()
            .filter(|rule| rule.then_types().iter().any(|t| members.contains(t)))
            .cloned()
            .collect();
        by_priority(concluding)
    });

    unstratified.into_iter().flatten().chain(stratified)
}

/// Whether resolving `rules` may need another pass over the dataflow before every answer is
/// found.
pub fn subgraph_is_cyclical(rules: &RuleSet, cache: &SemanticCache) -> bool {
    let (graph, components) = type_components(rules);
    let successors = |label: &Label| -> Vec<Label> {
        graph
            .get(label)
            .map(|edges| edges.iter().cloned().collect())
            .unwrap_or_default()
    };
    let cycles: Vec<&Vec<Label>> = components
        .iter()
        .filter(|c| is_cyclic(c.as_slice(), &successors))
        .collect();
    if cycles.is_empty() {
        return false;
    }

    let schema = rules.schema();
    let mut edges: BTreeMap<ConceptId, BTreeSet<ConceptId>> = BTreeMap::new();
    for cycle in cycles {
        for label in instance_labels(cycle, schema) {
            let Some(answers) = cache.complete_family_answers(&label) else {
                return true;
            };
            for (query, answer) in answers {
                let concepts: Vec<ConceptId> = match &query.atom {
                    Atom::Relation { role_players, .. } => role_players
                        .iter()
                        .filter_map(|rp| answer.get(&rp.player))
                        .map(|c| c.id.clone())
                        .collect(),
                    Atom::Has {
                        owner, attribute, ..
                    } => [owner, attribute]
                        .into_iter()
                        .filter_map(|v| answer.get(v))
                        .map(|c| c.id.clone())
                        .collect(),
                    Atom::Isa { .. } => Vec::new(),
                };
                if let Some((first, rest)) = concepts.split_first() {
                    edges
                        .entry(first.clone())
                        .or_default()
                        .extend(rest.iter().cloned());
                }
            }
        }
    }

    let nodes: Vec<ConceptId> = edges.keys().cloned().collect();
    let concept_successors = |id: &ConceptId| -> Vec<ConceptId> {
        edges
            .get(id)
            .map(|next| next.iter().cloned().collect())
            .unwrap_or_default()
    };
    tarjan_scc(&nodes, concept_successors)
        .iter()
        .any(|c| is_cyclic(c.as_slice(), &concept_successors))
}

/// Relation and attribute labels of a cycle's closure, subtypes included.
fn instance_labels(cycle: &[Label], schema: &Schema) -> BTreeSet<Label> {
    cycle
        .iter()
        .flat_map(|label| schema.subs(label))
        .filter(|label| {
            matches!(
                schema.kind(label),
                Some(TypeKind::Relation) | Some(TypeKind::Attribute)
            )
        })
        .collect()
}
