// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::inference_rule::{InferenceRule, ResolutionPriority};
use super::utils::tarjan_scc;
use crate::errors::RuleError;
use crate::pattern::{unify, AtomicQuery, Label, MultiUnifier, UnifyMode};
use crate::schema::Schema;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// The rules of one resolution run, built once from the schema's rule definitions.
///
/// Rule `b` depends on rule `a` when `a`'s head unifies with one of `b`'s body atoms,
/// negated atoms included.
#[derive(Debug)]
pub struct RuleSet {
    schema: Arc<Schema>,
    rules: Vec<Arc<InferenceRule>>,
    by_label: HashMap<String, usize>,
    dependencies: BTreeMap<usize, BTreeSet<usize>>,
    priorities: Vec<ResolutionPriority>,
}

impl RuleSet {
    pub fn from_schema(schema: Arc<Schema>) -> Result<Self, RuleError> {
        let mut rules = Vec::with_capacity(schema.rules().len());
        let mut by_label = HashMap::new();
        for definition in schema.rules() {
            let rule = InferenceRule::new(definition, &schema)?;
            by_label.insert(rule.label().to_string(), rules.len());
            rules.push(rule);
        }

        let mut dependencies: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for (dependent, rule) in rules.iter().enumerate() {
            let body = rule.body();
            let atoms = body
                .atoms
                .iter()
                .chain(body.negations.iter().flat_map(|n| n.atoms.iter()));
            let entry = dependencies.entry(dependent).or_default();
            for atom in atoms {
                for (producer, candidate) in rules.iter().enumerate() {
                    let unifiers =
                        unify(candidate.conclusion_atom(), atom, &schema, UnifyMode::Rule);
                    if !unifiers.is_empty() {
                        entry.insert(producer);
                    }
                }
            }
        }

        let priorities = compute_priorities(&rules, &dependencies, &schema);
        let rules: Vec<Arc<InferenceRule>> = rules.into_iter().map(Arc::new).collect();
        let set = Self {
            schema,
            rules,
            by_label,
            dependencies,
            priorities,
        };
        for rule in &set.rules {
            rule.resolution_priority(&set);
        }
        Ok(set)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn rules(&self) -> &[Arc<InferenceRule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&Arc<InferenceRule>> {
        self.by_label.get(label).map(|&i| &self.rules[i])
    }

    pub fn has_negation(&self) -> bool {
        self.rules.iter().any(|r| r.body().has_negation())
    }

    /// Rules the given rule's body reads from.
    pub fn dependencies(&self, label: &str) -> Vec<Arc<InferenceRule>> {
        let Some(&index) = self.by_label.get(label) else {
            return Vec::new();
        };
        self.dependencies
            .get(&index)
            .into_iter()
            .flatten()
            .map(|&i| Arc::clone(&self.rules[i]))
            .collect()
    }

    /// Rules whose body reads the given rule's conclusions.
    pub fn dependent_rules(&self, label: &str) -> Vec<Arc<InferenceRule>> {
        let Some(&index) = self.by_label.get(label) else {
            return Vec::new();
        };
        self.dependencies
            .iter()
            .filter(|(_, producers)| producers.contains(&index))
            .map(|(&dependent, _)| Arc::clone(&self.rules[dependent]))
            .collect()
    }

    /// Rules whose head type is `label` or one of its subtypes.
    pub fn concludes(&self, label: &Label) -> Vec<Arc<InferenceRule>> {
        self.rules
            .iter()
            .filter(|rule| {
                rule.then_types()
                    .iter()
                    .any(|then| self.schema.is_subtype(then, label))
            })
            .cloned()
            .collect()
    }

    /// Every rule that can answer `query`, rewritten for it, with the ways its conclusion
    /// unifies onto the query atom. Sorted by priority.
    pub fn applicable_rules(&self, query: &AtomicQuery) -> Vec<(InferenceRule, MultiUnifier)> {
        let mut applicable: Vec<(InferenceRule, MultiUnifier)> = self
            .rules
            .iter()
            .filter_map(|rule| {
                let rewritten = rule.rewrite(&query.atom, &self.schema);
                let unifiers = rewritten.get_multi_unifier(&query.atom, &self.schema);
                (!unifiers.is_empty()).then_some((rewritten, unifiers))
            })
            .collect();
        applicable.sort_by(|(a, _), (b, _)| {
            a.resolution_priority(self)
                .cmp(&b.resolution_priority(self))
                .then_with(|| a.label().cmp(b.label()))
        });
        applicable
    }

    pub(crate) fn compute_priority(&self, rule: &InferenceRule) -> ResolutionPriority {
        match self.by_label.get(rule.label()) {
            Some(&index) => self.priorities[index],
            None => ResolutionPriority {
                depth: 0,
                ancestors: head_ancestors(rule, &self.schema),
            },
        }
    }
}

fn head_ancestors(rule: &InferenceRule, schema: &Schema) -> usize {
    rule.head().label().map_or(0, |label| schema.sups(label).len())
}

/// Longest dependency chain per rule, with each strongly connected group of rules sharing
/// one depth.
fn compute_priorities(
    rules: &[InferenceRule],
    dependencies: &BTreeMap<usize, BTreeSet<usize>>,
    schema: &Schema,
) -> Vec<ResolutionPriority> {
    let nodes: Vec<usize> = (0..rules.len()).collect();
    let components = tarjan_scc(&nodes, |n| {
        dependencies
            .get(n)
            .map(|d| d.iter().copied().collect())
            .unwrap_or_default()
    });

    let mut component_of = vec![0usize; rules.len()];
    for (c, component) in components.iter().enumerate() {
        for &node in component {
            component_of[node] = c;
        }
    }

    // Tarjan emits a component only after every component it reaches.
    let mut depth = vec![0usize; components.len()];
    for (c, component) in components.iter().enumerate() {
        let mut deepest = 0;
        for node in component {
            for producer in dependencies.get(node).into_iter().flatten() {
                let pc = component_of[*producer];
                if pc != c {
                    deepest = deepest.max(depth[pc] + 1);
                }
            }
        }
        depth[c] = deepest;
    }

    rules
        .iter()
        .enumerate()
        .map(|(i, rule)| ResolutionPriority {
            depth: depth[component_of[i]],
            ancestors: head_ancestors(rule, schema),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Atom, Conjunction, RolePlayer};
    use crate::schema::{RuleDefinition, TypeKind};

    fn binary(var: &str, label: &str, x: &str, y: &str) -> Atom {
        Atom::relation(
            var,
            label,
            vec![
                RolePlayer::new(Some("from"), x),
                RolePlayer::new(Some("to"), y),
            ],
        )
    }

    fn schema() -> Schema {
        let mut schema = Schema::default()
            .with_type("from", TypeKind::Role, None)
            .with_type("to", TypeKind::Role, None)
            .with_type("node", TypeKind::Entity, None);
        for label in ["a", "b", "c", "d"] {
            schema = schema.with_type(label, TypeKind::Relation, None);
        }
        schema
            .with_rule(RuleDefinition {
                label: "r2".into(),
                when: Conjunction::new(vec![
                    binary("_a1", "a", "x", "z"),
                    binary("_a2", "a", "z", "y"),
                ]),
                then: AtomicQuery::new(binary("_d", "d", "x", "y")),
            })
            .with_rule(RuleDefinition {
                label: "r1".into(),
                when: Conjunction::new(vec![
                    binary("_b", "b", "x", "z"),
                    binary("_c", "c", "z", "y"),
                ]),
                then: AtomicQuery::new(binary("_a", "a", "x", "y")),
            })
    }

    #[test]
    fn dependency_lookups_follow_head_to_body_unification() {
        let rules = RuleSet::from_schema(Arc::new(schema())).unwrap();
        let labels = |rules: Vec<Arc<InferenceRule>>| {
            rules.iter().map(|r| r.label().to_string()).collect::<Vec<_>>()
        };
        assert_eq!(labels(rules.dependencies("r2")), vec!["r1"]);
        assert!(rules.dependencies("r1").is_empty());
        assert_eq!(labels(rules.dependent_rules("r1")), vec!["r2"]);
        assert_eq!(labels(rules.concludes(&Label::new("a"))), vec!["r1"]);
    }

    #[test]
    fn rules_fed_by_other_rules_resolve_later() {
        let rules = RuleSet::from_schema(Arc::new(schema())).unwrap();
        let r1 = rules.get("r1").unwrap().resolution_priority(&rules);
        let r2 = rules.get("r2").unwrap().resolution_priority(&rules);
        assert_eq!(r1.depth, 0);
        assert_eq!(r2.depth, 1);
        assert!(r1 < r2);
    }

    #[test]
    fn applicable_rules_match_by_head_type() {
        let rules = RuleSet::from_schema(Arc::new(schema())).unwrap();
        let query = AtomicQuery::new(binary("_q", "a", "p", "q"));
        let applicable = rules.applicable_rules(&query);
        assert_eq!(applicable.len(), 1);
        assert_eq!(applicable[0].0.label(), "r1");
        assert_eq!(applicable[0].1.len(), 1);

        let unrelated = AtomicQuery::new(binary("_q", "b", "p", "q"));
        assert!(rules.applicable_rules(&unrelated).is_empty());
    }

    #[test]
    fn invalid_definitions_are_rejected() {
        let schema = schema().with_rule(RuleDefinition {
            label: "broken".into(),
            when: Conjunction::default(),
            then: AtomicQuery::new(binary("_a", "a", "x", "y")),
        });
        let err = RuleSet::from_schema(Arc::new(schema)).unwrap_err();
        assert!(matches!(err, RuleError::EmptyBody { .. }));
    }
}
