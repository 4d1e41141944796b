// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Configuration validation for schema, rule and data integrity.
//!
//! Everything a configuration names must exist, the type hierarchy must be a forest, and
//! every rule definition must build into an inference rule. Validation runs in stages so
//! later checks only see a structurally sound configuration:
//!
//! 1. **Uniqueness Validation**: type labels, rule labels and concept ids are unique
//! 2. **Reference Validation**: every label and concept id referenced is defined
//! 3. **Cycle Detection**: DFS over `sup` links, reporting the cycle path
//! 4. **Rule Construction**: each rule definition builds into an `InferenceRule`
//!
//! Rules whose conclusions nothing ever asks for are reported as warnings only.
//!
//! # Examples
//!
//! ```rust
//! use dagwood_reasoner::config::{validate_config, Config};
//! use dagwood_reasoner::errors::ValidationError;
//!
//! let config: Config = serde_yaml::from_str(r#"
//! schema:
//!   types:
//!     - { label: person, kind: entity, sup: agent }
//!     - { label: agent, kind: entity, sup: person }
//! "#).unwrap();
//!
//! match validate_config(&config) {
//!     Err(errors) => assert!(matches!(
//!         errors[0],
//!         ValidationError::CyclicTypeHierarchy { .. }
//!     )),
//!     Ok(()) => unreachable!("person and agent specialise each other"),
//! }
//! ```

use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::errors::ValidationError;
use crate::observability::messages::validation::{
    CyclicTypeHierarchy, UnreachableRule, UnresolvedLabel, ValidationCompleted,
    ValidationFailed, ValidationStarted,
};
use crate::observability::messages::StructuredLog;
use crate::pattern::{Atom, Conjunction, Label, Predicate};
use crate::rules::InferenceRule;
use crate::schema::Schema;

/// Validates a configuration before a reasoner is built from it.
///
/// Uniqueness and reference errors are accumulated so every problem is reported at once.
/// Cycle detection only runs on a configuration whose references resolve, and rules are
/// only built over an acyclic hierarchy.
///
/// # Returns
///
/// * `Ok(())` - Configuration is valid and ready for resolution
/// * `Err(Vec<ValidationError>)` - List of all validation errors found
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    ValidationStarted {
        type_count: config.schema.types.len(),
        rule_count: config.schema.rules.len(),
    }
    .log();

    let schema = config.schema.to_schema();
    let mut errors = Vec::new();

    if let Err(duplicate_errors) = validate_unique_definitions(config) {
        errors.extend(duplicate_errors);
    }

    if let Err(reference_errors) = validate_label_references(config, &schema) {
        errors.extend(reference_errors);
    }

    if let Err(data_errors) = validate_data_references(config) {
        errors.extend(data_errors);
    }

    if errors.is_empty() {
        if let Err(cycle_error) = validate_acyclic_hierarchy(config) {
            errors.push(cycle_error);
        }
    }

    if errors.is_empty() {
        if let Err(rule_errors) = validate_rules(config, &schema) {
            errors.extend(rule_errors);
        }
    }

    if !errors.is_empty() {
        ValidationFailed {
            error_count: errors.len(),
        }
        .log();
        return Err(errors);
    }

    let warning_count = warn_unreachable_rules(config, &schema);
    ValidationCompleted {
        type_count: config.schema.types.len(),
        rule_count: config.schema.rules.len(),
        warning_count,
    }
    .log();
    Ok(())
}

fn validate_unique_definitions(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut labels = HashSet::new();
    for definition in &config.schema.types {
        if !labels.insert(&definition.label) {
            errors.push(ValidationError::DuplicateLabel {
                label: definition.label.to_string(),
            });
        }
    }

    let mut rules = HashSet::new();
    for rule in &config.schema.rules {
        if !rules.insert(&rule.label) {
            errors.push(ValidationError::DuplicateRule {
                rule: rule.label.clone(),
            });
        }
    }

    // Entities, attributes and relations share one id space.
    let mut ids = HashSet::new();
    let data_ids = config
        .data
        .concepts
        .iter()
        .map(|c| &c.id)
        .chain(config.data.relations.iter().map(|r| &r.id));
    for id in data_ids {
        if !ids.insert(id) {
            errors.push(ValidationError::DuplicateConcept { id: id.clone() });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Every label a type, rule or query mentions must be defined. Implicit ownership labels
/// count as defined when their attribute is.
fn validate_label_references(config: &Config, schema: &Schema) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut check = |context: String, label: &Label| {
        if !schema.contains(label) {
            UnresolvedLabel {
                context: &context,
                label: label.name(),
            }
            .log();
            errors.push(ValidationError::UnknownLabel {
                context,
                label: label.to_string(),
            });
        }
    };

    for definition in &config.schema.types {
        if let Some(sup) = &definition.sup {
            check(format!("Type '{}'", definition.label), sup);
        }
    }
    for rule in &config.schema.rules {
        let mut labels = conjunction_labels(&rule.when);
        labels.extend(atom_labels(&rule.then.atom));
        labels.extend(rule.then.predicates.iter().filter_map(predicate_label));
        for label in labels {
            check(format!("Rule '{}'", rule.label), &label);
        }
    }
    for (index, query) in config.queries.iter().enumerate() {
        for label in conjunction_labels(query) {
            check(format!("Query #{}", index + 1), &label);
        }
    }
    for concept in &config.data.concepts {
        check(format!("Concept '{}'", concept.id), &Label::new(concept.label.as_str()));
    }
    for relation in &config.data.relations {
        check(format!("Relation '{}'", relation.id), &Label::new(relation.label.as_str()));
        for (role, _) in &relation.role_players {
            check(format!("Relation '{}'", relation.id), &Label::new(role.as_str()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Role players and ownerships must name concepts the data defines.
fn validate_data_references(config: &Config) -> Result<(), Vec<ValidationError>> {
    let ids: HashSet<&String> = config
        .data
        .concepts
        .iter()
        .map(|c| &c.id)
        .chain(config.data.relations.iter().map(|r| &r.id))
        .collect();
    let mut errors = Vec::new();

    for relation in &config.data.relations {
        for (_, player) in &relation.role_players {
            if !ids.contains(player) {
                errors.push(ValidationError::UnknownConcept {
                    context: format!("Relation '{}'", relation.id),
                    id: player.clone(),
                });
            }
        }
    }
    for (owner, attribute) in &config.data.ownerships {
        for id in [owner, attribute] {
            if !ids.contains(id) {
                errors.push(ValidationError::UnknownConcept {
                    context: format!("Ownership {} -> {}", owner, attribute),
                    id: id.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Three-colour DFS over `sub -> sup` links. A type reached again while still on the
/// current path closes a cycle; the path from its first visit is reported.
fn validate_acyclic_hierarchy(config: &Config) -> Result<(), ValidationError> {
    let graph: HashMap<&str, Vec<&str>> = config
        .schema
        .types
        .iter()
        .map(|t| (t.label.name(), t.sup.iter().map(|s| s.name()).collect()))
        .collect();

    let mut labels: Vec<&str> = graph.keys().copied().collect();
    labels.sort_unstable();

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();
    for label in labels {
        if visited.contains(label) {
            continue;
        }
        if let Some(cycle) =
            dfs_cycle_detection(label, &graph, &mut visited, &mut rec_stack, &mut path)
        {
            let names: Vec<&str> = cycle.iter().map(String::as_str).collect();
            CyclicTypeHierarchy { cycle: &names }.log();
            return Err(ValidationError::CyclicTypeHierarchy { cycle });
        }
    }
    Ok(())
}

fn dfs_cycle_detection<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    for &neighbor in graph.get(node).into_iter().flatten() {
        if !visited.contains(neighbor) {
            if let Some(cycle) = dfs_cycle_detection(neighbor, graph, visited, rec_stack, path) {
                return Some(cycle);
            }
        } else if rec_stack.contains(neighbor) {
            let start = path.iter().position(|&x| x == neighbor).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
            cycle.push(neighbor.to_string());
            return Some(cycle);
        }
    }

    rec_stack.remove(node);
    path.pop();
    None
}

fn validate_rules(config: &Config, schema: &Schema) -> Result<(), Vec<ValidationError>> {
    let errors: Vec<ValidationError> = config
        .schema
        .rules
        .iter()
        .filter_map(|definition| {
            InferenceRule::new(definition, schema)
                .err()
                .map(|error| ValidationError::InvalidRule {
                    rule: definition.label.clone(),
                    reason: error.to_string(),
                })
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Logs every rule whose head no query and no rule body can ask for. Returns how many.
fn warn_unreachable_rules(config: &Config, schema: &Schema) -> usize {
    let reads: Vec<Option<&Label>> = config
        .queries
        .iter()
        .chain(config.schema.rules.iter().map(|r| &r.when))
        .flat_map(conjunction_atoms)
        .map(Atom::label)
        .collect();

    let mut warnings = 0;
    for rule in &config.schema.rules {
        let Some(head) = rule.then.atom.label() else {
            continue;
        };
        let reachable = reads.iter().any(|read| match read {
            None => true,
            Some(read) => schema.is_subtype(head, read),
        });
        if !reachable {
            UnreachableRule {
                rule: &rule.label,
                head: head.name(),
            }
            .log();
            warnings += 1;
        }
    }
    warnings
}

fn conjunction_atoms(conjunction: &Conjunction) -> Vec<&Atom> {
    let mut atoms: Vec<&Atom> = conjunction.atoms.iter().collect();
    for negation in &conjunction.negations {
        atoms.extend(conjunction_atoms(negation));
    }
    atoms
}

fn conjunction_labels(conjunction: &Conjunction) -> Vec<Label> {
    let mut labels: Vec<Label> = conjunction_atoms(conjunction)
        .into_iter()
        .flat_map(atom_labels)
        .collect();
    labels.extend(conjunction.predicates.iter().filter_map(predicate_label));
    for negation in &conjunction.negations {
        labels.extend(negation.predicates.iter().filter_map(predicate_label));
    }
    labels
}

fn atom_labels(atom: &Atom) -> Vec<Label> {
    let mut labels: Vec<Label> = atom.label().cloned().into_iter().collect();
    if let Atom::Relation { role_players, .. } = atom {
        labels.extend(role_players.iter().filter_map(|rp| rp.role.clone()));
    }
    labels
}

fn predicate_label(predicate: &Predicate) -> Option<Label> {
    match predicate {
        Predicate::Type { label, .. } => Some(label.clone()),
        Predicate::Has { attribute, .. } => Some(attribute.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    const TYPES: &str = r#"
schema:
  types:
    - { label: agent, kind: entity }
    - { label: person, kind: entity, sup: agent }
    - { label: friend, kind: role }
    - { label: friendship, kind: relation }
    - { label: knows, kind: relation }
    - { label: age, kind: attribute }
"#;

    fn with(extra: &str) -> Config {
        config(&format!("{}{}", TYPES, extra))
    }

    #[test]
    fn test_valid_empty_config() {
        assert!(validate_config(&config("schema: {}")).is_ok());
    }

    #[test]
    fn test_valid_hierarchy_and_data() {
        let cfg = with(
            r#"
data:
  concepts:
    - { id: V1, label: person }
    - { id: V2, label: person }
    - { id: A1, label: age, value: 30 }
  relations:
    - { id: F1, label: friendship, role_players: [[friend, V1], [friend, V2]] }
  ownerships:
    - [V1, A1]
"#,
        );

        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn test_duplicate_labels_and_ids() {
        let cfg = config(
            r#"
schema:
  types:
    - { label: person, kind: entity }
    - { label: person, kind: entity }
data:
  concepts:
    - { id: V1, label: person }
    - { id: V1, label: person }
"#,
        );

        let errors = validate_config(&cfg).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], ValidationError::DuplicateLabel { .. }));
        assert!(matches!(errors[1], ValidationError::DuplicateConcept { .. }));
    }

    #[test]
    fn test_unknown_labels_are_collected() {
        let cfg = with(
            r#"
queries:
  - atoms:
      - kind: relation
        var: _r
        label: rivalry
        role_players: [{ role: rival, player: x }]
"#,
        );

        let errors = validate_config(&cfg).unwrap_err();
        let labels: Vec<&str> = errors
            .iter()
            .filter_map(|e| match e {
                ValidationError::UnknownLabel { label, .. } => Some(label.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(labels, vec!["rivalry", "rival"]);
    }

    #[test]
    fn test_implicit_ownership_labels_resolve() {
        let cfg = with(
            r#"
queries:
  - atoms:
      - kind: relation
        var: _h
        label: "@has-age"
        role_players: [{ role: "@has-age-owner", player: x }, { role: "@has-age-value", player: a }]
"#,
        );

        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn test_unknown_role_players() {
        let cfg = with(
            r#"
data:
  concepts:
    - { id: V1, label: person }
  relations:
    - { id: F1, label: friendship, role_players: [[friend, V1], [friend, V9]] }
"#,
        );

        let errors = validate_config(&cfg).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::UnknownConcept {
                context: "Relation 'F1'".into(),
                id: "V9".into(),
            }]
        );
    }

    #[test]
    fn test_self_supertype_cycle() {
        let cfg = config(
            r#"
schema:
  types:
    - { label: person, kind: entity, sup: person }
"#,
        );

        let errors = validate_config(&cfg).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::CyclicTypeHierarchy {
                cycle: vec!["person".into(), "person".into()],
            }]
        );
    }

    #[test]
    fn test_complex_cycle_reports_path() {
        let cfg = config(
            r#"
schema:
  types:
    - { label: a, kind: entity, sup: b }
    - { label: b, kind: entity, sup: c }
    - { label: c, kind: entity, sup: d }
    - { label: d, kind: entity, sup: b }
"#,
        );

        let errors = validate_config(&cfg).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::CyclicTypeHierarchy {
                cycle: vec!["b".into(), "c".into(), "d".into(), "b".into()],
            }]
        );
    }

    #[test]
    fn test_invalid_rule_definition() {
        let cfg = with(
            r#"
  rules:
    - label: everyone-knows-someone
      when:
        atoms:
          - { kind: isa, var: x, label: person }
      then:
        atom:
          kind: relation
          var: _k
          label: knows
          role_players: [{ role: friend, player: x }, { role: friend, player: y }]
"#,
        );

        let errors = validate_config(&cfg).unwrap_err();
        assert!(matches!(
            &errors[0],
            ValidationError::InvalidRule { rule, .. } if rule == "everyone-knows-someone"
        ));
    }

    #[test]
    fn test_unreachable_rules_only_warn() {
        let cfg = with(
            r#"
  rules:
    - label: friends-know-each-other
      when:
        atoms:
          - kind: relation
            var: _f
            label: friendship
            role_players: [{ role: friend, player: x }, { role: friend, player: y }]
      then:
        atom:
          kind: relation
          var: _k
          label: knows
          role_players: [{ role: friend, player: x }, { role: friend, player: y }]
queries:
  - atoms:
      - { kind: isa, var: x, label: person }
"#,
        );

        assert!(validate_config(&cfg).is_ok());
        assert_eq!(warn_unreachable_rules(&cfg, &cfg.schema.to_schema()), 1);
    }
}
