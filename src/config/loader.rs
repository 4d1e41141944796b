// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_EPISODE_TIMEOUT_MS, DEFAULT_MAX_ITERATIONS, MAX_ITERATIONS_LIMIT,
    MIN_EPISODE_TIMEOUT_MS,
};
use crate::engine::ReasonerOptions;
use crate::errors::FailureStrategy;
use crate::pattern::{Conjunction, Value};
use crate::schema::{RuleDefinition, Schema, TypeDefinition};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the reasoner.
///
/// Holds everything one run needs: how to react to processor faults, the limits placed on
/// resolution, the schema with its rules, the data to load and the queries to answer.
/// It is typically loaded from a YAML configuration file.
///
/// # Fields
/// * `failure_strategy` - How to handle processor failures (optional, defaults to FailFast)
/// * `executor_options` - Episode timeout and reiteration bound (optional)
/// * `schema` - Type definitions and rule definitions
/// * `data` - Concepts, relations and ownerships loaded into the in-memory graph (optional)
/// * `queries` - Conjunctions to resolve (optional)
///
/// # Example
/// ```yaml
/// failure_strategy: fail_fast
/// executor_options:
///   episode_timeout_ms: 30000
///   max_iterations: 16
/// schema:
///   types:
///     - { label: person, kind: entity }
///     - { label: friend, kind: role }
///     - { label: friendship, kind: relation }
/// data:
///   concepts:
///     - { id: V1, label: person }
///     - { id: V2, label: person }
///   relations:
///     - { id: F1, label: friendship, role_players: [[friend, V1], [friend, V2]] }
/// queries:
///   - atoms:
///       - { kind: isa, var: x, label: person }
/// ```
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub failure_strategy: FailureStrategy,
    #[serde(default)]
    pub executor_options: ExecutorOptions,
    pub schema: SchemaConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub queries: Vec<Conjunction>,
}

/// Limits on a single `resolve` call.
///
/// # Fields
/// * `episode_timeout_ms` - Wall-clock limit per dataflow episode in milliseconds (optional)
/// * `max_iterations` - Episodes allowed for a cyclical rule set (optional)
#[derive(Debug, Default, Deserialize)]
pub struct ExecutorOptions {
    pub episode_timeout_ms: Option<u64>,
    pub max_iterations: Option<usize>,
}

impl ExecutorOptions {
    /// Episode timeout, never below the built-in minimum.
    pub fn get_episode_timeout(&self) -> Duration {
        let millis = self
            .episode_timeout_ms
            .unwrap_or(DEFAULT_EPISODE_TIMEOUT_MS)
            .max(MIN_EPISODE_TIMEOUT_MS);
        Duration::from_millis(millis)
    }

    /// Reiteration bound, clamped to `[1, MAX_ITERATIONS_LIMIT]`.
    ///
    /// # Example
    /// ```
    /// use dagwood_reasoner::config::ExecutorOptions;
    ///
    /// let options = ExecutorOptions {
    ///     episode_timeout_ms: None,
    ///     max_iterations: Some(1_000_000),
    /// };
    /// assert_eq!(options.get_max_iterations(), 1_024);
    /// ```
    pub fn get_max_iterations(&self) -> usize {
        self.max_iterations
            .unwrap_or(DEFAULT_MAX_ITERATIONS)
            .clamp(1, MAX_ITERATIONS_LIMIT)
    }

    pub fn reasoner_options(&self) -> ReasonerOptions {
        ReasonerOptions {
            episode_timeout: self.get_episode_timeout(),
            max_iterations: self.get_max_iterations(),
        }
    }
}

/// Type and rule definitions.
#[derive(Debug, Default, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub types: Vec<TypeDefinition>,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

impl SchemaConfig {
    pub fn to_schema(&self) -> Schema {
        Schema::new(self.types.clone(), self.rules.clone())
    }
}

/// Instances loaded into the in-memory graph before any query runs.
///
/// # Example
/// ```yaml
/// concepts:
///   - { id: V1, label: person }
///   - { id: A1, label: age, value: 30 }
/// relations:
///   - { id: F1, label: friendship, role_players: [[friend, V1], [friend, V2]] }
/// ownerships:
///   - [V1, A1]
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub concepts: Vec<ConceptConfig>,
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
    /// `[owner, attribute]` pairs.
    #[serde(default)]
    pub ownerships: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
pub struct ConceptConfig {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RelationConfig {
    pub id: String,
    pub label: String,
    /// `[role, player]` pairs.
    pub role_players: Vec<(String, String)>,
}

/// Load a config from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    Ok(cfg)
}

/// Load and validate a config from a YAML file
///
/// This function loads the configuration and validates the schema, rules and data so
/// that building the runtime from it cannot fail on a malformed definition.
pub fn load_and_validate_config<P: AsRef<Path>>(
    path: P,
) -> Result<Config, Box<dyn std::error::Error>> {
    let cfg = load_config(path)?;

    if let Err(validation_errors) = crate::config::validate_config(&cfg) {
        let error_messages: Vec<String> = validation_errors.iter().map(|e| e.to_string()).collect();
        let combined_error = format!(
            "Configuration validation failed:\n{}",
            error_messages.join("\n")
        );
        return Err(combined_error.into());
    }

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Atom, Variable};
    use crate::schema::TypeKind;
    use std::io::Write;

    const FRIENDS: &str = r#"
schema:
  types:
    - { label: person, kind: entity }
    - { label: friend, kind: role }
    - { label: friendship, kind: relation }
    - { label: knows, kind: relation }
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
data:
  concepts:
    - { id: V1, label: person }
    - { id: V2, label: person }
  relations:
    - { id: F1, label: friendship, role_players: [[friend, V1], [friend, V2]] }
queries:
  - atoms:
      - { kind: isa, var: x, label: person }
"#;

    fn write_config(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parse_basic_config() {
        let cfg: Config = serde_yaml::from_str(FRIENDS).unwrap();

        assert_eq!(cfg.failure_strategy, FailureStrategy::FailFast);
        assert_eq!(cfg.schema.types.len(), 4);
        assert_eq!(cfg.schema.types[1].kind, TypeKind::Role);
        assert_eq!(cfg.schema.rules[0].label, "friends-know-each-other");
        assert_eq!(cfg.data.relations[0].role_players[1], ("friend".into(), "V2".into()));
        assert_eq!(cfg.queries[0].atoms, vec![Atom::isa("x", "person")]);
    }

    #[test]
    fn test_load_and_validate_valid_config() {
        let file = write_config(FRIENDS);

        let result = load_and_validate_config(file.path());
        assert!(result.is_ok());
    }

    #[test]
    fn test_load_and_validate_unknown_label() {
        let file = write_config(
            r#"
schema:
  types:
    - { label: person, kind: entity }
queries:
  - atoms:
      - { kind: isa, var: x, label: robot }
"#,
        );

        let result = load_and_validate_config(file.path());
        assert!(result.is_err());
        let error_msg = result.unwrap_err().to_string();
        assert!(error_msg.contains("references 'robot' which does not exist"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn test_parse_predicates_and_negations() {
        let yaml = r#"
schema:
  types:
    - { label: person, kind: entity }
    - { label: age, kind: attribute }
queries:
  - atoms:
      - { kind: isa, var: x, label: person }
    predicates:
      - { kind: has, var: x, attribute: age, value: 30 }
    negations:
      - atoms:
          - { kind: has, owner: x, attribute: a, label: age }
        predicates:
          - { kind: value, var: a, comparator: gt, value: 65 }
"#;

        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        let query = &cfg.queries[0];

        assert_eq!(query.predicates.len(), 1);
        assert_eq!(query.negations.len(), 1);
        assert!(query.negations[0]
            .variables()
            .contains(&Variable::new("a")));
    }

    #[test]
    fn test_executor_options_defaults() {
        let cfg: Config = serde_yaml::from_str(FRIENDS).unwrap();

        let options = cfg.executor_options.reasoner_options();
        assert_eq!(options.episode_timeout, Duration::from_millis(30_000));
        assert_eq!(options.max_iterations, 16);
    }

    #[test]
    fn test_executor_options_are_clamped() {
        let options = ExecutorOptions {
            episode_timeout_ms: Some(1),
            max_iterations: Some(0),
        };

        assert_eq!(options.get_episode_timeout(), Duration::from_millis(10));
        assert_eq!(options.get_max_iterations(), 1);
    }
}
