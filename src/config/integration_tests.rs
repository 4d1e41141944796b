// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod integration_tests {
    use std::io::Write;
    use std::time::Duration;

    use crate::config::{load_and_validate_config, RuntimeBuilder};
    use crate::errors::FailureStrategy;
    use crate::pattern::{ConceptMap, Variable};
    use crate::schema::TypeKind;
    use crate::traits::QueryResolver;

    fn ids(answers: &[ConceptMap], variable: &str) -> Vec<String> {
        answers
            .iter()
            .filter_map(|a| a.get(&Variable::new(variable)).map(|c| c.id.to_string()))
            .collect()
    }

    /// Test that YAML configurations can be loaded and parsed correctly
    #[test]
    fn test_social_network_yaml_loading() {
        let config = load_and_validate_config("configs/social-network.yaml").unwrap();

        assert_eq!(config.failure_strategy, FailureStrategy::FailFast);
        assert_eq!(config.executor_options.episode_timeout_ms, Some(10_000));
        assert_eq!(config.executor_options.get_max_iterations(), 8);
        assert_eq!(config.schema.types.len(), 6);
        assert_eq!(config.schema.types[1].kind, TypeKind::Entity);
        assert_eq!(config.schema.rules.len(), 1);
        assert_eq!(config.data.concepts.len(), 5);
        assert_eq!(config.data.ownerships.len(), 2);
        assert_eq!(config.queries.len(), 3);
        assert_eq!(config.queries[1].negations.len(), 1);
    }

    /// Test recursive rule sets load with their failure strategy
    #[test]
    fn test_transitive_paths_yaml_loading() {
        let config = load_and_validate_config("configs/transitive-paths.yaml").unwrap();

        assert_eq!(config.failure_strategy, FailureStrategy::BestEffort);
        assert_eq!(
            config.executor_options.get_episode_timeout(),
            Duration::from_millis(10_000)
        );
        assert_eq!(config.schema.rules[1].label, "path-extends");
        assert_eq!(config.schema.rules[1].when.atoms.len(), 2);
    }

    /// Test building the runtime and resolving every configured query
    #[tokio::test]
    async fn test_resolve_social_network_queries() {
        let config = load_and_validate_config("configs/social-network.yaml").unwrap();
        let (reasoner, _graph) = RuntimeBuilder::from_config(&config).unwrap();

        assert_eq!(reasoner.rules().len(), 1);
        assert_eq!(reasoner.options().max_iterations, 8);

        let knows = reasoner.resolve(&config.queries[0]).await.unwrap();
        assert_eq!(ids(&knows, "a"), vec!["V1", "V2"]);
        assert_eq!(ids(&knows, "b"), vec!["V2", "V1"]);

        let lonely = reasoner.resolve(&config.queries[1]).await.unwrap();
        assert_eq!(ids(&lonely, "x"), vec!["V3"]);

        let older = reasoner.resolve(&config.queries[2]).await.unwrap();
        assert_eq!(ids(&older, "x"), vec!["V3"]);
        assert_eq!(ids(&older, "a"), vec!["A41"]);
    }

    /// Test a cyclical rule set over cyclic data reaches its fixpoint
    #[tokio::test]
    async fn test_resolve_transitive_paths_query() {
        let config = load_and_validate_config("configs/transitive-paths.yaml").unwrap();
        let (reasoner, _graph) = RuntimeBuilder::from_config(&config).unwrap();

        let reachable = reasoner.resolve(&config.queries[0]).await.unwrap();

        assert_eq!(ids(&reachable, "s"), vec!["A", "A", "A"]);
        assert_eq!(ids(&reachable, "t"), vec!["A", "B", "C"]);
    }

    /// Test that validation failures are reported together
    #[test]
    fn test_invalid_configuration_reports_every_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
schema:
  types:
    - { label: person, kind: entity }
    - { label: person, kind: entity }
data:
  concepts:
    - { id: V1, label: robot }
"#,
        )
        .unwrap();

        let error_msg = load_and_validate_config(file.path())
            .unwrap_err()
            .to_string();

        assert!(error_msg.contains("Duplicate type label: 'person'"));
        assert!(error_msg.contains("Concept 'V1' references 'robot' which does not exist"));
    }

    /// Test that data the schema cannot hold fails runtime construction
    #[test]
    fn test_runtime_rejects_untyped_data() {
        let config: crate::config::Config = serde_yaml::from_str(
            r#"
schema:
  types:
    - { label: person, kind: entity }
data:
  concepts:
    - { id: V1, label: robot }
"#,
        )
        .unwrap();

        let result = RuntimeBuilder::from_config(&config);

        assert!(result.is_err());
        assert!(result.err().unwrap().contains("robot"));
    }
}
