// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::config::{Config, DataConfig};
use crate::engine::Reasoner;
use crate::errors::StorageError;
use crate::schema::{InMemoryGraph, Schema};

/// Reasoner runtime builder - loads the configured data and wires the reasoner to it.
///
/// # Examples
///
/// ## Building runtime from configuration
/// ```
/// use dagwood_reasoner::config::{Config, RuntimeBuilder};
/// use dagwood_reasoner::errors::FailureStrategy;
/// use dagwood_reasoner::schema::Storage;
///
/// let config: Config = serde_yaml::from_str(r#"
/// failure_strategy: best_effort
/// schema:
///   types:
///     - { label: person, kind: entity }
/// data:
///   concepts:
///     - { id: V1, label: person }
/// "#).unwrap();
///
/// let (reasoner, graph) = RuntimeBuilder::from_config(&config).unwrap();
///
/// assert_eq!(graph.query_count(), 0);
/// assert!(reasoner.rules().is_empty());
/// ```
pub struct RuntimeBuilder;

impl RuntimeBuilder {
    /// Build the reasoner and its backing graph from configuration.
    ///
    /// Creates and returns:
    /// - `Reasoner`: configured with the executor options and failure strategy
    /// - `Arc<InMemoryGraph>`: the storage the reasoner reads from and materialises into
    pub fn from_config(cfg: &Config) -> Result<(Reasoner, Arc<InMemoryGraph>), String> {
        let schema = Arc::new(cfg.schema.to_schema());
        let graph = Arc::new(
            Self::load_data(&cfg.data, Arc::clone(&schema)).map_err(|e| e.to_string())?,
        );
        let reasoner = Reasoner::new(schema, graph.clone())
            .map_err(|e| e.to_string())?
            .with_options(cfg.executor_options.reasoner_options())
            .with_failure_strategy(cfg.failure_strategy);
        Ok((reasoner, graph))
    }

    /// Loads concepts, then relations in the order given, then ownerships.
    pub fn load_data(
        data: &DataConfig,
        schema: Arc<Schema>,
    ) -> Result<InMemoryGraph, StorageError> {
        let graph = InMemoryGraph::new(schema);
        for concept in &data.concepts {
            graph.add_concept(&concept.id, &concept.label, concept.value.clone())?;
        }
        for relation in &data.relations {
            let players: Vec<(&str, &str)> = relation
                .role_players
                .iter()
                .map(|(role, player)| (role.as_str(), player.as_str()))
                .collect();
            graph.add_relation(&relation.id, &relation.label, &players)?;
        }
        for (owner, attribute) in &data.ownerships {
            graph.add_ownership(owner, attribute)?;
        }
        Ok(graph)
    }
}
