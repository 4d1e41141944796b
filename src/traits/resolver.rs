// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::errors::{FailureStrategy, ResolutionError};
use crate::pattern::{ConceptMap, Conjunction};

#[async_trait]
pub trait QueryResolver: Send + Sync {
    /// Resolve a conjunctive query against stored data and every applicable rule.
    ///
    /// - `query`: atoms, predicates and negations to satisfy together
    ///
    /// Returns a Result containing either:
    /// - Ok(Vec): every answer, restricted to the query's user-defined variables
    /// - Err(ResolutionError): details about what went wrong during resolution
    async fn resolve(&self, query: &Conjunction) -> Result<Vec<ConceptMap>, ResolutionError> {
        self.resolve_with_strategy(query, self.default_strategy()).await
    }

    /// Resolve with a specific failure handling strategy
    async fn resolve_with_strategy(
        &self,
        query: &Conjunction,
        failure_strategy: FailureStrategy,
    ) -> Result<Vec<ConceptMap>, ResolutionError>;

    /// Strategy used by [`QueryResolver::resolve`].
    fn default_strategy(&self) -> FailureStrategy {
        FailureStrategy::default()
    }
}
