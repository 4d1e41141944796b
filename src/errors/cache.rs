// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::StorageError;
use thiserror::Error;

/// Inconsistencies found while recording or specialising cached answers.
///
/// Each of these aborts resolution of the query that hit it; none are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryCacheError {
    /// A specialised parent answer did not bind every variable of the child query.
    #[error("answer {answer} does not cover the variables of {query}")]
    IncompleteAnswer { query: String, answer: String },

    /// The query has no entry in the family it was asked to take answers from.
    #[error("query {query} is not cached in the expected family")]
    Unfamilied { query: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
