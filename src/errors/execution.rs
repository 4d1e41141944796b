// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised while a resolution episode runs, and the policy for handling processor faults.

use super::{QueryCacheError, StorageError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a controller reacts when one of its processors fails.
///
/// * `FailFast` - the whole episode fails with the first processor exception (default)
/// * `ContinueOnError` - the fault is logged and the processor is dropped; the episode carries
///   on with whatever the remaining processors produce
/// * `BestEffort` - like `ContinueOnError`, and an episode timeout returns the answers gathered
///   so far instead of an error
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStrategy {
    #[default]
    FailFast,
    ContinueOnError,
    BestEffort,
}

#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    /// A processor task panicked or reported a fault to its controller.
    #[error("processor '{processor}' failed: {reason}")]
    ProcessorFailed { processor: String, reason: String },

    /// An actor mailbox was closed while a message was still being routed to it.
    #[error("actor '{actor}' is no longer running")]
    ActorStopped { actor: String },

    /// The monitor saw the same input/output binding twice.
    #[error("path {input} <- {output} registered twice")]
    DuplicatePath { input: String, output: String },

    #[error("resolution episode timed out after {timeout_ms}ms")]
    EpisodeTimeout { timeout_ms: u64 },

    #[error("no fixpoint reached after {iterations} iterations")]
    IterationLimit { iterations: usize },

    /// Resolving a negated conjunction needs a negation that needs it back.
    #[error("negation {negation} cannot be stratified")]
    NegationCycle { negation: String },

    #[error(transparent)]
    Cache(#[from] QueryCacheError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{failures:?}")]
    MultipleFailed { failures: Vec<ResolutionError> },
}
