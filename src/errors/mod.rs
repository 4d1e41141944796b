// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod cache;
mod config;
mod execution;
mod rule;
mod storage;

pub use cache::QueryCacheError;
pub use config::ValidationError;
pub use execution::{FailureStrategy, ResolutionError};
pub use rule::RuleError;
pub use storage::StorageError;
