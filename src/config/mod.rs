// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod loader;
mod runtime;
mod validation;

#[cfg(test)]
mod integration_tests;
pub mod consts;

pub use loader::{
    load_and_validate_config, load_config, ConceptConfig, Config, DataConfig, ExecutorOptions,
    RelationConfig, SchemaConfig,
};
pub use runtime::RuntimeBuilder;
pub use validation::validate_config;
