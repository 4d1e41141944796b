// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod cache;      // semantic query cache
pub mod config;     // config + runtime builder
pub mod engine;     // resolution actors and the reasoner
pub mod errors;     // error handling
pub mod observability;
pub mod pattern;    // atoms, conjunctions, answers
pub mod reactive;   // reactive operator algebra
pub mod rules;      // inference rules and rule sets
pub mod schema;     // type hierarchy and storage
pub mod traits;     // unified abstractions
