// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Rule engine.
//!
//! [`InferenceRule`] wraps a validated rule definition and knows how to unify its conclusion
//! with a querying atom, rewrite itself for that atom and build head answers. [`RuleSet`]
//! holds the rules of one run together with their dependencies and priorities; [`utils`]
//! orders them into strata and decides whether resolution needs to iterate.

mod inference_rule;
mod rule_set;
pub mod utils;

pub use inference_rule::{InferenceRule, ResolutionPriority, ResolutionState};
pub use rule_set::RuleSet;
pub use utils::{stratify_rules, subgraph_is_cyclical, tarjan_scc};
