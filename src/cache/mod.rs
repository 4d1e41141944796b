// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Subsumption-aware semantic answer cache.
//!
//! # Entries
//!
//! One entry per structural query shape ([`QueryKey`](crate::pattern::QueryKey)). Queries
//! that only differ in identifier values share an entry and are told apart by their
//! bindings, so a ground query and its siblings never need separate storage.
//!
//! # Completeness
//!
//! Each entry tracks two monotonic levels, per binding:
//!
//! ```text
//! unseen -> cached -> db-complete -> complete
//! ```
//!
//! Identifier-free queries complete every binding of their shape at once and hand the level
//! down to every descendant, answers first. Bound queries complete one binding at a time.
//!
//! # Subsumption
//!
//! Within a family (the root type of the query's label) an identifier-free entry is the
//! parent of every entry it subsumes. A child created under a complete parent is filled from
//! the parent's answers and is complete at once; storage is never consulted for it.

mod entry;
mod semantic;

pub use semantic::SemanticCache;
