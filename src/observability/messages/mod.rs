// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for the human-readable line and
//! [`StructuredLog`] to emit the same event with its fields attached.
//!
//! # Organization
//!
//! * `engine` - resolution episodes, fixpoint iteration, driver outcome
//! * `processor` - processor spawn, faults, controller supervision
//! * `cache` - entry creation, answer propagation, completeness
//! * `rule` - rule set construction and stratification
//! * `validation` - configuration validation warnings and errors

pub mod cache;
pub mod engine;
pub mod processor;
pub mod rule;
pub mod validation;

use tracing::Span;

/// A message that knows its own log level and structured fields.
pub trait StructuredLog {
    /// Emits the message as a `tracing` event.
    fn log(&self);

    /// Opens a span carrying the message's fields.
    fn span(&self, name: &str) -> Span;
}
