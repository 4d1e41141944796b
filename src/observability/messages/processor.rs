// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for processor and controller lifecycle events.
//!
//! This module contains message types for logging events related to:
//! * Processor spawning by controllers
//! * Cross-processor connections
//! * Processor faults and how the failure strategy handled them

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A controller spawned a processor for a new set of bounds.
///
/// # Log Level
/// `debug!` - Per-processor detail
///
/// # Example
/// ```
/// use dagwood_reasoner::observability::messages::processor::ProcessorSpawned;
///
/// let msg = ProcessorSpawned {
///     processor: "concludable#7",
///     controller: "concludable[$x isa person]",
///     bounds: "{$x=person:V1}",
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct ProcessorSpawned<'a> {
    pub processor: &'a str,
    pub controller: &'a str,
    pub bounds: &'a str,
}

impl Display for ProcessorSpawned<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Controller {} spawned processor '{}' for bounds {}",
            self.controller, self.processor, self.bounds
        )
    }
}

impl StructuredLog for ProcessorSpawned<'_> {
    fn log(&self) {
        tracing::debug!(
            processor = self.processor,
            controller = self.controller,
            bounds = self.bounds,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "processor",
            span_name = name,
            processor = self.processor,
            controller = self.controller,
        )
    }
}

/// A producer created an output for a consumer's input.
///
/// # Log Level
/// `trace!` - Wiring detail
pub struct ConnectionEstablished<'a> {
    pub producer: &'a str,
    pub input: &'a str,
    pub output: &'a str,
}

impl Display for ConnectionEstablished<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Processor '{}' connected output {} to input {}",
            self.producer, self.output, self.input
        )
    }
}

impl StructuredLog for ConnectionEstablished<'_> {
    fn log(&self) {
        tracing::trace!(
            producer = self.producer,
            input = self.input,
            output = self.output,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!(
            "connection",
            span_name = name,
            producer = self.producer,
            input = self.input,
            output = self.output,
        )
    }
}

/// A processor raised an exception to its controller.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use dagwood_reasoner::observability::messages::processor::ProcessorFailed;
///
/// let error = std::io::Error::new(std::io::ErrorKind::Other, "test error");
/// let msg = ProcessorFailed {
///     processor: "conclusion#3",
///     error: &error,
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct ProcessorFailed<'a> {
    pub processor: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for ProcessorFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Processor '{}' failed: {}", self.processor, self.error)
    }
}

impl StructuredLog for ProcessorFailed<'_> {
    fn log(&self) {
        tracing::error!(
            processor = self.processor,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "processor_failed",
            span_name = name,
            processor = self.processor,
            error = %self.error,
        )
    }
}

/// A processor fault was tolerated under the configured failure strategy.
///
/// # Log Level
/// `warn!` - Potential issue or degraded behavior
pub struct ProcessorFaultTolerated<'a> {
    pub processor: &'a str,
    pub strategy: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for ProcessorFaultTolerated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Ignoring fault in processor '{}' under {} strategy: {}",
            self.processor, self.strategy, self.error
        )
    }
}

impl StructuredLog for ProcessorFaultTolerated<'_> {
    fn log(&self) {
        tracing::warn!(
            processor = self.processor,
            strategy = self.strategy,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "processor_fault",
            span_name = name,
            processor = self.processor,
            strategy = self.strategy,
        )
    }
}
