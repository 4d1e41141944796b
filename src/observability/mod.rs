// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! This module provides the message types for all diagnostic and operational logging in the
//! reasoner. Message types follow a struct-based pattern with a `Display` implementation to:
//!
//! * Keep log text out of the resolution code
//! * Give every event a consistent set of structured fields
//! * Allow a message to open a span as well as emit an event
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::engine` - resolution episodes and the reasoner driver
//! * `messages::processor` - processor and controller lifecycle
//! * `messages::cache` - semantic cache entries and completeness
//! * `messages::rule` - rule set construction and stratification
//! * `messages::validation` - configuration validation warnings and errors
//!
//! # Usage
//!
//! ```rust
//! use dagwood_reasoner::observability::messages::StructuredLog;
//! use dagwood_reasoner::observability::messages::engine::EpisodeStarted;
//!
//! let msg = EpisodeStarted {
//!     query: "{ $x isa person; }",
//!     iteration: 1,
//! };
//!
//! msg.log();
//! ```

pub mod messages;
