// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Processor actor framework and the resolution driver.
//!
//! A resolution episode is a set of tokio tasks talking over unbounded queues:
//!
//! * one [`monitor::Monitor`] counting messages to detect quiescence
//! * one controller per [`request::ControllerId`] (a conjunction, an atomic query, or a rule
//!   conclusion), started on demand by the [`registry::ControllerRegistry`]
//! * one processor per controller and set of bounds, hosting a
//!   [`crate::reactive::ReactiveGraph`]
//!
//! Processors ask for inputs by routing a [`request::Request`] to a controller; the
//! producing processor answers with a new output off its hub. Answers only move when pulled.
//! The [`Reasoner`] drives episodes and reiterates them for cyclical rule sets.

pub mod concludable;
pub mod conclusion;
pub mod conjunction;
pub mod controller;
pub mod mailbox;
pub mod monitor;
pub mod processor;
pub mod reasoner;
pub mod registry;
pub mod request;

pub use monitor::EpisodeState;
pub use reasoner::{Reasoner, ReasonerOptions};
pub use registry::NegationTable;
pub use request::{Bounds, ControllerId};
