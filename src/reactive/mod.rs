// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Pull-driven reactive operator algebra.
//!
//! Every processor owns one [`ReactiveGraph`]: an arena of stages addressed by [`ReactiveId`].
//! A stage is a publisher, a subscriber or both. Packets only ever move downstream in answer
//! to a pull, so at any point the number of packets a subscriber has received from a
//! publisher never exceeds the number of pulls it sent to it.
//!
//! Work inside a graph is processed by an iterative signal loop. Anything that has to leave
//! the processor (pulling a remote producer, delivering to a remote consumer, spawning new
//! inputs, reporting a fault) comes back to the caller as an [`Effect`].
//!
//! # Operators
//!
//! | Stage       | Publishers | Subscribers | Behaviour                                          |
//! |-------------|------------|-------------|----------------------------------------------------|
//! | `source`    | 0          | 1           | lazy iterator, created on first pull               |
//! | `map`       | 1          | 1           | one packet in, one packet out                      |
//! | `flat_map`  | 1          | 1           | one packet in, zero or more out, each pulled       |
//! | `buffer`    | many       | 1           | fan-in, keeps received packets until pulled        |
//! | `distinct`  | 1          | 1           | drops packets it has already forwarded             |
//! | `broadcast` | 1          | many        | replay log with one cursor per subscriber          |
//! | `expand`    | 1          | 1           | never forwards; turns packets into effects         |
//! | `input`     | remote     | 1           | receiving end of a cross-processor connection      |
//! | `output`    | 1          | remote      | sending end of a cross-processor connection        |

mod graph;
mod stage;

pub use graph::ReactiveGraph;
pub use stage::{FlatMapFn, MapFn, SourceFactory};

use crate::errors::ResolutionError;
use std::fmt::{Display, Formatter};

/// Process-unique handle of a reactive node: the owning processor plus a local sequence
/// number handed out by [`ReactiveGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReactiveId {
    pub processor: u64,
    pub seq: u64,
}

impl Display for ReactiveId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.processor, self.seq)
    }
}

/// Work the graph hands back to the processor hosting it.
#[derive(Debug)]
pub enum Effect<P> {
    /// A connected input must pull its remote output.
    PullRemote { input: ReactiveId },
    /// An input was pulled before its connection finished; retry once it does.
    AwaitConnection {
        input: ReactiveId,
        subscriber: ReactiveId,
    },
    /// An output received a packet for its remote consumer.
    Deliver { output: ReactiveId, packet: P },
    /// An expand stage received a packet.
    Expand { stage: ReactiveId, packet: P },
    SourceExhausted { source: ReactiveId },
    /// An operator function failed; the packet it was handling is gone.
    Fault {
        stage: ReactiveId,
        error: ResolutionError,
    },
}
