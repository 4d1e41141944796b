// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::monitor::MonitorHandle;
use tokio::sync::mpsc;

/// Sending half of an actor's queue. Every send is reported to the episode monitor first, so
/// the monitor never sees an episode go quiet while a message is in flight.
pub struct Mailbox<M> {
    sender: mpsc::UnboundedSender<M>,
    monitor: MonitorHandle,
}

impl<M> Mailbox<M> {
    pub fn new(monitor: MonitorHandle) -> (Self, mpsc::UnboundedReceiver<M>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender, monitor }, receiver)
    }

    /// Enqueues `message`. A closed queue counts the message as handled straight away.
    pub fn send(&self, message: M) {
        self.monitor.sent();
        if self.sender.send(message).is_err() {
            self.monitor.processed();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn monitor(&self) -> &MonitorHandle {
        &self.monitor
    }
}

impl<M> Clone for Mailbox<M> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            monitor: self.monitor.clone(),
        }
    }
}
