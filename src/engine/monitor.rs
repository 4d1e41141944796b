// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Quiescence detection for one resolution episode.
//!
//! Every actor reports `Sent` before it enqueues a message for another actor and `Processed`
//! once it has finished handling one. Reports share one FIFO queue, and a sender's report
//! always lands before the receiver can handle the message, so `sent == processed` only
//! holds when nothing is in flight and nobody is busy. From then on no actor can act again.

use crate::errors::ResolutionError;
use crate::reactive::ReactiveId;
use std::collections::HashSet;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub enum EpisodeState {
    Running,
    Done,
    Failed(ResolutionError),
}

impl EpisodeState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, EpisodeState::Running)
    }
}

enum MonitorMessage {
    Sent,
    Processed,
    RegisterPath {
        input: ReactiveId,
        output: ReactiveId,
    },
    Fail(ResolutionError),
}

/// Reporting side of the monitor, shared by every actor of the episode.
#[derive(Clone)]
pub struct MonitorHandle {
    sender: mpsc::UnboundedSender<MonitorMessage>,
}

impl MonitorHandle {
    pub fn sent(&self) {
        let _ = self.sender.send(MonitorMessage::Sent);
    }

    pub fn processed(&self) {
        let _ = self.sender.send(MonitorMessage::Processed);
    }

    /// Records that `input` is now bound to `output`. Each binding may be registered once.
    pub fn register_path(&self, input: ReactiveId, output: ReactiveId) {
        let _ = self.sender.send(MonitorMessage::RegisterPath { input, output });
    }

    pub fn fail(&self, error: ResolutionError) {
        let _ = self.sender.send(MonitorMessage::Fail(error));
    }
}

pub struct Monitor {
    receiver: mpsc::UnboundedReceiver<MonitorMessage>,
    state: watch::Sender<EpisodeState>,
    sent: u64,
    processed: u64,
    paths: HashSet<(ReactiveId, ReactiveId)>,
}

impl Monitor {
    /// Starts the monitor task. It runs until `token` is cancelled.
    pub fn spawn(
        token: CancellationToken,
    ) -> (MonitorHandle, watch::Receiver<EpisodeState>, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (state, watcher) = watch::channel(EpisodeState::Running);
        let monitor = Monitor {
            receiver,
            state,
            sent: 0,
            processed: 0,
            paths: HashSet::new(),
        };
        let task = tokio::spawn(monitor.run(token));
        (MonitorHandle { sender }, watcher, task)
    }

    async fn run(mut self, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                message = self.receiver.recv() => match message {
                    Some(message) => self.handle(message),
                    None => break,
                },
            }
        }
        tracing::trace!(
            sent = self.sent,
            processed = self.processed,
            paths = self.paths.len(),
            "Episode monitor stopped"
        );
    }

    fn handle(&mut self, message: MonitorMessage) {
        match message {
            MonitorMessage::Sent => self.sent += 1,
            MonitorMessage::Processed => {
                self.processed += 1;
                if self.sent > 0 && self.sent == self.processed {
                    self.finish(EpisodeState::Done);
                }
            }
            MonitorMessage::RegisterPath { input, output } => {
                if !self.paths.insert((input, output)) {
                    self.finish(EpisodeState::Failed(ResolutionError::DuplicatePath {
                        input: input.to_string(),
                        output: output.to_string(),
                    }));
                }
            }
            MonitorMessage::Fail(error) => self.finish(EpisodeState::Failed(error)),
        }
    }

    /// The first terminal state wins.
    fn finish(&mut self, state: EpisodeState) {
        self.state.send_if_modified(|current| {
            if current.is_finished() {
                return false;
            }
            *current = state;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn finished(mut watcher: watch::Receiver<EpisodeState>) -> EpisodeState {
        let state = watcher
            .wait_for(EpisodeState::is_finished)
            .await
            .expect("monitor alive");
        state.clone()
    }

    fn id(seq: u64) -> ReactiveId {
        ReactiveId { processor: 1, seq }
    }

    #[tokio::test]
    async fn done_once_every_sent_message_is_processed() {
        let token = CancellationToken::new();
        let (handle, watcher, _task) = Monitor::spawn(token.clone());
        handle.sent();
        handle.sent();
        handle.processed();
        assert!(!watcher.borrow().is_finished());
        handle.processed();
        assert!(matches!(finished(watcher).await, EpisodeState::Done));
        token.cancel();
    }

    #[tokio::test]
    async fn registering_a_binding_twice_fails_the_episode() {
        let token = CancellationToken::new();
        let (handle, watcher, _task) = Monitor::spawn(token.clone());
        handle.register_path(id(1), id(2));
        handle.register_path(id(1), id(3));
        handle.register_path(id(1), id(2));
        assert!(matches!(
            finished(watcher).await,
            EpisodeState::Failed(ResolutionError::DuplicatePath { .. })
        ));
        token.cancel();
    }

    #[tokio::test]
    async fn failure_is_not_overwritten_by_quiescence() {
        let token = CancellationToken::new();
        let (handle, watcher, _task) = Monitor::spawn(token.clone());
        handle.sent();
        handle.fail(ResolutionError::ProcessorFailed {
            processor: "conjunction#1".into(),
            reason: "boom".into(),
        });
        handle.processed();
        let state = finished(watcher.clone()).await;
        tokio::task::yield_now().await;
        assert!(matches!(state, EpisodeState::Failed(_)));
        assert!(matches!(*watcher.borrow(), EpisodeState::Failed(_)));
        token.cancel();
    }
}
