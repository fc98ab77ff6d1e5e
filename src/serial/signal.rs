//! Completion signals for asynchronous device operations.
//!
//! A [`CompletionSignal`] is the wait-able object a worker parks on while a
//! device read or write is outstanding. Closing the signal (or the signal it
//! was derived from) abandons every wait in progress, which is how closing a
//! device makes outstanding I/O give up.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// Result of waiting on an operation through a [`CompletionSignal`]
#[derive(Debug)]
pub enum WaitOutcome<T> {
    /// The operation finished and produced its result
    Completed(T),
    /// The wait limit expired first
    TimedOut,
    /// The signal was closed while the operation was outstanding
    Abandoned,
}

pub struct CompletionSignal {
    closed: watch::Sender<bool>,
    parent: Option<watch::Receiver<bool>>,
}

impl CompletionSignal {
    /// Create a standalone signal
    pub fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self { closed, parent: None }
    }

    /// Create a signal that is also abandoned when `self` closes
    pub fn child(&self) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            closed,
            parent: Some(self.closed.subscribe()),
        }
    }

    /// Close the signal. Safe to call repeatedly.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        if *self.closed.borrow() {
            return true;
        }
        match &self.parent {
            // A dropped parent counts as closed.
            Some(parent) => *parent.borrow() || parent.has_changed().is_err(),
            None => false,
        }
    }

    async fn abandoned(&self) {
        let mut own = self.closed.subscribe();
        match self.parent.clone() {
            Some(mut parent) => {
                tokio::select! {
                    _ = own.wait_for(|closed| *closed) => {}
                    _ = parent.wait_for(|closed| *closed) => {}
                }
            }
            None => {
                let _ = own.wait_for(|closed| *closed).await;
            }
        }
    }

    /// Drive `op` to completion unless the signal closes or `limit` expires.
    ///
    /// `None` waits indefinitely. A signal that is already closed abandons
    /// the operation without polling it.
    pub async fn wait<F>(&self, op: F, limit: Option<Duration>) -> WaitOutcome<F::Output>
    where
        F: Future,
    {
        let guarded = async {
            tokio::select! {
                biased;
                _ = self.abandoned() => WaitOutcome::Abandoned,
                out = op => WaitOutcome::Completed(out),
            }
        };

        match limit {
            Some(limit) => tokio::time::timeout(limit, guarded)
                .await
                .unwrap_or(WaitOutcome::TimedOut),
            None => guarded.await,
        }
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("closed", &self.is_closed())
            .finish()
    }
}
