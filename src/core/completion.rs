//! # Completion handle for submitted session commands.
//!
//! A [`Completion`] resolves once the background loop has executed (or dropped)
//! the command. Callers may ignore it, block on it from a plain thread with
//! [`Completion::wait`], or `.await` it from async code.
//!
//! ## Rules
//! - A command dropped without a reply (loop gone) resolves to [`SessionError::Stopped`].
//! - `wait()` must not be called from inside an async runtime.

use std::future::IntoFuture;
use std::time::Duration;

use futures::FutureExt;
use futures::future::Map;
use tokio::sync::oneshot;

use crate::error::SessionError;

type Outcome = Result<(), SessionError>;
type Received = Result<Outcome, oneshot::error::RecvError>;

/// Sending half kept next to the queued command.
pub(crate) type Reply = oneshot::Sender<Outcome>;

/// Handle to the eventual outcome of a submitted command.
#[must_use = "a completion can be ignored, but it is usually worth checking"]
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Outcome>,
}

impl Completion {
    /// Creates a pending completion and its reply half.
    pub(crate) fn pending() -> (Reply, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Creates an already resolved completion.
    pub(crate) fn ready(outcome: Outcome) -> Self {
        let (tx, completion) = Self::pending();
        let _ = tx.send(outcome);
        completion
    }

    /// Blocks the current thread until the command finished.
    ///
    /// # Panics
    /// Panics if called from within an asynchronous execution context.
    pub fn wait(self) -> Outcome {
        flatten(self.rx.blocking_recv())
    }

    /// Blocks for at most `timeout`; `None` if the command is still pending.
    ///
    /// The completion stays usable after a timeout.
    ///
    /// # Panics
    /// Panics if called from within an asynchronous execution context.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<Outcome> {
        if let Some(outcome) = self.try_outcome() {
            return Some(outcome);
        }
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => return Some(Err(SessionError::Runtime(e.to_string()))),
        };
        // The timer must be created inside the runtime.
        let rx = &mut self.rx;
        rt.block_on(async move { tokio::time::timeout(timeout, rx).await })
            .ok()
            .map(flatten)
    }

    /// Returns the outcome if it is already available.
    pub fn try_outcome(&mut self) -> Option<Outcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(SessionError::Stopped)),
        }
    }
}

fn flatten(received: Received) -> Outcome {
    received.unwrap_or(Err(SessionError::Stopped))
}

impl IntoFuture for Completion {
    type Output = Outcome;
    type IntoFuture = Map<oneshot::Receiver<Outcome>, fn(Received) -> Outcome>;

    fn into_future(self) -> Self::IntoFuture {
        self.rx.map(flatten as fn(Received) -> Outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PublishError;

    #[test]
    fn ready_resolves_immediately() {
        let c = Completion::ready(Err(PublishError::NotConnected.into()));
        assert_eq!(c.wait(), Err(SessionError::Publish(PublishError::NotConnected)));
    }

    #[test]
    fn dropped_reply_means_stopped() {
        let (tx, mut c) = Completion::pending();
        assert_eq!(c.try_outcome(), None);
        drop(tx);
        assert_eq!(c.try_outcome(), Some(Err(SessionError::Stopped)));
    }

    #[test]
    fn wait_timeout_leaves_pending_completion_usable() {
        let (tx, mut c) = Completion::pending();
        assert_eq!(c.wait_timeout(Duration::from_millis(10)), None);
        tx.send(Ok(())).unwrap();
        assert_eq!(c.wait_timeout(Duration::from_millis(10)), Some(Ok(())));
    }

    #[tokio::test]
    async fn awaitable() {
        let (tx, c) = Completion::pending();
        tx.send(Ok(())).unwrap();
        assert_eq!(c.await, Ok(()));
    }
}
