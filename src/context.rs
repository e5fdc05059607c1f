//! Cancellation context threaded through dispatch, aggregation and streaming

use crate::error::{FetchError, FetchResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation signal with an optional deadline.
///
/// Cloning shares the same signal. [`FetchContext::child`] derives a context
/// that is cancelled whenever its parent is, and can also be cancelled on its
/// own without affecting the parent.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl FetchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token, e.g. one tied to a client connection
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Set a deadline; an earlier existing deadline is kept
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The context error if it has been cancelled or its deadline has passed
    pub fn err(&self) -> Option<FetchError> {
        if self.token.is_cancelled() {
            return Some(FetchError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(FetchError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is cancelled or the deadline passes
    pub async fn done(&self) -> FetchError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => FetchError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => FetchError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                FetchError::Cancelled
            }
        }
    }

    /// Run `fut` until it completes or the context is done, whichever is first
    pub async fn run<T, F>(&self, fut: F) -> FetchResult<T>
    where
        F: Future<Output = FetchResult<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            result = fut => result,
        }
    }
}
