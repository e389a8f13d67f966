//! Caller-supplied deadlines for store operations.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// An optional point in time after which an operation is abandoned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

/// The deadline passed before the operation completed.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("deadline exceeded")]
pub struct DeadlineExceeded;

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }

    /// No deadline.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// Time left, `None` when unbounded. Zero once expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.0
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(left) if left.is_zero())
    }

    /// Drive `fut` to completion, dropping it if the deadline passes first.
    pub async fn run<F>(self, fut: F) -> Result<F::Output, DeadlineExceeded>
    where
        F: Future,
    {
        match self.0 {
            None => Ok(fut.await),
            // An expired deadline never starts the operation.
            Some(at) if Instant::now() >= at => Err(DeadlineExceeded),
            Some(at) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| DeadlineExceeded),
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}
