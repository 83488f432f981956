//! [`OpContext`]: cancellation plus an optional deadline, threaded through
//! every suspension point of an operation.

use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Cancelled;

/// Cancellation scope for one operation.
///
/// Deriving a context with [`with_timeout`](Self::with_timeout) yields a
/// child: cancelling the parent cancels it, the reverse does not hold, and
/// the child's deadline never outlives the parent's.
#[derive(Debug, Clone)]
pub struct OpContext {
  token:    CancellationToken,
  deadline: Option<Instant>,
}

impl OpContext {
  /// A context cancelled by `token`, with no deadline.
  pub fn new(token: CancellationToken) -> Self { Self { token, deadline: None } }

  /// A context that is never cancelled unless [`cancel`](Self::cancel) is
  /// called on it.
  pub fn background() -> Self { Self::new(CancellationToken::new()) }

  /// A child context that also expires after `timeout`.
  pub fn with_timeout(&self, timeout: Duration) -> Self {
    self.with_deadline(Instant::now() + timeout)
  }

  /// A child context that also expires at `deadline`.
  pub fn with_deadline(&self, deadline: Instant) -> Self {
    let deadline = match self.deadline {
      Some(parent) => parent.min(deadline),
      None => deadline,
    };
    Self { token: self.token.child_token(), deadline: Some(deadline) }
  }

  pub fn cancel(&self) { self.token.cancel() }

  pub fn deadline(&self) -> Option<Instant> { self.deadline }

  /// Why the context is done, or `None` while it still admits work.
  pub fn err(&self) -> Option<Cancelled> {
    if self.token.is_cancelled() {
      Some(Cancelled::Cancelled)
    } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
      Some(Cancelled::DeadlineExceeded)
    } else {
      None
    }
  }

  /// Resolves once the context is cancelled or its deadline passes.
  pub async fn done(&self) -> Cancelled {
    match self.deadline {
      Some(deadline) => tokio::select! {
        biased;
        () = self.token.cancelled() => Cancelled::Cancelled,
        () = tokio::time::sleep_until(deadline) => Cancelled::DeadlineExceeded,
      },
      None => {
        self.token.cancelled().await;
        Cancelled::Cancelled
      }
    }
  }

  /// Drive `fut` unless the context finishes first.
  ///
  /// A context that is already done fails without polling `fut` at all.
  pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Cancelled> {
    if let Some(reason) = self.err() {
      return Err(reason);
    }
    tokio::select! {
      biased;
      reason = self.done() => Err(reason),
      out = fut => Ok(out),
    }
  }

  /// Sleep for `duration`, waking early with an error if the context ends.
  pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
    self.run(tokio::time::sleep(duration)).await
  }
}
