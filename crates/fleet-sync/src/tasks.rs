//! Supervisor for fire-and-forget background work.
//!
//! Tasks are named; every failure (an `Err` result or a panic) is logged
//! with the task name and counted. [`BackgroundTasks::shutdown`] cancels
//! all of them and waits until they have stopped.

use std::{
  fmt::Display,
  future::Future,
  sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
  },
  time::Duration,
};

use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error};

#[derive(Clone)]
pub struct BackgroundTasks {
  tracker:  TaskTracker,
  shutdown: CancellationToken,
  failures: Arc<AtomicU64>,
}

impl Default for BackgroundTasks {
  fn default() -> Self { Self::new(CancellationToken::new()) }
}

impl BackgroundTasks {
  /// Tasks are cancelled when `shutdown` is.
  pub fn new(shutdown: CancellationToken) -> Self {
    Self { tracker: TaskTracker::new(), shutdown, failures: Arc::new(AtomicU64::new(0)) }
  }

  pub fn shutdown_token(&self) -> CancellationToken { self.shutdown.clone() }

  /// Failures observed so far across all tasks.
  pub fn failures(&self) -> u64 { self.failures.load(Ordering::Relaxed) }

  /// Tasks still running.
  pub fn len(&self) -> usize { self.tracker.len() }

  pub fn is_empty(&self) -> bool { self.tracker.is_empty() }

  /// Run `fut` once in the background.
  pub fn spawn<F, E>(&self, name: &'static str, fut: F)
  where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
  {
    let shutdown = self.shutdown.clone();
    let failures = Arc::clone(&self.failures);

    let work = tokio::spawn(async move {
      tokio::select! {
        biased;
        () = shutdown.cancelled() => debug!(task = name, "background task cancelled"),
        result = fut => match result {
          Ok(()) => debug!(task = name, "background task finished"),
          Err(e) => {
            failures.fetch_add(1, Ordering::Relaxed);
            error!(task = name, error = %e, "background task failed");
          }
        },
      }
    });

    let failures = Arc::clone(&self.failures);
    self.tracker.spawn(async move {
      if let Err(e) = work.await {
        if e.is_panic() {
          failures.fetch_add(1, Ordering::Relaxed);
          error!(task = name, "background task panicked");
        }
      }
    });
  }

  /// Run `job` every `period`, first after one full period. A failed run is
  /// logged and counted; the schedule continues.
  pub fn spawn_periodic<F, Fut, E>(&self, name: &'static str, period: Duration, job: F)
  where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
  {
    let failures = Arc::clone(&self.failures);
    self.spawn(name, async move {
      let start = tokio::time::Instant::now() + period;
      let mut ticker = tokio::time::interval_at(start, period);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      repeat(name, &mut ticker, &failures, job).await
    });
  }

  /// Wait for every task to finish on its own.
  pub async fn wait(&self) {
    self.tracker.close();
    self.tracker.wait().await;
  }

  /// Cancel every task and wait for all of them to stop.
  pub async fn shutdown(&self) {
    self.shutdown.cancel();
    self.tracker.close();
    self.tracker.wait().await;
  }
}

async fn repeat<F, Fut, E>(
  name: &'static str,
  ticker: &mut tokio::time::Interval,
  failures: &AtomicU64,
  mut job: F,
) -> Result<(), E>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<(), E>>,
  E: Display,
{
  loop {
    ticker.tick().await;
    if let Err(e) = job().await {
      failures.fetch_add(1, Ordering::Relaxed);
      error!(task = name, error = %e, "periodic task run failed");
    }
  }
}
