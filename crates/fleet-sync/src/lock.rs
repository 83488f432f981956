//! Per-entity serialization lock over a [`LockStore`] backend.
//!
//! A holder is identified by a random token written under the key; only the
//! token that set the key can delete it. Every holder gets a TTL so a
//! process that dies mid-operation blocks its entity for at most `ttl_ms`.

use std::{future::Future, sync::Arc, time::Duration};

use fleet_core::store::LockStore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::{
  context::OpContext,
  error::{BoxError, Cancelled, ConfigError},
};

/// Lock scope for location synchronisation.
pub const LOCATION_SYNC_SCOPE: &str = "location-sync";

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
  /// How long an acquired key stays valid without being released.
  pub ttl_ms:         u64,
  /// Pause between acquisition attempts while the key is held elsewhere.
  pub retry_delay_ms: u64,
}

impl Default for LockConfig {
  fn default() -> Self { Self { ttl_ms: 8_000, retry_delay_ms: 50 } }
}

impl LockConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.ttl_ms == 0 {
      return Err(ConfigError::invalid("lock.ttl_ms", "greater than zero", self.ttl_ms));
    }
    if self.retry_delay_ms == 0 {
      return Err(ConfigError::invalid(
        "lock.retry_delay_ms",
        "greater than zero",
        self.retry_delay_ms,
      ));
    }
    Ok(())
  }

  pub fn ttl(&self) -> Duration { Duration::from_millis(self.ttl_ms) }

  pub fn retry_delay(&self) -> Duration { Duration::from_millis(self.retry_delay_ms) }
}

// ─── Errors & handle ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LockError {
  #[error("lock acquisition aborted: {0}")]
  Cancelled(#[from] Cancelled),

  #[error("lock backend error: {0}")]
  Backend(#[source] BoxError),

  /// The key expired and may have been taken over before release.
  #[error("lock {key:?} was lost before release")]
  Lost { key: String },
}

/// Proof of ownership returned by [`EntityLock::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
  key:   String,
  token: Uuid,
}

impl LockHandle {
  pub fn key(&self) -> &str { &self.key }
}

// ─── EntityLock ──────────────────────────────────────────────────────────────

/// Named distributed mutex keyed by entity identity.
pub struct EntityLock<L> {
  backend: Arc<L>,
  config:  LockConfig,
}

impl<L> Clone for EntityLock<L> {
  fn clone(&self) -> Self { Self { backend: Arc::clone(&self.backend), config: self.config } }
}

impl<L: LockStore> EntityLock<L> {
  pub fn new(backend: Arc<L>, config: LockConfig) -> Self { Self { backend, config } }

  /// The backend key for `entity` within `scope`.
  pub fn key(scope: &str, entity: &str) -> String { format!("{scope}:{entity}") }

  /// Block until `key` is ours or `ctx` ends.
  pub async fn acquire(&self, key: &str, ctx: &OpContext) -> Result<LockHandle, LockError> {
    let token = Uuid::new_v4();
    let mut attempts: u32 = 0;

    loop {
      attempts += 1;
      let attempt = ctx.run(self.backend.try_acquire(key, token, self.config.ttl())).await;
      let acquired = match attempt {
        Ok(result) => result.map_err(|e| LockError::Backend(Box::new(e)))?,
        Err(reason) => {
          // The abandoned attempt may still have landed.
          self.release_quietly(key, token).await;
          return Err(reason.into());
        }
      };

      if acquired {
        trace!(key, attempts, "lock acquired");
        return Ok(LockHandle { key: key.to_owned(), token });
      }
      ctx.sleep(self.config.retry_delay()).await?;
    }
  }

  /// Give `handle` back. Not bound to any context.
  pub async fn release(&self, handle: LockHandle) -> Result<(), LockError> {
    let released = self
      .backend
      .release(&handle.key, handle.token)
      .await
      .map_err(|e| LockError::Backend(Box::new(e)))?;

    if released {
      trace!(key = %handle.key, "lock released");
      Ok(())
    } else {
      Err(LockError::Lost { key: handle.key })
    }
  }

  /// Run `body` while holding `key`, releasing afterwards. A failed release
  /// is logged, not returned.
  ///
  /// If `body` panics or the returned future is dropped mid-flight, the
  /// release is spawned onto the current runtime instead. Without a runtime
  /// the key is left to expire after `ttl_ms`.
  pub async fn scoped<T, F, Fut>(&self, key: &str, ctx: &OpContext, body: F) -> Result<T, LockError>
  where
    L: 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
  {
    let handle = self.acquire(key, ctx).await?;
    let mut guard = ReleaseOnDrop { backend: Arc::clone(&self.backend), handle: Some(handle) };
    let out = body().await;
    if let Some(handle) = guard.handle.take()
      && let Err(e) = self.release(handle).await
    {
      warn!(key, error = %e, "failed to release lock");
    }
    Ok(out)
  }

  async fn release_quietly(&self, key: &str, token: Uuid) {
    match self.backend.release(key, token).await {
      Ok(true) => debug!(key, "released lock won by an abandoned attempt"),
      Ok(false) => {}
      Err(e) => warn!(key, error = %e, "failed to clean up abandoned lock attempt"),
    }
  }
}

/// Releases a still-held handle from a spawned task when dropped.
struct ReleaseOnDrop<L: LockStore + 'static> {
  backend: Arc<L>,
  handle:  Option<LockHandle>,
}

impl<L: LockStore + 'static> Drop for ReleaseOnDrop<L> {
  fn drop(&mut self) {
    let Some(LockHandle { key, token }) = self.handle.take() else { return };
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
      warn!(key, "no runtime to release abandoned lock, waiting for expiry");
      return;
    };
    let backend = Arc::clone(&self.backend);
    runtime.spawn(async move {
      match backend.release(&key, token).await {
        Ok(true) => debug!(key, "released lock abandoned mid-operation"),
        Ok(false) => {}
        Err(e) => warn!(key, error = %e, "failed to release abandoned lock"),
      }
    });
  }
}
