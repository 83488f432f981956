//! Location Sync Engine: staleness arbitration and the current/history
//! dual-write, serialized per vehicle.
//!
//! ```text
//! Idle → LockAcquired → EntityResolved → {Skip | UpdateCurrent}
//!      → HistoryAppended → Committed | RolledBack → LockReleased
//! ```
//!
//! The proximity check runs after the lock is released and never affects
//! the committed write.

use std::sync::Arc;

use fleet_core::{
  cache::SpatialCache,
  event::ProximityEvent,
  location::{AppliedSample, LocationSample, SyncPlan},
  publish::EventPublisher,
  store::{LocationStore, LockStore},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::{
  context::OpContext,
  error::{ProximityError, SyncError},
  lock::{EntityLock, LOCATION_SYNC_SCOPE},
  proximity::ProximityEngine,
};

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Which received samples are written to the history log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryPolicy {
  /// Every resolved sample, stale or duplicate ones included.
  #[default]
  AppendAll,
  /// Only samples that became the current location.
  AcceptedOnly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub history_policy: HistoryPolicy,
}

/// Staleness arbitration.
///
/// A sample supersedes the current row only when its timestamp is strictly
/// greater.
pub fn arbitrate(current_ts: i64, sample_ts: i64, policy: HistoryPolicy) -> SyncPlan {
  let newer = sample_ts > current_ts;
  SyncPlan {
    update_current: newer,
    append_history: newer || policy == HistoryPolicy::AppendAll,
  }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// Result of processing one sample. Processing never returns an error to
/// the transport; failures end up in [`SyncOutcome::Aborted`].
#[derive(Debug)]
pub enum SyncOutcome {
  /// No registered vehicle with a current location carries the sample's
  /// code. Nothing was written.
  UnknownEntity,
  /// The policy selected no write for this sample.
  Skipped,
  Committed {
    plan:      SyncPlan,
    applied:   AppliedSample,
    /// The proximity check that followed the commit.
    proximity: Result<Option<ProximityEvent>, ProximityError>,
  },
  /// Lock, store or cancellation failure. Nothing was written.
  Aborted(SyncError),
}

impl SyncOutcome {
  pub fn is_committed(&self) -> bool { matches!(self, Self::Committed { .. }) }
}

enum Locked {
  Skipped,
  Committed(SyncPlan, AppliedSample),
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct SyncEngine<S, L, C, P> {
  store:     Arc<S>,
  lock:      EntityLock<L>,
  proximity: ProximityEngine<C, P>,
  config:    SyncConfig,
}

impl<S, L, C, P> SyncEngine<S, L, C, P>
where
  S: LocationStore,
  L: LockStore + 'static,
  C: SpatialCache,
  P: EventPublisher,
{
  pub fn new(
    store: Arc<S>,
    lock: EntityLock<L>,
    proximity: ProximityEngine<C, P>,
    config: SyncConfig,
  ) -> Self {
    Self { store, lock, proximity, config }
  }

  pub fn config(&self) -> &SyncConfig { &self.config }

  /// Synchronise one validated sample.
  pub async fn process(&self, sample: &LocationSample, ctx: &OpContext) -> SyncOutcome {
    let vehicle_id = sample.vehicle_id.as_str();
    let key = EntityLock::<L>::key(LOCATION_SYNC_SCOPE, vehicle_id);

    let result = match self.lock.scoped(&key, ctx, || self.sync_locked(sample, ctx)).await {
      Ok(inner) => inner,
      Err(e) => Err(SyncError::Lock(e)),
    };

    match result {
      Ok(Locked::Committed(plan, applied)) => {
        let proximity = self
          .proximity
          .find_and_notify(vehicle_id, sample.latitude, sample.longitude, sample.timestamp, ctx)
          .await;
        SyncOutcome::Committed { plan, applied, proximity }
      }
      Ok(Locked::Skipped) => SyncOutcome::Skipped,
      Err(SyncError::UnknownEntity(_)) => {
        warn!(vehicle_id, "vehicle has no current location, dropping sample");
        SyncOutcome::UnknownEntity
      }
      Err(e) => {
        error!(vehicle_id, error = %e, "location sync aborted");
        SyncOutcome::Aborted(e)
      }
    }
  }

  /// The part of [`process`](Self::process) that runs under the lock.
  async fn sync_locked(&self, sample: &LocationSample, ctx: &OpContext) -> Result<Locked, SyncError> {
    let vehicle_id = sample.vehicle_id.as_str();

    let resolved = ctx
      .run(self.store.resolve_vehicle(vehicle_id))
      .await?
      .map_err(|e| SyncError::Store(Box::new(e)))?
      .ok_or_else(|| SyncError::UnknownEntity(sample.vehicle_id.clone()))?;

    let current_timestamp = resolved.current_timestamp();
    let plan = arbitrate(current_timestamp, sample.timestamp, self.config.history_policy);

    if !plan.update_current {
      debug!(
        vehicle_id,
        current_timestamp,
        new_timestamp = sample.timestamp,
        "sample is not newer than current location"
      );
    }
    if plan.is_noop() {
      return Ok(Locked::Skipped);
    }

    // A begun transaction is never abandoned, so its outcome is always known.
    if let Some(reason) = ctx.err() {
      return Err(reason.into());
    }
    let applied = self
      .store
      .apply_sample(resolved.entity_id, sample, plan)
      .await
      .map_err(|e| SyncError::Store(Box::new(e)))?;

    debug!(
      vehicle_id,
      current_timestamp,
      new_timestamp = sample.timestamp,
      current_updated = applied.current_updated,
      history_appended = applied.history_id.is_some(),
      "location synced"
    );
    Ok(Locked::Committed(plan, applied))
  }
}
