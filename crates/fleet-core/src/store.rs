//! The `LocationStore` and `LockStore` traits.
//!
//! Both are implemented by storage backends (e.g. `fleet-store-sqlite`).
//! The sync engine depends on these abstractions, never on a concrete
//! backend.

use std::{future::Future, time::Duration};

use uuid::Uuid;

use crate::{
  location::{AppliedSample, CurrentLocation, HistoryLocation, LocationSample, SyncPlan},
  poi::PointOfInterest,
  vehicle::ResolvedVehicle,
};

// ─── Transactional store ─────────────────────────────────────────────────────

/// Abstraction over the durable store backing the pipeline.
///
/// All methods return `Send` futures so the trait can be used from tasks
/// spawned on a multi-threaded tokio runtime.
pub trait LocationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Look up a vehicle by its external code, together with its current
  /// location row. Returns `None` for unknown or soft-deleted vehicles and
  /// for vehicles that have no current location row.
  fn resolve_vehicle<'a>(
    &'a self,
    vehicle_id: &'a str,
  ) -> impl Future<Output = Result<Option<ResolvedVehicle>, Self::Error>> + Send + 'a;

  /// Apply the writes selected by `plan` inside one transaction.
  ///
  /// Either every write in the plan is committed or none is. The current
  /// row is only overwritten when `sample.timestamp` is strictly greater
  /// than the stored timestamp, even if `plan.update_current` is set.
  fn apply_sample<'a>(
    &'a self,
    vehicle_entity_id: Uuid,
    sample: &'a LocationSample,
    plan: SyncPlan,
  ) -> impl Future<Output = Result<AppliedSample, Self::Error>> + Send + 'a;

  /// The current location of a vehicle, if any has been recorded.
  fn current_location<'a>(
    &'a self,
    vehicle_id: &'a str,
  ) -> impl Future<Output = Result<Option<CurrentLocation>, Self::Error>> + Send + 'a;

  /// History rows with `start <= timestamp <= end`, oldest first.
  fn history<'a>(
    &'a self,
    vehicle_id: &'a str,
    start: i64,
    end: i64,
  ) -> impl Future<Output = Result<Vec<HistoryLocation>, Self::Error>> + Send + 'a;

  /// Every point of interest that has not been soft-deleted.
  fn points_of_interest(
    &self,
  ) -> impl Future<Output = Result<Vec<PointOfInterest>, Self::Error>> + Send + '_;
}

// ─── Lock backend ────────────────────────────────────────────────────────────

/// A key-value backend offering atomic conditional-set with expiry.
///
/// This is the primitive under the per-entity serialization lock. Any
/// process that shares the backend shares the lock.
pub trait LockStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Set `key` to `token` for `ttl` unless another unexpired token holds it.
  /// Returns `true` when the caller now owns the key.
  fn try_acquire<'a>(
    &'a self,
    key: &'a str,
    token: Uuid,
    ttl: Duration,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Delete `key` only if it is still held by `token`. Returns `false` when
  /// ownership was already lost (expired and possibly taken over).
  fn release<'a>(
    &'a self,
    key: &'a str,
    token: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}
