//! Shared fixtures and fault-injecting collaborators for unit tests.

use std::{
  sync::atomic::{AtomicUsize, Ordering},
  time::Duration,
};

use bytes::Bytes;
use chrono::Utc;
use fleet_core::{
  cache::{NearbyPoint, RadiusQuery, RebuildReport, SpatialCache},
  location::{AppliedSample, CurrentLocation, HistoryLocation, LocationSample, SyncPlan},
  poi::PointOfInterest,
  publish::EventPublisher,
  store::{LocationStore, LockStore},
  vehicle::ResolvedVehicle,
};
use fleet_store_sqlite::SqliteStore;
use uuid::Uuid;

pub fn sample(vehicle_id: &str, timestamp: i64, latitude: f64, longitude: f64) -> LocationSample {
  LocationSample { vehicle_id: vehicle_id.into(), latitude, longitude, timestamp }
}

pub fn poi(id: i64, name: &str, latitude: f64, longitude: f64) -> PointOfInterest {
  PointOfInterest {
    id,
    name: name.into(),
    description: None,
    latitude,
    longitude,
    attributes: serde_json::Map::new(),
    created_at: Utc::now(),
  }
}

#[derive(Debug, thiserror::Error)]
#[error("injected failure")]
pub struct Injected;

// ─── Failing collaborators ───────────────────────────────────────────────────

pub struct FailingLocks;

impl LockStore for FailingLocks {
  type Error = Injected;

  async fn try_acquire(&self, _key: &str, _token: Uuid, _ttl: Duration) -> Result<bool, Injected> {
    Err(Injected)
  }

  async fn release(&self, _key: &str, _token: Uuid) -> Result<bool, Injected> { Err(Injected) }
}

pub struct FailingCache;

impl SpatialCache for FailingCache {
  type Error = Injected;

  async fn replace(&self, _points: Vec<PointOfInterest>) -> Result<RebuildReport, Injected> {
    Err(Injected)
  }

  async fn radius_query(&self, _query: RadiusQuery) -> Result<Vec<NearbyPoint>, Injected> {
    Err(Injected)
  }
}

pub struct FailingPublisher;

impl EventPublisher for FailingPublisher {
  type Error = Injected;

  async fn publish(&self, _exchange: &str, _routing_key: &str, _body: Bytes) -> Result<(), Injected> {
    Err(Injected)
  }
}

/// A store whose points-of-interest read always fails.
pub struct BrokenCatalog(pub SqliteStore);

impl LocationStore for BrokenCatalog {
  type Error = fleet_store_sqlite::Error;

  async fn resolve_vehicle(&self, vehicle_id: &str) -> fleet_store_sqlite::Result<Option<ResolvedVehicle>> {
    self.0.resolve_vehicle(vehicle_id).await
  }

  async fn apply_sample(
    &self,
    vehicle_entity_id: Uuid,
    sample: &LocationSample,
    plan: SyncPlan,
  ) -> fleet_store_sqlite::Result<AppliedSample> {
    self.0.apply_sample(vehicle_entity_id, sample, plan).await
  }

  async fn current_location(&self, vehicle_id: &str) -> fleet_store_sqlite::Result<Option<CurrentLocation>> {
    self.0.current_location(vehicle_id).await
  }

  async fn history(
    &self,
    vehicle_id: &str,
    start: i64,
    end: i64,
  ) -> fleet_store_sqlite::Result<Vec<HistoryLocation>> {
    self.0.history(vehicle_id, start, end).await
  }

  async fn points_of_interest(&self) -> fleet_store_sqlite::Result<Vec<PointOfInterest>> {
    Err(fleet_store_sqlite::Error::DateParse("injected".into()))
  }
}

// ─── Concurrency tracking────────────────────────────────────────────────────

/// Wraps a store and records the highest number of overlapping
/// resolve/apply calls.
pub struct CountingStore {
  inner:     SqliteStore,
  in_flight: AtomicUsize,
  max:       AtomicUsize,
}

impl CountingStore {
  pub fn new(inner: SqliteStore) -> Self {
    Self { inner, in_flight: AtomicUsize::new(0), max: AtomicUsize::new(0) }
  }

  pub fn max_concurrent(&self) -> usize { self.max.load(Ordering::SeqCst) }

  fn enter(&self) {
    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.max.fetch_max(now, Ordering::SeqCst);
  }

  fn exit(&self) { self.in_flight.fetch_sub(1, Ordering::SeqCst); }
}

impl LocationStore for CountingStore {
  type Error = fleet_store_sqlite::Error;

  async fn resolve_vehicle(&self, vehicle_id: &str) -> fleet_store_sqlite::Result<Option<ResolvedVehicle>> {
    self.enter();
    tokio::time::sleep(Duration::from_millis(2)).await;
    let out = self.inner.resolve_vehicle(vehicle_id).await;
    self.exit();
    out
  }

  async fn apply_sample(
    &self,
    vehicle_entity_id: Uuid,
    sample: &LocationSample,
    plan: SyncPlan,
  ) -> fleet_store_sqlite::Result<AppliedSample> {
    self.enter();
    tokio::time::sleep(Duration::from_millis(2)).await;
    let out = self.inner.apply_sample(vehicle_entity_id, sample, plan).await;
    self.exit();
    out
  }

  async fn current_location(&self, vehicle_id: &str) -> fleet_store_sqlite::Result<Option<CurrentLocation>> {
    self.inner.current_location(vehicle_id).await
  }

  async fn history(
    &self,
    vehicle_id: &str,
    start: i64,
    end: i64,
  ) -> fleet_store_sqlite::Result<Vec<HistoryLocation>> {
    self.inner.history(vehicle_id, start, end).await
  }

  async fn points_of_interest(&self) -> fleet_store_sqlite::Result<Vec<PointOfInterest>> {
    self.inner.points_of_interest().await
  }
}
