//! Location types: samples as they arrive, and the two persisted shapes
//! (the single current row per vehicle and the append-only history log).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Coordinate ──────────────────────────────────────────────────────────────

/// A WGS84 point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
  pub latitude:  f64,
  pub longitude: f64,
}

impl Coordinate {
  /// Build a coordinate, rejecting anything outside the valid ranges
  /// (NaN included).
  pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
    if !(-90.0..=90.0).contains(&latitude) {
      return Err(Error::LatitudeOutOfRange(latitude));
    }
    if !(-180.0..=180.0).contains(&longitude) {
      return Err(Error::LongitudeOutOfRange(longitude));
    }
    Ok(Self { latitude, longitude })
  }
}

// ─── Sample ──────────────────────────────────────────────────────────────────

/// One validated position report for a vehicle.
///
/// `timestamp` is the device-side sample time in epoch seconds; it is the
/// only value staleness arbitration looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
  pub vehicle_id: String,
  pub latitude:   f64,
  pub longitude:  f64,
  pub timestamp:  i64,
}

impl LocationSample {
  pub fn coordinate(&self) -> Coordinate {
    Coordinate { latitude: self.latitude, longitude: self.longitude }
  }
}

// ─── Persisted rows ──────────────────────────────────────────────────────────

/// The single authoritative latest-known position of a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentLocation {
  pub entity_id:         Uuid,
  pub vehicle_entity_id: Uuid,
  pub vehicle_id:        String,
  pub latitude:          f64,
  pub longitude:         f64,
  pub timestamp:         i64,
  pub created_at:        DateTime<Utc>,
  pub updated_at:        Option<DateTime<Utc>>,
}

/// One received sample, recorded regardless of whether it became current.
/// Rows are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryLocation {
  pub entity_id:         Uuid,
  pub vehicle_entity_id: Uuid,
  pub latitude:          f64,
  pub longitude:         f64,
  pub timestamp:         i64,
  pub created_at:        DateTime<Utc>,
}

// ─── Write plan ──────────────────────────────────────────────────────────────

/// The outcome of staleness arbitration: which of the two writes a sample
/// produces. Applied by [`crate::store::LocationStore::apply_sample`] in a
/// single transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPlan {
  pub update_current: bool,
  pub append_history: bool,
}

impl SyncPlan {
  pub fn is_noop(&self) -> bool { !self.update_current && !self.append_history }
}

/// What a committed [`SyncPlan`] actually changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedSample {
  /// `false` when the store's own timestamp guard refused the upsert,
  /// even though the plan asked for it.
  pub current_updated: bool,
  pub history_id:      Option<Uuid>,
}
