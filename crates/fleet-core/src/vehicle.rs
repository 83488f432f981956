//! Vehicle, the tracked entity. Provisioned outside the pipeline and
//! read-only to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::location::CurrentLocation;

/// A registered vehicle. `vehicle_id` is the external code carried in
/// transport topics and payloads; `entity_id` is the internal identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
  pub entity_id:    Uuid,
  pub vehicle_id:   String,
  pub vehicle_type: Option<String>,
  pub brand:        Option<String>,
  pub model:        Option<String>,
  pub year:         Option<i32>,
  pub status:       Option<String>,
  pub created_at:   DateTime<Utc>,
}

/// Input to the store's provisioning helper.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewVehicle {
  pub vehicle_id:   String,
  #[serde(default)]
  pub vehicle_type: Option<String>,
  #[serde(default)]
  pub brand:        Option<String>,
  #[serde(default)]
  pub model:        Option<String>,
  #[serde(default)]
  pub year:         Option<i32>,
  #[serde(default)]
  pub status:       Option<String>,
  /// Starting position. A vehicle provisioned without one has no current
  /// row and stays unknown to the pipeline until it is placed.
  #[serde(default)]
  pub location:     Option<InitialLocation>,
}

impl NewVehicle {
  pub fn new(vehicle_id: impl Into<String>) -> Self {
    Self { vehicle_id: vehicle_id.into(), ..Self::default() }
  }

  /// Provision the vehicle with a current row at this position.
  pub fn located(mut self, latitude: f64, longitude: f64, timestamp: i64) -> Self {
    self.location = Some(InitialLocation { latitude, longitude, timestamp });
    self
  }
}

/// The current-location row written when a vehicle is provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialLocation {
  pub latitude:  f64,
  pub longitude: f64,
  /// Sample time in epoch seconds.
  pub timestamp: i64,
}

/// A vehicle identity resolved for a sync, bundled with its current
/// location row. Vehicles without one never resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVehicle {
  pub entity_id:  Uuid,
  pub vehicle_id: String,
  pub current:    CurrentLocation,
}

impl ResolvedVehicle {
  /// Sample timestamp of the current row.
  pub fn current_timestamp(&self) -> i64 { self.current.timestamp }
}
