//! Seed file loading: registers vehicles and points of interest.
//!
//! ```json
//! {
//!   "vehicles": [{
//!     "vehicle_id": "B1234ABC",
//!     "brand": "Toyota",
//!     "location": { "latitude": -6.2, "longitude": 106.8, "timestamp": 0 }
//!   }],
//!   "points_of_interest": [{ "name": "Monas", "latitude": -6.17, "longitude": 106.82 }]
//! }
//! ```
//!
//! Seeding is idempotent: vehicles already registered and points with the
//! same name and position are left alone. A registered vehicle that was
//! never placed gets the file's `location` as its current row. Vehicles
//! without one stay unknown to ingestion.

use std::path::Path;

use fleet_core::{
  poi::NewPointOfInterest, store::LocationStore as _, vehicle::NewVehicle,
};
use fleet_store_sqlite::SqliteStore;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedFile {
  #[serde(default)]
  pub vehicles:           Vec<NewVehicle>,
  #[serde(default)]
  pub points_of_interest: Vec<NewPointOfInterest>,
}

impl SeedFile {
  pub fn from_slice(bytes: &[u8]) -> Result<Self> { Ok(serde_json::from_slice(bytes)?) }

  pub async fn load(path: &Path) -> Result<Self> {
    let bytes = tokio::fs::read(path).await?;
    Self::from_slice(&bytes)
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
  pub vehicles_added:  usize,
  pub vehicles_kept:   usize,
  /// Previously registered vehicles given their first current row.
  pub vehicles_placed: usize,
  pub points_added:    usize,
  pub points_kept:     usize,
}

/// Register everything in `file` that is not already in the store.
pub async fn apply(store: &SqliteStore, file: SeedFile) -> Result<SeedReport> {
  let mut report = SeedReport::default();

  for vehicle in file.vehicles {
    let vehicle_id = vehicle.vehicle_id.clone();
    let location = vehicle.location;
    match store.add_vehicle(vehicle).await {
      Ok(_) => report.vehicles_added += 1,
      Err(fleet_store_sqlite::Error::DuplicateVehicle(_)) => {
        debug!(vehicle_id, "vehicle already registered");
        report.vehicles_kept += 1;
        if let Some(location) = location
          && store.current_location(&vehicle_id).await?.is_none()
        {
          store.place_vehicle(&vehicle_id, location).await?;
          debug!(vehicle_id, "placed registered vehicle");
          report.vehicles_placed += 1;
        }
      }
      Err(e) => return Err(Error::Store(e)),
    }
  }

  let existing = store.points_of_interest().await?;
  for point in file.points_of_interest {
    let known = existing.iter().any(|p| {
      p.name == point.name && p.latitude == point.latitude && p.longitude == point.longitude
    });
    if known {
      debug!(name = %point.name, "point of interest already present");
      report.points_kept += 1;
      continue;
    }
    store.add_point_of_interest(point).await?;
    report.points_added += 1;
  }

  info!(
    vehicles_added = report.vehicles_added,
    vehicles_kept = report.vehicles_kept,
    vehicles_placed = report.vehicles_placed,
    points_added = report.points_added,
    points_kept = report.points_kept,
    "seed applied"
  );
  Ok(report)
}
