//! Outbound proximity event. Published, never persisted.

use serde::{Deserialize, Serialize};

/// Emitted when a vehicle report lands within the search radius of a
/// point of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityEvent {
  pub vehicle_id: String,
  pub event:      String,
  pub location:   EventLocation,
  pub timestamp:  i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventLocation {
  pub latitude:  f64,
  pub longitude: f64,
}
