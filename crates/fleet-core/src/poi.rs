//! Points of interest. The durable store is the source of truth; the
//! spatial index is a rebuildable cache of this table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::location::Coordinate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
  pub id:          i64,
  pub name:        String,
  pub description: Option<String>,
  pub latitude:    f64,
  pub longitude:   f64,
  /// Free-form attributes; always a JSON object.
  pub attributes:  serde_json::Map<String, serde_json::Value>,
  pub created_at:  DateTime<Utc>,
}

impl PointOfInterest {
  pub fn coordinate(&self) -> Coordinate {
    Coordinate { latitude: self.latitude, longitude: self.longitude }
  }
}

/// Input to the store's provisioning helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPointOfInterest {
  pub name:        String,
  #[serde(default)]
  pub description: Option<String>,
  pub latitude:    f64,
  pub longitude:   f64,
  #[serde(default)]
  pub attributes:  serde_json::Map<String, serde_json::Value>,
}

impl NewPointOfInterest {
  pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
    Self {
      name: name.into(),
      description: None,
      latitude,
      longitude,
      attributes: serde_json::Map::new(),
    }
  }
}
