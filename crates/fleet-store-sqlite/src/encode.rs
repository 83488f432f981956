//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings, except sample timestamps
//! which stay as the integer epoch seconds the devices send. UUIDs are stored
//! as hyphenated lowercase strings. POI attributes are a compact JSON object.

use chrono::{DateTime, Utc};
use fleet_core::{
  location::{CurrentLocation, HistoryLocation},
  poi::PointOfInterest,
  vehicle::{ResolvedVehicle, Vehicle},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Attributes ──────────────────────────────────────────────────────────────

pub fn encode_attributes(
  attrs: &serde_json::Map<String, serde_json::Value>,
) -> Result<String> {
  Ok(serde_json::to_string(attrs)?)
}

pub fn decode_attributes(
  s: &str,
) -> Result<serde_json::Map<String, serde_json::Value>> {
  match serde_json::from_str(s)? {
    serde_json::Value::Object(map) => Ok(map),
    other => Err(Error::AttributesNotObject(other.to_string())),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// A `vehicles` row joined with its `current_locations` row.
pub struct RawResolvedVehicle {
  pub entity_id:  String,
  pub vehicle_id: String,
  // current_locations join
  pub current:    RawCurrentLocation,
}

impl RawResolvedVehicle {
  pub fn into_resolved(self) -> Result<ResolvedVehicle> {
    Ok(ResolvedVehicle {
      entity_id:  decode_uuid(&self.entity_id)?,
      vehicle_id: self.vehicle_id,
      current:    self.current.into_current()?,
    })
  }
}

pub struct RawCurrentLocation {
  pub entity_id:         String,
  pub vehicle_entity_id: String,
  pub vehicle_id:        String,
  pub latitude:          f64,
  pub longitude:         f64,
  pub timestamp:         i64,
  pub created_at:        String,
  pub updated_at:        Option<String>,
}

impl RawCurrentLocation {
  /// Read the seven current-location columns starting at `offset`.
  pub fn from_row(
    row: &rusqlite::Row<'_>,
    offset: usize,
    vehicle_id: &str,
  ) -> rusqlite::Result<Self> {
    Ok(Self {
      entity_id:         row.get(offset)?,
      vehicle_entity_id: row.get(offset + 1)?,
      vehicle_id:        vehicle_id.to_owned(),
      latitude:          row.get(offset + 2)?,
      longitude:         row.get(offset + 3)?,
      timestamp:         row.get(offset + 4)?,
      created_at:        row.get(offset + 5)?,
      updated_at:        row.get(offset + 6)?,
    })
  }

  pub fn into_current(self) -> Result<CurrentLocation> {
    Ok(CurrentLocation {
      entity_id:         decode_uuid(&self.entity_id)?,
      vehicle_entity_id: decode_uuid(&self.vehicle_entity_id)?,
      vehicle_id:        self.vehicle_id,
      latitude:          self.latitude,
      longitude:         self.longitude,
      timestamp:         self.timestamp,
      created_at:        decode_dt(&self.created_at)?,
      updated_at:        self.updated_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

pub struct RawHistoryLocation {
  pub entity_id:         String,
  pub vehicle_entity_id: String,
  pub latitude:          f64,
  pub longitude:         f64,
  pub timestamp:         i64,
  pub created_at:        String,
}

impl RawHistoryLocation {
  pub fn into_history(self) -> Result<HistoryLocation> {
    Ok(HistoryLocation {
      entity_id:         decode_uuid(&self.entity_id)?,
      vehicle_entity_id: decode_uuid(&self.vehicle_entity_id)?,
      latitude:          self.latitude,
      longitude:         self.longitude,
      timestamp:         self.timestamp,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawPointOfInterest {
  pub id:          i64,
  pub name:        String,
  pub description: Option<String>,
  pub latitude:    f64,
  pub longitude:   f64,
  pub attributes:  String,
  pub created_at:  String,
}

impl RawPointOfInterest {
  pub fn into_point(self) -> Result<PointOfInterest> {
    Ok(PointOfInterest {
      id:          self.id,
      name:        self.name,
      description: self.description,
      latitude:    self.latitude,
      longitude:   self.longitude,
      attributes:  decode_attributes(&self.attributes)?,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `vehicles` row.
pub struct RawVehicle {
  pub entity_id:    String,
  pub vehicle_id:   String,
  pub vehicle_type: Option<String>,
  pub brand:        Option<String>,
  pub model:        Option<String>,
  pub year:         Option<i32>,
  pub status:       Option<String>,
  pub created_at:   String,
}

impl RawVehicle {
  /// Read the eight `vehicles` columns in declaration order.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entity_id:    row.get(0)?,
      vehicle_id:   row.get(1)?,
      vehicle_type: row.get(2)?,
      brand:        row.get(3)?,
      model:        row.get(4)?,
      year:         row.get(5)?,
      status:       row.get(6)?,
      created_at:   row.get(7)?,
    })
  }

  pub fn into_vehicle(self) -> Result<Vehicle> {
    Ok(Vehicle {
      entity_id:    decode_uuid(&self.entity_id)?,
      vehicle_id:   self.vehicle_id,
      vehicle_type: self.vehicle_type,
      brand:        self.brand,
      model:        self.model,
      year:         self.year,
      status:       self.status,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}
