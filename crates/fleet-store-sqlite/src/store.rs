//! [`SqliteStore`]: the SQLite implementation of [`LocationStore`].

use std::{path::Path, time::Duration};

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use tracing::debug;
use uuid::Uuid;

use fleet_core::{
  location::{AppliedSample, CurrentLocation, HistoryLocation, LocationSample, SyncPlan},
  poi::{NewPointOfInterest, PointOfInterest},
  store::LocationStore,
  vehicle::{InitialLocation, NewVehicle, ResolvedVehicle, Vehicle},
};

use crate::{
  encode::{
    encode_attributes, encode_dt, encode_uuid, RawCurrentLocation, RawHistoryLocation,
    RawPointOfInterest, RawResolvedVehicle, RawVehicle,
  },
  schema::SCHEMA,
  Error, Result,
};

/// How long a connection waits on a write lock held by another process
/// before failing with `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// A fleet store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Separate
/// processes (or separate `open` calls) on the same file share data and
/// locks.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    debug!(path = %path.display(), "store opened");
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Provisioning ──────────────────────────────────────────────────────────

  /// Register a vehicle, together with its current row when
  /// `input.location` is set. Vehicles are normally provisioned by a
  /// separate process; this exists for seeding and tests.
  pub async fn add_vehicle(&self, input: NewVehicle) -> Result<Vehicle> {
    let vehicle = Vehicle {
      entity_id:    Uuid::new_v4(),
      vehicle_id:   input.vehicle_id,
      vehicle_type: input.vehicle_type,
      brand:        input.brand,
      model:        input.model,
      year:         input.year,
      status:       input.status,
      created_at:   Utc::now(),
    };

    let id_str     = encode_uuid(vehicle.entity_id);
    let current_id = encode_uuid(Uuid::new_v4());
    let at_str     = encode_dt(vehicle.created_at);
    let location   = input.location;
    let row        = vehicle.clone();

    let inserted = self
      .conn
      .call(move |conn| {
        // Dropping `tx` without commit rolls back.
        let tx = conn.transaction()?;
        let res = tx.execute(
          "INSERT INTO vehicles (
             entity_id, vehicle_id, vehicle_type, brand, model, year, status, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str,
            row.vehicle_id,
            row.vehicle_type,
            row.brand,
            row.model,
            row.year,
            row.status,
            at_str,
          ],
        );
        match res {
          Ok(_) => {}
          Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
          {
            return Ok(false);
          }
          Err(e) => return Err(e.into()),
        }

        if let Some(location) = location {
          write_current(&tx, &id_str, &current_id, location, &at_str)?;
        }
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(Error::DuplicateVehicle(vehicle.vehicle_id));
    }
    Ok(vehicle)
  }

  /// Set the current row of a registered vehicle, creating it if needed.
  /// Provisioning only: no history row is written and no timestamp guard
  /// applies.
  pub async fn place_vehicle(
    &self,
    vehicle_id: &str,
    location: InitialLocation,
  ) -> Result<CurrentLocation> {
    let code       = vehicle_id.to_owned();
    let current_id = encode_uuid(Uuid::new_v4());
    let at_str     = encode_dt(Utc::now());

    let placed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let entity_id: Option<String> = tx
          .query_row(
            "SELECT entity_id FROM vehicles WHERE vehicle_id = ?1 AND deleted_at IS NULL",
            rusqlite::params![code],
            |row| row.get(0),
          )
          .optional()?;
        let Some(entity_id) = entity_id else {
          return Ok(false);
        };
        write_current(&tx, &entity_id, &current_id, location, &at_str)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !placed {
      return Err(Error::UnknownVehicle(vehicle_id.to_owned()));
    }
    self
      .current_location(vehicle_id)
      .await?
      .ok_or_else(|| Error::UnknownVehicle(vehicle_id.to_owned()))
  }

  /// Fetch a registered, non-deleted vehicle by its external code.
  pub async fn vehicle(&self, vehicle_id: &str) -> Result<Option<Vehicle>> {
    let vehicle_id = vehicle_id.to_owned();

    let raw: Option<RawVehicle> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT entity_id, vehicle_id, vehicle_type, brand, model, year, status, created_at
             FROM vehicles
             WHERE vehicle_id = ?1 AND deleted_at IS NULL",
            rusqlite::params![vehicle_id],
            RawVehicle::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawVehicle::into_vehicle).transpose()
  }

  /// Every registered, non-deleted vehicle, ordered by external code.
  pub async fn vehicles(&self) -> Result<Vec<Vehicle>> {
    let raws: Vec<RawVehicle> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT entity_id, vehicle_id, vehicle_type, brand, model, year, status, created_at
           FROM vehicles
           WHERE deleted_at IS NULL
           ORDER BY vehicle_id",
        )?;

        let rows = stmt
          .query_map([], RawVehicle::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVehicle::into_vehicle).collect()
  }

  /// Insert a point of interest and return it with its assigned id.
  pub async fn add_point_of_interest(
    &self,
    input: NewPointOfInterest,
  ) -> Result<PointOfInterest> {
    let created_at = Utc::now();
    let at_str     = encode_dt(created_at);
    let attrs_str  = encode_attributes(&input.attributes)?;
    let row        = input.clone();

    let id: i64 = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO points_of_interest (
             name, description, latitude, longitude, attributes, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            row.name,
            row.description,
            row.latitude,
            row.longitude,
            attrs_str,
            at_str,
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(PointOfInterest {
      id,
      name: input.name,
      description: input.description,
      latitude: input.latitude,
      longitude: input.longitude,
      attributes: input.attributes,
      created_at,
    })
  }

  /// Soft-delete a point of interest. Returns `false` if no live row matched.
  pub async fn delete_point_of_interest(&self, id: i64) -> Result<bool> {
    let at_str = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE points_of_interest SET deleted_at = ?2
           WHERE id = ?1 AND deleted_at IS NULL",
          rusqlite::params![id, at_str],
        )?)
      })
      .await?;

    Ok(changed == 1)
  }
}

/// Unconditional upsert of a vehicle's current row.
fn write_current(
  conn: &rusqlite::Connection,
  vehicle_entity_id: &str,
  current_id: &str,
  location: InitialLocation,
  at: &str,
) -> rusqlite::Result<usize> {
  conn.execute(
    "INSERT INTO current_locations (
       vehicle_entity_id, entity_id, latitude, longitude, timestamp, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT (vehicle_entity_id) DO UPDATE SET
       latitude   = excluded.latitude,
       longitude  = excluded.longitude,
       timestamp  = excluded.timestamp,
       updated_at = excluded.created_at",
    rusqlite::params![
      vehicle_entity_id,
      current_id,
      location.latitude,
      location.longitude,
      location.timestamp,
      at,
    ],
  )
}

// ─── LocationStore impl ──────────────────────────────────────────────────────

impl LocationStore for SqliteStore {
  type Error = Error;

  async fn resolve_vehicle(&self, vehicle_id: &str) -> Result<Option<ResolvedVehicle>> {
    let vehicle_id = vehicle_id.to_owned();

    let raw: Option<RawResolvedVehicle> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT
               v.entity_id, v.vehicle_id,
               c.entity_id, c.vehicle_entity_id, c.latitude, c.longitude,
               c.timestamp, c.created_at, c.updated_at
             FROM vehicles v
             JOIN current_locations c ON c.vehicle_entity_id = v.entity_id
             WHERE v.vehicle_id = ?1 AND v.deleted_at IS NULL
             LIMIT 1",
            rusqlite::params![vehicle_id],
            |row| {
              let vehicle_id: String = row.get(1)?;
              let current = RawCurrentLocation::from_row(row, 2, &vehicle_id)?;
              Ok(RawResolvedVehicle {
                entity_id: row.get(0)?,
                vehicle_id,
                current,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawResolvedVehicle::into_resolved).transpose()
  }

  async fn apply_sample(
    &self,
    vehicle_entity_id: Uuid,
    sample: &LocationSample,
    plan: SyncPlan,
  ) -> Result<AppliedSample> {
    let vehicle_str = encode_uuid(vehicle_entity_id);
    let now_str     = encode_dt(Utc::now());
    let current_id  = encode_uuid(Uuid::new_v4());
    let history_id  = plan.append_history.then(Uuid::now_v7);
    let history_str = history_id.map(encode_uuid);
    let latitude    = sample.latitude;
    let longitude   = sample.longitude;
    let timestamp   = sample.timestamp;

    let current_updated = self
      .conn
      .call(move |conn| {
        // Dropping `tx` without commit rolls back.
        let tx = conn.transaction()?;

        let mut current_updated = false;
        if plan.update_current {
          let changed = tx.execute(
            "INSERT INTO current_locations (
               vehicle_entity_id, entity_id, latitude, longitude, timestamp, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (vehicle_entity_id) DO UPDATE SET
               latitude   = excluded.latitude,
               longitude  = excluded.longitude,
               timestamp  = excluded.timestamp,
               updated_at = excluded.created_at
             WHERE excluded.timestamp > current_locations.timestamp",
            rusqlite::params![vehicle_str, current_id, latitude, longitude, timestamp, now_str],
          )?;
          current_updated = changed == 1;
        }

        if let Some(history_str) = history_str {
          tx.execute(
            "INSERT INTO location_history (
               entity_id, vehicle_entity_id, latitude, longitude, timestamp, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![history_str, vehicle_str, latitude, longitude, timestamp, now_str],
          )?;
        }

        tx.commit()?;
        Ok(current_updated)
      })
      .await?;

    Ok(AppliedSample { current_updated, history_id })
  }

  async fn current_location(&self, vehicle_id: &str) -> Result<Option<CurrentLocation>> {
    Ok(self.resolve_vehicle(vehicle_id).await?.map(|resolved| resolved.current))
  }

  async fn history(
    &self,
    vehicle_id: &str,
    start: i64,
    end: i64,
  ) -> Result<Vec<HistoryLocation>> {
    let vehicle_id = vehicle_id.to_owned();

    let raws: Vec<RawHistoryLocation> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT
             h.entity_id, h.vehicle_entity_id, h.latitude, h.longitude,
             h.timestamp, h.created_at
           FROM location_history h
           JOIN vehicles v ON v.entity_id = h.vehicle_entity_id
           WHERE v.vehicle_id = ?1
             AND v.deleted_at IS NULL
             AND h.timestamp BETWEEN ?2 AND ?3
           ORDER BY h.timestamp ASC, h.entity_id ASC",
        )?;

        let rows = stmt
          .query_map(rusqlite::params![vehicle_id, start, end], |row| {
            Ok(RawHistoryLocation {
              entity_id:         row.get(0)?,
              vehicle_entity_id: row.get(1)?,
              latitude:          row.get(2)?,
              longitude:         row.get(3)?,
              timestamp:         row.get(4)?,
              created_at:        row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHistoryLocation::into_history).collect()
  }

  async fn points_of_interest(&self) -> Result<Vec<PointOfInterest>> {
    let raws: Vec<RawPointOfInterest> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT id, name, description, latitude, longitude, attributes, created_at
           FROM points_of_interest
           WHERE deleted_at IS NULL
           ORDER BY id",
        )?;

        let rows = stmt
          .query_map([], |row| {
            Ok(RawPointOfInterest {
              id:          row.get(0)?,
              name:        row.get(1)?,
              description: row.get(2)?,
              latitude:    row.get(3)?,
              longitude:   row.get(4)?,
              attributes:  row.get(5)?,
              created_at:  row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPointOfInterest::into_point).collect()
  }
}
