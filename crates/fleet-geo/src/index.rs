//! [`GeoIndex`]: cell-bucketed point index with an attribute side-table.

use std::{
  collections::HashMap,
  sync::{Arc, PoisonError, RwLock},
};

use fleet_core::{
  cache::{NearbyPoint, RadiusQuery, RebuildReport, SpatialCache},
  location::Coordinate,
  poi::PointOfInterest,
};
use tracing::debug;

use crate::{cell::Cell, distance::haversine_km, Error, Result};

/// Position entry stored in a cell bucket.
#[derive(Debug, Clone, Copy)]
struct Entry {
  id:        i64,
  latitude:  f64,
  longitude: f64,
}

/// One immutable generation of the index.
#[derive(Debug, Default)]
struct Snapshot {
  cells:  HashMap<Cell, Vec<Entry>>,
  points: HashMap<i64, PointOfInterest>,
}

impl Snapshot {
  /// Index a single point into both structures, or neither.
  fn insert(&mut self, point: PointOfInterest) -> Result<()> {
    if Coordinate::new(point.latitude, point.longitude).is_err() {
      return Err(Error::InvalidCoordinate {
        latitude:  point.latitude,
        longitude: point.longitude,
      });
    }
    if self.points.contains_key(&point.id) {
      return Err(Error::DuplicatePoint(point.id));
    }

    let entry = Entry {
      id:        point.id,
      latitude:  point.latitude,
      longitude: point.longitude,
    };
    self
      .cells
      .entry(Cell::containing(entry.latitude, entry.longitude))
      .or_default()
      .push(entry);
    self.points.insert(point.id, point);
    Ok(())
  }
}

// ─── GeoIndex ────────────────────────────────────────────────────────────────

/// Nearest-neighbour index over points of interest.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
#[derive(Debug, Default)]
pub struct GeoIndex {
  snapshot: RwLock<Arc<Snapshot>>,
}

impl GeoIndex {
  pub fn new() -> Self { Self::default() }

  /// Number of indexed points.
  pub fn len(&self) -> usize { self.current().points.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Full record of an indexed point.
  pub fn get(&self, id: i64) -> Option<PointOfInterest> {
    self.current().points.get(&id).cloned()
  }

  /// Discard the current contents and index `points` instead.
  ///
  /// Invalid points are skipped and listed in the report; the rest are
  /// published together in one swap.
  pub fn populate(&self, points: impl IntoIterator<Item = PointOfInterest>) -> RebuildReport {
    let mut next = Snapshot::default();
    let mut report = RebuildReport::default();

    for point in points {
      let id = point.id;
      match next.insert(point) {
        Ok(()) => report.indexed += 1,
        Err(e) => report.rejected.push((id, e.to_string())),
      }
    }

    debug!(
      indexed = report.indexed,
      rejected = report.rejected.len(),
      cells = next.cells.len(),
      "geo index populated"
    );

    *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    report
  }

  /// Points within `query.radius_km` of `query.center`, nearest first, at
  /// most `query.limit` of them.
  pub fn nearest(&self, query: &RadiusQuery) -> Result<Vec<NearbyPoint>> {
    let RadiusQuery { center, radius_km, limit } = *query;
    if Coordinate::new(center.latitude, center.longitude).is_err() {
      return Err(Error::InvalidCoordinate {
        latitude:  center.latitude,
        longitude: center.longitude,
      });
    }
    if !radius_km.is_finite() || radius_km < 0.0 {
      return Err(Error::InvalidRadius(radius_km));
    }
    if limit == 0 {
      return Ok(Vec::new());
    }

    let snapshot = self.current();
    let mut hits: Vec<(i64, f64)> = Vec::new();
    for cell in Cell::covering(center.latitude, center.longitude, radius_km) {
      let Some(bucket) = snapshot.cells.get(&cell) else {
        continue;
      };
      for entry in bucket {
        let distance = haversine_km(
          center.latitude,
          center.longitude,
          entry.latitude,
          entry.longitude,
        );
        if distance <= radius_km {
          hits.push((entry.id, distance));
        }
      }
    }

    hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    hits.truncate(limit);

    Ok(
      hits
        .into_iter()
        .filter_map(|(id, distance_km)| {
          snapshot
            .points
            .get(&id)
            .map(|point| NearbyPoint { point: point.clone(), distance_km })
        })
        .collect(),
    )
  }

  fn current(&self) -> Arc<Snapshot> {
    Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
  }
}

impl SpatialCache for GeoIndex {
  type Error = Error;

  async fn replace(&self, points: Vec<PointOfInterest>) -> Result<RebuildReport> {
    Ok(self.populate(points))
  }

  async fn radius_query(&self, query: RadiusQuery) -> Result<Vec<NearbyPoint>> {
    self.nearest(&query)
  }
}
