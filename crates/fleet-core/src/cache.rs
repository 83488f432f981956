//! The `SpatialCache` trait: a derived, rebuildable nearest-neighbour
//! index over points of interest.

use std::future::Future;

use serde::Serialize;

use crate::{location::Coordinate, poi::PointOfInterest};

/// Parameters for [`SpatialCache::radius_query`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusQuery {
  pub center:    Coordinate,
  pub radius_km: f64,
  /// Maximum number of matches returned, nearest first.
  pub limit:     usize,
}

/// A point of interest matched by a radius query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyPoint {
  pub point:       PointOfInterest,
  pub distance_km: f64,
}

/// Result of a full index replacement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebuildReport {
  pub indexed:  usize,
  /// Points that could not be indexed, with the reason. A rejected point
  /// is absent from both the index and the attribute table.
  pub rejected: Vec<(i64, String)>,
}

pub trait SpatialCache: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Discard all index state and replace it with `points`.
  fn replace(
    &self,
    points: Vec<PointOfInterest>,
  ) -> impl Future<Output = Result<RebuildReport, Self::Error>> + Send + '_;

  /// Points within `query.radius_km` of `query.center`, nearest first.
  fn radius_query(
    &self,
    query: RadiusQuery,
  ) -> impl Future<Output = Result<Vec<NearbyPoint>, Self::Error>> + Send + '_;
}
