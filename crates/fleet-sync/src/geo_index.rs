//! Geo-Index Builder: loads the point-of-interest catalog from the store
//! and fully replaces the spatial index with it.

use std::{sync::Arc, time::Duration};

use fleet_core::{
  cache::{RebuildReport, SpatialCache},
  store::LocationStore,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ConfigError, RebuildError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoIndexConfig {
  /// Rebuild period. `None` builds once at startup only.
  pub refresh_interval_secs: Option<u64>,
}

impl GeoIndexConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.refresh_interval_secs == Some(0) {
      return Err(ConfigError::invalid(
        "geo_index.refresh_interval_secs",
        "greater than zero when set",
        0,
      ));
    }
    Ok(())
  }

  pub fn refresh_interval(&self) -> Option<Duration> {
    self.refresh_interval_secs.map(Duration::from_secs)
  }
}

pub struct GeoIndexBuilder<S, C> {
  store: Arc<S>,
  cache: Arc<C>,
}

impl<S, C> Clone for GeoIndexBuilder<S, C> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), cache: Arc::clone(&self.cache) }
  }
}

impl<S: LocationStore, C: SpatialCache> GeoIndexBuilder<S, C> {
  pub fn new(store: Arc<S>, cache: Arc<C>) -> Self { Self { store, cache } }

  /// Replace the whole index with the store's live points of interest.
  ///
  /// A point the index rejects is skipped and logged; the rest are indexed.
  /// If the catalog cannot be read, the previous index stays in place.
  pub async fn rebuild(&self) -> Result<RebuildReport, RebuildError> {
    let points = self
      .store
      .points_of_interest()
      .await
      .map_err(|e| RebuildError::Store(Box::new(e)))?;
    let total = points.len();

    let report = self
      .cache
      .replace(points)
      .await
      .map_err(|e| RebuildError::Cache(Box::new(e)))?;

    for (poi_id, reason) in &report.rejected {
      warn!(poi_id = *poi_id, reason = %reason, "point of interest not indexed");
    }
    info!(total, indexed = report.indexed, rejected = report.rejected.len(), "geo index rebuilt");
    Ok(report)
  }
}
