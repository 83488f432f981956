//! [`WorkerConfig`]: everything the binary reads from `fleet.toml` and the
//! `FLEET_*` environment
//! (nested keys joined with `__`, e.g. `FLEET_PROXIMITY__RADIUS_KM`).

use std::path::PathBuf;

use fleet_sync::{
  ConfigError, GeoIndexConfig, IngestConfig, LockConfig, ProximityConfig, SyncConfig,
};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  pub store_path: PathBuf,
  /// First topic level of every vehicle topic.
  pub namespace:  String,
  pub ingest:     IngestConfig,
  pub lock:       LockConfig,
  pub sync:       SyncConfig,
  pub proximity:  ProximityConfig,
  pub geo_index:  GeoIndexConfig,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      store_path: PathBuf::from("fleet.db"),
      namespace:  "fleet".into(),
      ingest:     IngestConfig::default(),
      lock:       LockConfig::default(),
      sync:       SyncConfig::default(),
      proximity:  ProximityConfig::default(),
      geo_index:  GeoIndexConfig::default(),
    }
  }
}

impl WorkerConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.namespace.is_empty() || self.namespace.contains(['/', '+', '#']) {
      return Err(ConfigError::invalid(
        "namespace",
        "a single topic level without '/', '+' or '#'",
        format!("{:?}", self.namespace),
      ));
    }
    self.ingest.validate()?;
    self.lock.validate()?;
    self.proximity.validate()?;
    self.geo_index.validate()?;
    Ok(())
  }
}
