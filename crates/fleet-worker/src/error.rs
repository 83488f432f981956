//! Error type for `fleet-worker`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid configuration: {0}")]
  Config(#[from] fleet_sync::ConfigError),

  #[error("store error: {0}")]
  Store(#[from] fleet_store_sqlite::Error),

  #[error("bus error: {0}")]
  Bus(#[from] fleet_bus::Error),

  #[error("seed file error: {0}")]
  Seed(#[from] serde_json::Error),

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
