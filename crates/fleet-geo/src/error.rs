//! Error type for `fleet-geo`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid coordinate ({latitude}, {longitude})")]
  InvalidCoordinate { latitude: f64, longitude: f64 },

  #[error("invalid search radius: {0} km")]
  InvalidRadius(f64),

  #[error("duplicate point id {0}")]
  DuplicatePoint(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
