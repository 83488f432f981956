//! Error type for `fleet-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("vehicle {0:?} is already registered")]
  DuplicateVehicle(String),

  #[error("vehicle {0:?} is not registered")]
  UnknownVehicle(String),

  #[error("attributes must be a JSON object, got {0}")]
  AttributesNotObject(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
