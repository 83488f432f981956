//! Error taxonomy for the ingestion pipeline.

use thiserror::Error;

/// A collaborator's error, lifted into this crate's taxonomy.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why an [`OpContext`](crate::OpContext) stopped admitting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Cancelled {
  #[error("operation cancelled")]
  Cancelled,

  #[error("operation deadline exceeded")]
  DeadlineExceeded,
}

// ─── Validation ──────────────────────────────────────────────────────────────

/// An inbound report rejected before any lock is taken or row written.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
  #[error("{0}")]
  InvalidJson(String),

  #[error("could not extract vehicle_id from topic {0:?}")]
  InvalidTopic(String),

  #[error("vehicle ID mismatch: topic has {topic:?}, payload has {payload:?}")]
  VehicleMismatch { topic: String, payload: String },

  #[error("field {0:?} is required")]
  MissingField(&'static str),

  #[error("latitude {0} must be between -90 and 90")]
  LatitudeOutOfRange(f64),

  #[error("longitude {0} must be between -180 and 180")]
  LongitudeOutOfRange(f64),
}

impl ValidationError {
  /// Short message carried in the reply envelope.
  pub fn summary(&self) -> &'static str {
    match self {
      Self::InvalidJson(_) => "Invalid JSON format",
      Self::InvalidTopic(_) => "Invalid topic format",
      Self::VehicleMismatch { .. } => "Validation error",
      Self::MissingField(_) | Self::LatitudeOutOfRange(_) | Self::LongitudeOutOfRange(_) => {
        "Validation failed"
      }
    }
  }
}

// ─── Sync ────────────────────────────────────────────────────────────────────

/// Why a sync attempt did not commit.
#[derive(Debug, Error)]
pub enum SyncError {
  /// No registered vehicle carries this code. Expected for unregistered
  /// devices; never a fault.
  #[error("vehicle {0:?} is not registered")]
  UnknownEntity(String),

  #[error("lock error: {0}")]
  Lock(#[from] crate::lock::LockError),

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  #[error(transparent)]
  Cancelled(#[from] Cancelled),
}

// ─── Proximity ───────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProximityError {
  #[error("spatial cache error: {0}")]
  Cache(#[source] BoxError),

  #[error("event publish failed: {0}")]
  Publish(#[source] BoxError),

  #[error("event encoding failed: {0}")]
  Encode(#[from] serde_json::Error),

  #[error(transparent)]
  Cancelled(#[from] Cancelled),
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
  #[error("{field} must be {requirement}, got {value}")]
  Invalid {
    field:       &'static str,
    requirement: &'static str,
    value:       String,
  },
}

impl ConfigError {
  pub fn invalid(
    field: &'static str,
    requirement: &'static str,
    value: impl ToString,
  ) -> Self {
    Self::Invalid { field, requirement, value: value.to_string() }
  }
}

// ─── Geo index ───────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RebuildError {
  #[error("failed to load points of interest: {0}")]
  Store(#[source] BoxError),

  #[error("failed to replace spatial index: {0}")]
  Cache(#[source] BoxError),
}
