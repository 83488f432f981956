//! The `{status, message, data}` envelope published on `<topic>/response`.

use bytes::Bytes;
use fleet_core::location::LocationSample;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
  Success,
  Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
  pub status:  ReplyStatus,
  pub message: String,
  pub data:    Value,
}

impl Reply {
  /// Reply for a report rejected by validation. `data` holds the detail.
  pub fn rejected(err: &ValidationError) -> Self {
    Self {
      status:  ReplyStatus::Error,
      message: err.summary().to_owned(),
      data:    Value::String(err.to_string()),
    }
  }

  /// Reply for a report whose sync committed.
  pub fn synced(sample: &LocationSample) -> Self {
    Self {
      status:  ReplyStatus::Success,
      message: "Location updated successfully".to_owned(),
      data:    json!({ "vehicle_id": sample.vehicle_id, "timestamp": sample.timestamp }),
    }
  }

  pub fn to_bytes(&self) -> serde_json::Result<Bytes> { Ok(Bytes::from(serde_json::to_vec(self)?)) }
}

/// Reply topic for a request topic.
pub fn response_topic(topic: &str) -> String { format!("{topic}/response") }
