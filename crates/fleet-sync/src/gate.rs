//! Ingestion Gate: parse and validate inbound location reports, hand them
//! to the sync engine, and answer on the reply topic.
//!
//! Topics follow `<namespace>/vehicle/<vehicle_id>/location`. A rejected
//! report gets an error reply and goes no further: no lock is taken and
//! nothing is written.

use std::{sync::Arc, time::Duration};

use fleet_core::{
  cache::SpatialCache,
  location::LocationSample,
  publish::{EventPublisher, InboundMessage, ReplyPublisher},
  store::{LocationStore, LockStore},
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::{
  context::OpContext,
  error::{ConfigError, ValidationError},
  reply::{response_topic, Reply},
  sync::{SyncEngine, SyncOutcome},
};

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
  /// Deadline for processing one message, lock wait included.
  pub context_timeout_ms: u64,
  /// Messages processed concurrently before the gate stops pulling from
  /// the transport.
  pub max_in_flight:      usize,
  /// Transport-side buffer in front of the gate.
  pub queue_capacity:     usize,
}

impl Default for IngestConfig {
  fn default() -> Self {
    Self { context_timeout_ms: 5_000, max_in_flight: 256, queue_capacity: 1_024 }
  }
}

impl IngestConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.context_timeout_ms == 0 {
      return Err(ConfigError::invalid(
        "ingest.context_timeout_ms",
        "greater than zero",
        self.context_timeout_ms,
      ));
    }
    if self.max_in_flight == 0 {
      return Err(ConfigError::invalid("ingest.max_in_flight", "at least 1", self.max_in_flight));
    }
    if self.queue_capacity == 0 {
      return Err(ConfigError::invalid("ingest.queue_capacity", "at least 1", self.queue_capacity));
    }
    Ok(())
  }

  pub fn context_timeout(&self) -> Duration { Duration::from_millis(self.context_timeout_ms) }
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

/// Subscription filter matching every vehicle's location topic.
pub fn location_filter(namespace: &str) -> String { format!("{namespace}/vehicle/+/location") }

/// The vehicle code embedded in a location topic.
pub fn vehicle_id_from_topic<'a>(namespace: &str, topic: &'a str) -> Option<&'a str> {
  let mut parts = topic.split('/');
  match (parts.next(), parts.next(), parts.next(), parts.next(), parts.next()) {
    (Some(ns), Some("vehicle"), Some(id), Some("location"), None) if ns == namespace && !id.is_empty() => {
      Some(id)
    }
    _ => None,
  }
}

/// Wire shape of a report. Every field is optional here so that a missing
/// one is reported by name rather than as a JSON error.
#[derive(Debug, Deserialize)]
struct RawLocationReport {
  #[serde(default)]
  vehicle_id: Option<String>,
  #[serde(default)]
  latitude:   Option<f64>,
  #[serde(default)]
  longitude:  Option<f64>,
  #[serde(default)]
  timestamp:  Option<i64>,
}

/// Turn a raw message into a validated sample.
///
/// An absent or empty `vehicle_id` is taken from the topic; one that
/// disagrees with the topic is rejected.
pub fn parse_report(
  namespace: &str,
  topic: &str,
  payload: &[u8],
) -> Result<LocationSample, ValidationError> {
  let raw: RawLocationReport =
    serde_json::from_slice(payload).map_err(|e| ValidationError::InvalidJson(e.to_string()))?;

  let topic_id = vehicle_id_from_topic(namespace, topic)
    .ok_or_else(|| ValidationError::InvalidTopic(topic.to_owned()))?;

  let vehicle_id = match raw.vehicle_id {
    Some(id) if !id.is_empty() && id != topic_id => {
      return Err(ValidationError::VehicleMismatch { topic: topic_id.to_owned(), payload: id });
    }
    _ => topic_id.to_owned(),
  };

  let latitude = raw.latitude.ok_or(ValidationError::MissingField("latitude"))?;
  let longitude = raw.longitude.ok_or(ValidationError::MissingField("longitude"))?;
  let timestamp = raw.timestamp.ok_or(ValidationError::MissingField("timestamp"))?;

  if !(-90.0..=90.0).contains(&latitude) {
    return Err(ValidationError::LatitudeOutOfRange(latitude));
  }
  if !(-180.0..=180.0).contains(&longitude) {
    return Err(ValidationError::LongitudeOutOfRange(longitude));
  }

  Ok(LocationSample { vehicle_id, latitude, longitude, timestamp })
}

// ─── Gate ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum GateOutcome {
  Rejected(ValidationError),
  Processed(SyncOutcome),
}

pub struct IngestionGate<S, L, C, P, R> {
  engine:    Arc<SyncEngine<S, L, C, P>>,
  replies:   Arc<R>,
  namespace: String,
  config:    IngestConfig,
  permits:   Arc<Semaphore>,
}

impl<S, L, C, P, R> IngestionGate<S, L, C, P, R>
where
  S: LocationStore + 'static,
  L: LockStore + 'static,
  C: SpatialCache + 'static,
  P: EventPublisher + 'static,
  R: ReplyPublisher + 'static,
{
  pub fn new(
    engine: Arc<SyncEngine<S, L, C, P>>,
    replies: Arc<R>,
    namespace: impl Into<String>,
    config: IngestConfig,
  ) -> Self {
    Self {
      engine,
      replies,
      namespace: namespace.into(),
      permits: Arc::new(Semaphore::new(config.max_in_flight)),
      config,
    }
  }

  pub fn namespace(&self) -> &str { &self.namespace }

  /// Process one message to completion.
  pub async fn handle(&self, topic: &str, payload: &[u8], ctx: &OpContext) -> GateOutcome {
    debug!(topic, payload_size = payload.len(), "location report received");

    let sample = match parse_report(&self.namespace, topic, payload) {
      Ok(sample) => sample,
      Err(e) => {
        match &e {
          ValidationError::VehicleMismatch { topic: expected, payload: got } => warn!(
            topic,
            topic_vehicle_id = %expected,
            payload_vehicle_id = %got,
            "vehicle id mismatch between topic and payload"
          ),
          _ => error!(topic, error = %e, "rejected location report"),
        }
        self.send_reply(topic, &Reply::rejected(&e)).await;
        return GateOutcome::Rejected(e);
      }
    };

    let outcome = self.engine.process(&sample, ctx).await;
    if outcome.is_committed() {
      self.send_reply(topic, &Reply::synced(&sample)).await;
    }
    GateOutcome::Processed(outcome)
  }

  /// Consume `inbox` until it closes or `ctx` ends, then wait for every
  /// in-flight message to finish.
  ///
  /// A message is only taken off `inbox` once one of `max_in_flight`
  /// permits is free, so a saturated gate pushes back on the transport.
  pub async fn run<M: InboundMessage>(self: Arc<Self>, mut inbox: mpsc::Receiver<M>, ctx: OpContext) {
    let in_flight = TaskTracker::new();
    info!(
      namespace = %self.namespace,
      max_in_flight = self.config.max_in_flight,
      "ingestion started"
    );

    loop {
      let permit = tokio::select! {
        biased;
        _ = ctx.done() => break,
        permit = Arc::clone(&self.permits).acquire_owned() => match permit {
          Ok(permit) => permit,
          Err(_) => break,
        },
      };
      let message = tokio::select! {
        biased;
        _ = ctx.done() => break,
        message = inbox.recv() => match message {
          Some(message) => message,
          None => break,
        },
      };

      let gate = Arc::clone(&self);
      let op = ctx.with_timeout(self.config.context_timeout());
      in_flight.spawn(async move {
        let _permit = permit;
        gate.handle(message.topic(), message.payload(), &op).await;
      });
    }

    in_flight.close();
    in_flight.wait().await;
    info!(namespace = %self.namespace, "ingestion stopped");
  }

  async fn send_reply(&self, topic: &str, reply: &Reply) {
    let reply_topic = response_topic(topic);
    let payload = match reply.to_bytes() {
      Ok(payload) => payload,
      Err(e) => {
        error!(topic = %reply_topic, error = %e, "failed to encode reply");
        return;
      }
    };
    if let Err(e) = self.replies.reply(&reply_topic, payload).await {
      warn!(topic = %reply_topic, error = %e, "failed to publish reply");
    }
  }
}
