//! Proximity Engine: nearest point-of-interest lookup and geofence event
//! publication.

use std::sync::Arc;

use bytes::Bytes;
use fleet_core::{
  cache::{RadiusQuery, SpatialCache},
  event::{EventLocation, ProximityEvent},
  location::Coordinate,
  publish::EventPublisher,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::{
  context::OpContext,
  error::{ConfigError, ProximityError},
};

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
  /// Search radius around the reported position, in kilometres.
  pub radius_km:   f64,
  /// Maximum matches considered; any match produces one event.
  pub limit:       usize,
  pub exchange:    String,
  pub routing_key: String,
  /// `event` field of published events. Defaults to the routing key.
  pub event_name:  Option<String>,
}

impl Default for ProximityConfig {
  fn default() -> Self {
    Self {
      radius_km:   50.0,
      limit:       1,
      exchange:    "fleet".into(),
      routing_key: "geofence".into(),
      event_name:  None,
    }
  }
}

impl ProximityConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if !self.radius_km.is_finite() || self.radius_km <= 0.0 {
      return Err(ConfigError::invalid(
        "proximity.radius_km",
        "a finite number greater than zero",
        self.radius_km,
      ));
    }
    if self.limit == 0 {
      return Err(ConfigError::invalid("proximity.limit", "at least 1", self.limit));
    }
    if self.exchange.is_empty() {
      return Err(ConfigError::invalid("proximity.exchange", "non-empty", "\"\""));
    }
    if self.routing_key.is_empty() {
      return Err(ConfigError::invalid("proximity.routing_key", "non-empty", "\"\""));
    }
    Ok(())
  }

  pub fn event_name(&self) -> &str { self.event_name.as_deref().unwrap_or(&self.routing_key) }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct ProximityEngine<C, P> {
  cache:     Arc<C>,
  publisher: Arc<P>,
  config:    ProximityConfig,
}

impl<C: SpatialCache, P: EventPublisher> ProximityEngine<C, P> {
  pub fn new(cache: Arc<C>, publisher: Arc<P>, config: ProximityConfig) -> Self {
    Self { cache, publisher, config }
  }

  pub fn config(&self) -> &ProximityConfig { &self.config }

  /// Publish one event if any point of interest lies within the configured
  /// radius of `(latitude, longitude)`. Returns the published event.
  ///
  /// Failures are logged here and also returned.
  pub async fn find_and_notify(
    &self,
    vehicle_id: &str,
    latitude: f64,
    longitude: f64,
    timestamp: i64,
    ctx: &OpContext,
  ) -> Result<Option<ProximityEvent>, ProximityError> {
    let result = self.notify(vehicle_id, latitude, longitude, timestamp, ctx).await;
    if let Err(e) = &result {
      error!(vehicle_id, error = %e, "proximity check failed");
    }
    result
  }

  async fn notify(
    &self,
    vehicle_id: &str,
    latitude: f64,
    longitude: f64,
    timestamp: i64,
    ctx: &OpContext,
  ) -> Result<Option<ProximityEvent>, ProximityError> {
    let query = RadiusQuery {
      center:    Coordinate { latitude, longitude },
      radius_km: self.config.radius_km,
      limit:     self.config.limit,
    };
    let matches = ctx
      .run(self.cache.radius_query(query))
      .await?
      .map_err(|e| ProximityError::Cache(Box::new(e)))?;

    let Some(nearest) = matches.first() else {
      debug!(vehicle_id, latitude, longitude, "no point of interest in range");
      return Ok(None);
    };

    let event = ProximityEvent {
      vehicle_id: vehicle_id.to_owned(),
      event:      self.config.event_name().to_owned(),
      location:   EventLocation { latitude, longitude },
      timestamp,
    };
    let body = Bytes::from(serde_json::to_vec(&event)?);

    ctx
      .run(self.publisher.publish(&self.config.exchange, &self.config.routing_key, body))
      .await?
      .map_err(|e| ProximityError::Publish(Box::new(e)))?;

    info!(
      vehicle_id,
      poi_id = nearest.point.id,
      poi = %nearest.point.name,
      distance_km = nearest.distance_km,
      matches = matches.len(),
      "vehicle near point of interest"
    );
    Ok(Some(event))
  }
}

#[cfg(test)]
mod tests {
  use fleet_bus::Bus;
  use fleet_geo::GeoIndex;

  use super::*;
  use crate::testutil::{poi, FailingCache, FailingPublisher};

  fn bus_with_queue() -> (Arc<Bus>, tokio::sync::mpsc::Receiver<fleet_bus::Delivery>) {
    let bus = Bus::default();
    bus.declare_exchange("fleet").unwrap();
    let rx = bus.bind("fleet", "geofence").unwrap();
    (Arc::new(bus), rx)
  }

  #[test]
  fn config_defaults_and_validation() {
    let config = ProximityConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.event_name(), "geofence");

    let named = ProximityConfig { event_name: Some("reached_poi".into()), ..config.clone() };
    assert_eq!(named.event_name(), "reached_poi");

    for radius_km in [0.0, -1.0, f64::NAN, f64::INFINITY] {
      assert!(ProximityConfig { radius_km, ..config.clone() }.validate().is_err());
    }
    assert!(ProximityConfig { limit: 0, ..config.clone() }.validate().is_err());
    assert!(ProximityConfig { exchange: String::new(), ..config }.validate().is_err());
  }

  #[tokio::test]
  async fn publishes_one_event_for_a_match() {
    let index = Arc::new(GeoIndex::new());
    index.populate([poi(1, "corner", 10.0, 20.0)]);
    let (bus, mut rx) = bus_with_queue();
    let engine = ProximityEngine::new(index, bus, ProximityConfig::default());

    let event = engine
      .find_and_notify("V1", 10.0001, 20.0001, 150, &OpContext::background())
      .await
      .unwrap()
      .unwrap();
    assert_eq!(event.vehicle_id, "V1");
    assert_eq!(event.event, "geofence");

    let delivery = rx.recv().await.unwrap();
    let published: ProximityEvent = serde_json::from_slice(&delivery.body).unwrap();
    assert_eq!(published, event);
    assert_eq!(published.location, EventLocation { latitude: 10.0001, longitude: 20.0001 });
    assert_eq!(published.timestamp, 150);
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn several_matches_still_publish_once() {
    let index = Arc::new(GeoIndex::new());
    index.populate([poi(1, "a", 0.0, 0.01), poi(2, "b", 0.0, 0.02)]);
    let (bus, mut rx) = bus_with_queue();
    let config = ProximityConfig { limit: 5, ..ProximityConfig::default() };
    let engine = ProximityEngine::new(index, bus, config);

    let ctx = OpContext::background();
    assert!(engine.find_and_notify("V1", 0.0, 0.0, 1, &ctx).await.unwrap().is_some());
    assert!(rx.recv().await.is_some());
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn no_match_publishes_nothing() {
    let index = Arc::new(GeoIndex::new());
    index.populate([poi(1, "far away", 45.0, 45.0)]);
    let (bus, mut rx) = bus_with_queue();
    let engine = ProximityEngine::new(index, bus, ProximityConfig::default());

    let out = engine
      .find_and_notify("V1", 0.0, 0.0, 1, &OpContext::background())
      .await
      .unwrap();
    assert!(out.is_none());
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn cache_failure_is_returned() {
    let (bus, _rx) = bus_with_queue();
    let engine = ProximityEngine::new(Arc::new(FailingCache), bus, ProximityConfig::default());

    let err = engine
      .find_and_notify("V1", 0.0, 0.0, 1, &OpContext::background())
      .await
      .unwrap_err();
    assert!(matches!(err, ProximityError::Cache(_)));
  }

  #[tokio::test]
  async fn publish_failure_is_returned() {
    let index = Arc::new(GeoIndex::new());
    index.populate([poi(1, "here", 0.0, 0.0)]);
    let engine = ProximityEngine::new(index, Arc::new(FailingPublisher), ProximityConfig::default());

    let err = engine
      .find_and_notify("V1", 0.0, 0.0, 1, &OpContext::background())
      .await
      .unwrap_err();
    assert!(matches!(err, ProximityError::Publish(_)));
  }
}
