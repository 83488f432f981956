//! Synthetic location traffic for demos and local testing.
//!
//! Every tick one registered vehicle reports a position: half the time
//! within 50 m of a random point of interest, otherwise somewhere on the
//! straight line between two of them.

use std::time::Duration;

use bytes::Bytes;
use fleet_bus::Bus;
use fleet_core::poi::PointOfInterest;
use rand::seq::IndexedRandom;
use serde_json::json;
use tracing::{debug, info};

/// Metres per degree of latitude.
const METRES_PER_DEGREE: f64 = 111_320.0;

/// Upper bound for reports placed near a point.
pub const NEAR_RADIUS_M: f64 = 50.0;

pub struct Simulator {
  namespace: String,
  vehicles:  Vec<String>,
  points:    Vec<PointOfInterest>,
  interval:  Duration,
}

impl Simulator {
  pub fn new(
    namespace: impl Into<String>,
    vehicles: Vec<String>,
    points: Vec<PointOfInterest>,
    interval: Duration,
  ) -> Self {
    Self { namespace: namespace.into(), vehicles, points, interval }
  }

  /// One report as `(topic, payload)`, or `None` with nothing to simulate.
  pub fn report(&self) -> Option<(String, Bytes)> {
    let mut rng = rand::rng();
    let vehicle_id = self.vehicles.choose(&mut rng)?;
    let a = self.points.choose(&mut rng)?;

    let (latitude, longitude) = if rand::random_bool(0.5) {
      near(a)
    } else {
      between(a, self.points.choose(&mut rng)?)
    };

    let payload = json!({
      "vehicle_id": vehicle_id,
      "latitude":   latitude,
      "longitude":  longitude,
      "timestamp":  chrono::Utc::now().timestamp(),
    });
    let topic = format!("{}/vehicle/{vehicle_id}/location", self.namespace);
    Some((topic, Bytes::from(payload.to_string())))
  }

  /// Publish a report every interval until the bus closes.
  pub async fn run(self, bus: Bus) -> Result<(), fleet_bus::Error> {
    info!(
      vehicles = self.vehicles.len(),
      points = self.points.len(),
      interval_ms = self.interval.as_millis() as u64,
      "simulator started"
    );
    let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
    loop {
      ticker.tick().await;
      let Some((topic, payload)) = self.report() else {
        return Ok(());
      };
      let receivers = bus.publish(&topic, payload).await?;
      debug!(topic, receivers, "simulated report published");
    }
  }
}

/// A random position within [`NEAR_RADIUS_M`] of `point`. Latitude is
/// clamped at the poles and longitude wraps across the antimeridian.
fn near(point: &PointOfInterest) -> (f64, f64) {
  let distance = rand::random_range(0.0..NEAR_RADIUS_M);
  let angle = rand::random_range(0.0..std::f64::consts::TAU);
  // Floor keeps the longitude step finite at the poles.
  let lon_scale = point.latitude.to_radians().cos().max(1e-6);
  let d_lat = distance * angle.cos() / METRES_PER_DEGREE;
  let d_lon = distance * angle.sin() / (METRES_PER_DEGREE * lon_scale);
  let latitude = (point.latitude + d_lat).clamp(-90.0, 90.0);
  (latitude, wrap_longitude(point.longitude + d_lon))
}

/// Fold `longitude` into `[-180, 180]`.
fn wrap_longitude(longitude: f64) -> f64 {
  if (-180.0..=180.0).contains(&longitude) {
    return longitude;
  }
  (longitude + 180.0).rem_euclid(360.0) - 180.0
}

fn between(a: &PointOfInterest, b: &PointOfInterest) -> (f64, f64) {
  let t = rand::random_range(0.0..=1.0);
  (
    a.latitude + (b.latitude - a.latitude) * t,
    a.longitude + (b.longitude - a.longitude) * t,
  )
}
