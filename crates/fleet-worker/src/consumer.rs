//! Geofence consumer: the downstream end of the proximity exchange.

use fleet_bus::Delivery;
use fleet_core::event::ProximityEvent;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Log every proximity event until the queue closes. Returns how many
/// well-formed events were seen.
pub async fn consume(mut deliveries: mpsc::Receiver<Delivery>) -> u64 {
  let mut seen = 0;
  while let Some(delivery) = deliveries.recv().await {
    match serde_json::from_slice::<ProximityEvent>(&delivery.body) {
      Ok(event) => {
        seen += 1;
        info!(
          vehicle_id = %event.vehicle_id,
          event = %event.event,
          latitude = event.location.latitude,
          longitude = event.location.longitude,
          timestamp = event.timestamp,
          "geofence event received"
        );
      }
      Err(e) => warn!(
        exchange = %delivery.exchange,
        routing_key = %delivery.routing_key,
        error = %e,
        "discarding malformed geofence event"
      ),
    }
  }
  seen
}

#[cfg(test)]
mod tests {
  use bytes::Bytes;
  use fleet_bus::Bus;
  use fleet_core::event::EventLocation;

  use super::*;

  #[tokio::test]
  async fn counts_well_formed_events() {
    let bus = Bus::default();
    bus.declare_exchange("fleet").unwrap();
    let rx = bus.bind("fleet", "geofence").unwrap();

    let event = ProximityEvent {
      vehicle_id: "B1234ABC".into(),
      event:      "geofence".into(),
      location:   EventLocation { latitude: -6.1753, longitude: 106.8271 },
      timestamp:  1,
    };
    let body = Bytes::from(serde_json::to_vec(&event).unwrap());
    bus.publish_to_exchange("fleet", "geofence", body).await.unwrap();
    bus.publish_to_exchange("fleet", "geofence", Bytes::from_static(b"nope")).await.unwrap();
    bus.close();

    assert_eq!(consume(rx).await, 1);
  }
}
