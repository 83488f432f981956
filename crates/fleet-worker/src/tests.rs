//! End-to-end tests: a worker on an in-memory store, driven over its bus.

use std::time::Duration;

use bytes::Bytes;
use fleet_core::{
  event::ProximityEvent, poi::NewPointOfInterest, store::LocationStore as _, vehicle::NewVehicle,
};
use fleet_store_sqlite::SqliteStore;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::{Error, Worker, WorkerConfig};

const WAIT: Duration = Duration::from_secs(5);

async fn worker() -> Worker {
  let store = SqliteStore::open_in_memory().await.unwrap();
  store.add_vehicle(NewVehicle::new("V1").located(0.0, 0.0, 1)).await.unwrap();
  // Registered but never placed.
  store.add_vehicle(NewVehicle::new("V2")).await.unwrap();
  store
    .add_point_of_interest(NewPointOfInterest::new("Depot", 10.0, 20.0))
    .await
    .unwrap();
  Worker::new(store, WorkerConfig::default()).unwrap()
}

async fn next<T>(rx: &mut mpsc::Receiver<T>) -> T {
  tokio::time::timeout(WAIT, rx.recv())
    .await
    .expect("timed out waiting for message")
    .expect("channel closed")
}

fn report(vehicle_id: &str, latitude: f64, longitude: f64, timestamp: i64) -> Bytes {
  let body = json!({
    "vehicle_id": vehicle_id,
    "latitude": latitude,
    "longitude": longitude,
    "timestamp": timestamp,
  });
  Bytes::from(body.to_string())
}

#[tokio::test]
async fn report_is_synced_replied_and_announced() {
  let worker = worker().await;
  assert_eq!(worker.rebuild_index().await.unwrap().indexed, 1);

  let bus = worker.bus().clone();
  let mut events = bus.bind("fleet", "geofence").unwrap();
  let mut replies = bus.subscribe("fleet/vehicle/+/location/response").unwrap();
  let running = worker.start().unwrap();

  let drive = async {
    bus
      .publish("fleet/vehicle/V1/location", report("V1", 10.0001, 20.0001, 150))
      .await
      .unwrap();

    let reply = next(&mut replies).await;
    assert_eq!(reply.topic, "fleet/vehicle/V1/location/response");
    let reply: Value = serde_json::from_slice(&reply.payload).unwrap();
    assert_eq!(reply["status"], "success");
    assert_eq!(reply["data"], json!({ "vehicle_id": "V1", "timestamp": 150 }));

    let event: ProximityEvent = serde_json::from_slice(&next(&mut events).await.body).unwrap();
    assert_eq!(event.vehicle_id, "V1");
    assert_eq!(event.event, "geofence");
    assert_eq!(event.timestamp, 150);

    bus
      .publish("fleet/vehicle/V1/location", Bytes::from_static(b"{\"latitude\": 95}"))
      .await
      .unwrap();
    let reply: Value = serde_json::from_slice(&next(&mut replies).await.payload).unwrap();
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["message"], "Validation failed");

    worker.stop_ingestion();
  };

  tokio::time::timeout(WAIT, async { tokio::join!(running.run(), drive) })
    .await
    .expect("worker did not stop");

  let current = worker.store().current_location("V1").await.unwrap().unwrap();
  assert_eq!((current.timestamp, current.latitude), (150, 10.0001));
  assert_eq!(worker.store().history("V1", 0, i64::MAX).await.unwrap().len(), 1);
}

#[tokio::test]
async fn stale_report_is_recorded_but_not_current() {
  let worker = worker().await;
  let bus = worker.bus().clone();
  let mut replies = bus.subscribe("fleet/vehicle/V1/location/response").unwrap();
  let running = worker.start().unwrap();

  let drive = async {
    bus
      .publish("fleet/vehicle/V1/location", report("V1", 1.0, 1.0, 200))
      .await
      .unwrap();
    next(&mut replies).await;
    bus
      .publish("fleet/vehicle/V1/location", report("V1", 2.0, 2.0, 100))
      .await
      .unwrap();
    next(&mut replies).await;
    worker.stop_ingestion();
  };
  tokio::time::timeout(WAIT, async { tokio::join!(running.run(), drive) })
    .await
    .expect("worker did not stop");

  let current = worker.store().current_location("V1").await.unwrap().unwrap();
  assert_eq!((current.timestamp, current.latitude), (200, 1.0));
  let stamps: Vec<i64> = worker
    .store()
    .history("V1", 0, i64::MAX)
    .await
    .unwrap()
    .iter()
    .map(|h| h.timestamp)
    .collect();
  assert_eq!(stamps, vec![100, 200]);
}

#[tokio::test]
async fn unknown_vehicle_gets_no_reply() {
  let worker = worker().await;
  let bus = worker.bus().clone();
  let mut replies = bus.subscribe("fleet/vehicle/+/location/response").unwrap();
  let running = worker.start().unwrap();

  let drive = async {
    bus
      .publish("fleet/vehicle/GHOST/location", report("GHOST", 1.0, 1.0, 10))
      .await
      .unwrap();
    bus
      .publish("fleet/vehicle/V2/location", report("V2", 1.0, 1.0, 10))
      .await
      .unwrap();
    bus
      .publish("fleet/vehicle/V1/location", report("V1", 1.0, 1.0, 10))
      .await
      .unwrap();
    assert_eq!(next(&mut replies).await.topic, "fleet/vehicle/V1/location/response");
    worker.stop_ingestion();
  };
  tokio::time::timeout(WAIT, async { tokio::join!(running.run(), drive) })
    .await
    .expect("worker did not stop");

  assert!(replies.try_recv().is_err());
  assert!(worker.store().current_location("GHOST").await.unwrap().is_none());
  assert!(worker.store().current_location("V2").await.unwrap().is_none());
  assert!(worker.store().history("V2", i64::MIN, i64::MAX).await.unwrap().is_empty());
}

#[tokio::test]
async fn shutdown_token_stops_the_worker() {
  let worker = worker().await;
  let shutdown = worker.shutdown_token();

  let stop = async {
    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.cancel();
  };
  let (result, ()) = tokio::time::timeout(WAIT, async { tokio::join!(worker.run(), stop) })
    .await
    .expect("worker did not stop");
  result.unwrap();
  assert!(worker.tasks().is_empty());
}

#[tokio::test]
async fn invalid_config_is_rejected() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let config = WorkerConfig { namespace: "fleet/eu".into(), ..WorkerConfig::default() };
  assert!(matches!(Worker::new(store, config), Err(Error::Config(_))));
}
