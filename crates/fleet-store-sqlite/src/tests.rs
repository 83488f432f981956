//! Integration tests for `SqliteStore` against an in-memory database.

use std::time::Duration;

use fleet_core::{
  location::{LocationSample, SyncPlan},
  poi::NewPointOfInterest,
  store::{LocationStore, LockStore},
  vehicle::{InitialLocation, NewVehicle},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn sample(vehicle_id: &str, timestamp: i64, latitude: f64, longitude: f64) -> LocationSample {
  LocationSample {
    vehicle_id: vehicle_id.into(),
    latitude,
    longitude,
    timestamp,
  }
}

const BOTH: SyncPlan = SyncPlan { update_current: true, append_history: true };
const HISTORY_ONLY: SyncPlan = SyncPlan { update_current: false, append_history: true };

// ─── Vehicles ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_resolve_vehicle() {
  let s = store().await;

  let vehicle = s
    .add_vehicle(NewVehicle::new("V1").located(1.5, 2.5, 100))
    .await
    .unwrap();

  let resolved = s.resolve_vehicle("V1").await.unwrap().unwrap();
  assert_eq!(resolved.entity_id, vehicle.entity_id);
  assert_eq!(resolved.vehicle_id, "V1");
  assert_eq!(resolved.current_timestamp(), 100);
  assert_eq!(resolved.current.vehicle_entity_id, vehicle.entity_id);
  assert_eq!((resolved.current.latitude, resolved.current.longitude), (1.5, 2.5));
  assert!(resolved.current.updated_at.is_none());

  let fetched = s.vehicle("V1").await.unwrap().unwrap();
  assert_eq!(fetched, vehicle);
  // Provisioning writes no history.
  assert!(s.history("V1", i64::MIN, i64::MAX).await.unwrap().is_empty());
}

#[tokio::test]
async fn vehicle_without_current_row_does_not_resolve() {
  let s = store().await;
  s.add_vehicle(NewVehicle::new("V1")).await.unwrap();

  assert!(s.vehicle("V1").await.unwrap().is_some());
  assert!(s.resolve_vehicle("V1").await.unwrap().is_none());
  assert!(s.current_location("V1").await.unwrap().is_none());
}

#[tokio::test]
async fn placing_a_vehicle_makes_it_resolvable() {
  let s = store().await;
  s.add_vehicle(NewVehicle::new("V1")).await.unwrap();

  let placed = s
    .place_vehicle("V1", InitialLocation { latitude: 3.0, longitude: 4.0, timestamp: 70 })
    .await
    .unwrap();
  assert_eq!((placed.timestamp, placed.latitude, placed.longitude), (70, 3.0, 4.0));

  let resolved = s.resolve_vehicle("V1").await.unwrap().unwrap();
  assert_eq!(resolved.current, placed);
  assert!(s.history("V1", i64::MIN, i64::MAX).await.unwrap().is_empty());

  let err = s
    .place_vehicle("ghost", InitialLocation { latitude: 0.0, longitude: 0.0, timestamp: 1 })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::UnknownVehicle(id) if id == "ghost"));
}

#[tokio::test]
async fn resolve_unknown_vehicle_returns_none() {
  let s = store().await;
  assert!(s.resolve_vehicle("nope").await.unwrap().is_none());
  assert!(s.current_location("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_vehicle_is_rejected() {
  let s = store().await;
  s.add_vehicle(NewVehicle::new("V1")).await.unwrap();

  let err = s.add_vehicle(NewVehicle::new("V1")).await.unwrap_err();
  assert!(matches!(err, Error::DuplicateVehicle(id) if id == "V1"));
}

#[tokio::test]
async fn vehicles_are_listed_in_code_order() {
  let s = store().await;
  for id in ["D9012GHI", "B1234ABC", "B5678DEF"] {
    s.add_vehicle(NewVehicle::new(id)).await.unwrap();
  }

  let codes: Vec<String> = s
    .vehicles()
    .await
    .unwrap()
    .into_iter()
    .map(|v| v.vehicle_id)
    .collect();
  assert_eq!(codes, ["B1234ABC", "B5678DEF", "D9012GHI"]);
}

// ─── apply_sample ────────────────────────────────────────────────────────────

#[tokio::test]
async fn newer_sample_overwrites_current_row() {
  let s = store().await;
  let v = s
    .add_vehicle(NewVehicle::new("V1").located(1.0, 1.0, 100))
    .await
    .unwrap();

  let before = s.current_location("V1").await.unwrap().unwrap();

  let applied = s
    .apply_sample(v.entity_id, &sample("V1", 150, 10.0, 20.0), BOTH)
    .await
    .unwrap();
  assert!(applied.current_updated);
  assert!(applied.history_id.is_some());

  let after = s.current_location("V1").await.unwrap().unwrap();
  assert_eq!((after.timestamp, after.latitude, after.longitude), (150, 10.0, 20.0));
  // Same row, updated in place.
  assert_eq!(after.entity_id, before.entity_id);
  assert_eq!(after.created_at, before.created_at);
  assert!(after.updated_at.is_some());
}

#[tokio::test]
async fn store_refuses_stale_upsert_even_when_planned() {
  let s = store().await;
  let v = s
    .add_vehicle(NewVehicle::new("V1").located(10.0, 20.0, 150))
    .await
    .unwrap();

  for ts in [150, 90] {
    let applied = s
      .apply_sample(v.entity_id, &sample("V1", ts, 1.0, 2.0), BOTH)
      .await
      .unwrap();
    assert!(!applied.current_updated, "timestamp {ts} must not win");
    assert!(applied.history_id.is_some());
  }

  let current = s.current_location("V1").await.unwrap().unwrap();
  assert_eq!((current.timestamp, current.latitude, current.longitude), (150, 10.0, 20.0));
  assert_eq!(s.history("V1", i64::MIN, i64::MAX).await.unwrap().len(), 2);
}

#[tokio::test]
async fn history_only_plan_leaves_current_alone() {
  let s = store().await;
  let v = s
    .add_vehicle(NewVehicle::new("V1").located(0.0, 0.0, 50))
    .await
    .unwrap();

  let applied = s
    .apply_sample(v.entity_id, &sample("V1", 10, 3.0, 4.0), HISTORY_ONLY)
    .await
    .unwrap();
  assert!(!applied.current_updated);
  let current = s.current_location("V1").await.unwrap().unwrap();
  assert_eq!((current.timestamp, current.latitude), (50, 0.0));
  assert_eq!(s.history("V1", 0, 100).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_history_insert_rolls_back_current_upsert() {
  let s = store().await;
  let v = s
    .add_vehicle(NewVehicle::new("V1").located(1.0, 1.0, 100))
    .await
    .unwrap();

  s.conn
    .call(|conn| {
      conn.execute_batch("DROP TABLE location_history;")?;
      Ok(())
    })
    .await
    .unwrap();

  let result = s
    .apply_sample(v.entity_id, &sample("V1", 200, 9.0, 9.0), BOTH)
    .await;
  assert!(matches!(result, Err(Error::Database(_))));

  let current = s.current_location("V1").await.unwrap().unwrap();
  assert_eq!(current.timestamp, 100, "upsert must be rolled back");
}

// ─── History ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn history_range_is_inclusive_and_ordered() {
  let s = store().await;
  let v = s
    .add_vehicle(NewVehicle::new("V1").located(0.0, 0.0, 0))
    .await
    .unwrap();
  let other = s
    .add_vehicle(NewVehicle::new("V2").located(0.0, 0.0, 0))
    .await
    .unwrap();

  for ts in [300, 100, 200, 400] {
    s.apply_sample(v.entity_id, &sample("V1", ts, 0.0, 0.0), BOTH).await.unwrap();
  }
  s.apply_sample(other.entity_id, &sample("V2", 250, 0.0, 0.0), BOTH)
    .await
    .unwrap();

  let rows = s.history("V1", 100, 300).await.unwrap();
  let stamps: Vec<i64> = rows.iter().map(|r| r.timestamp).collect();
  assert_eq!(stamps, vec![100, 200, 300]);
  assert!(rows.iter().all(|r| r.vehicle_entity_id == v.entity_id));
}

#[tokio::test]
async fn history_for_unknown_vehicle_is_empty() {
  let s = store().await;
  assert!(s.history("ghost", 0, i64::MAX).await.unwrap().is_empty());
}

// ─── Points of interest ──────────────────────────────────────────────────────

#[tokio::test]
async fn points_of_interest_roundtrip_and_soft_delete() {
  let s = store().await;

  let mut monas = NewPointOfInterest::new("Monas", -6.1753924, 106.8271528);
  monas.description = Some("National Monument".into());
  monas
    .attributes
    .insert("category".into(), serde_json::json!("landmark"));
  let monas = s.add_point_of_interest(monas).await.unwrap();
  let mosque = s
    .add_point_of_interest(NewPointOfInterest::new("Istiqlal", -6.169856, 106.830759))
    .await
    .unwrap();

  let all = s.points_of_interest().await.unwrap();
  assert_eq!(all.len(), 2);
  assert_eq!(all[0].id, monas.id);
  assert_eq!(all[0].attributes["category"], "landmark");
  assert_eq!(all[0].description.as_deref(), Some("National Monument"));

  assert!(s.delete_point_of_interest(mosque.id).await.unwrap());
  assert!(!s.delete_point_of_interest(mosque.id).await.unwrap());

  let live = s.points_of_interest().await.unwrap();
  assert_eq!(live.len(), 1);
  assert_eq!(live[0].name, "Monas");
}

// ─── Locks ───────────────────────────────────────────────────────────────────

const TTL: Duration = Duration::from_secs(30);

#[tokio::test]
async fn lock_is_exclusive_until_released() {
  let s = store().await;
  let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

  assert!(s.try_acquire("location-sync:V1", a, TTL).await.unwrap());
  assert!(!s.try_acquire("location-sync:V1", b, TTL).await.unwrap());
  // Different keys never contend.
  assert!(s.try_acquire("location-sync:V2", b, TTL).await.unwrap());

  assert!(s.release("location-sync:V1", a).await.unwrap());
  assert!(s.try_acquire("location-sync:V1", b, TTL).await.unwrap());
}

#[tokio::test]
async fn release_with_foreign_token_is_refused() {
  let s = store().await;
  let (owner, intruder) = (Uuid::new_v4(), Uuid::new_v4());

  assert!(s.try_acquire("k", owner, TTL).await.unwrap());
  assert!(!s.release("k", intruder).await.unwrap());
  assert!(!s.try_acquire("k", intruder, TTL).await.unwrap());
}

#[tokio::test]
async fn expired_lock_can_be_taken_over() {
  let s = store().await;
  let (stale, fresh) = (Uuid::new_v4(), Uuid::new_v4());

  assert!(s.try_acquire("k", stale, Duration::from_millis(1)).await.unwrap());
  tokio::time::sleep(Duration::from_millis(20)).await;

  assert!(s.try_acquire("k", fresh, TTL).await.unwrap());
  // The stale holder no longer owns the key.
  assert!(!s.release("k", stale).await.unwrap());
  assert!(s.release("k", fresh).await.unwrap());
}

#[tokio::test]
async fn lock_is_shared_between_handles_on_one_file() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("fleet.db");
  let first = SqliteStore::open(&path).await.unwrap();
  let second = SqliteStore::open(&path).await.unwrap();

  let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
  assert!(first.try_acquire("location-sync:V1", a, TTL).await.unwrap());
  assert!(!second.try_acquire("location-sync:V1", b, TTL).await.unwrap());

  assert!(first.release("location-sync:V1", a).await.unwrap());
  assert!(second.try_acquire("location-sync:V1", b, TTL).await.unwrap());
}
