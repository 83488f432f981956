//! [`LockStore`] over the `locks` table.
//!
//! Acquisition is a single upsert that only overwrites an expired holder,
//! so it is atomic across every connection and process sharing the file.

use std::time::Duration;

use chrono::Utc;
use fleet_core::store::LockStore;
use uuid::Uuid;

use crate::{encode::encode_uuid, Error, SqliteStore};

impl LockStore for SqliteStore {
  type Error = Error;

  async fn try_acquire(&self, key: &str, token: Uuid, ttl: Duration) -> Result<bool, Error> {
    let key       = key.to_owned();
    let token_str = encode_uuid(token);
    let now_ms    = Utc::now().timestamp_millis();
    let ttl_ms    = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    let expires   = now_ms.saturating_add(ttl_ms);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO locks (key, token, expires_at_ms) VALUES (?1, ?2, ?3)
           ON CONFLICT (key) DO UPDATE SET
             token         = excluded.token,
             expires_at_ms = excluded.expires_at_ms
           WHERE locks.expires_at_ms <= ?4",
          rusqlite::params![key, token_str, expires, now_ms],
        )?)
      })
      .await?;

    Ok(changed == 1)
  }

  async fn release(&self, key: &str, token: Uuid) -> Result<bool, Error> {
    let key       = key.to_owned();
    let token_str = encode_uuid(token);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM locks WHERE key = ?1 AND token = ?2",
          rusqlite::params![key, token_str],
        )?)
      })
      .await?;

    Ok(changed == 1)
  }
}
