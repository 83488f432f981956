//! The location ingestion pipeline.
//!
//! Data flows through the modules in this order:
//!
//! 1. [`gate`] parses and validates an inbound transport message.
//! 2. [`lock`] serializes work per vehicle across every cooperating process.
//! 3. [`sync`] resolves the vehicle, arbitrates staleness and dual-writes
//!    the current row and the history log in one transaction.
//! 4. [`proximity`] looks up the nearest point of interest and publishes a
//!    geofence event, outside the transaction.
//!
//! [`geo_index`] feeds the spatial index the proximity step reads, and
//! [`tasks`] supervises the fire-and-forget work around all of this.
//! Every suspension point runs under an [`OpContext`].

#![allow(async_fn_in_trait)]

pub mod context;
pub mod error;
pub mod gate;
pub mod geo_index;
pub mod lock;
pub mod proximity;
pub mod reply;
pub mod sync;
pub mod tasks;

pub use context::OpContext;
pub use error::{Cancelled, ConfigError, ProximityError, RebuildError, SyncError, ValidationError};
pub use gate::{GateOutcome, IngestConfig, IngestionGate};
pub use geo_index::{GeoIndexBuilder, GeoIndexConfig};
pub use lock::{EntityLock, LockConfig, LockError, LockHandle};
pub use proximity::{ProximityConfig, ProximityEngine};
pub use reply::{Reply, ReplyStatus};
pub use sync::{HistoryPolicy, SyncConfig, SyncEngine, SyncOutcome};
pub use tasks::BackgroundTasks;

#[cfg(test)]
mod testutil;
