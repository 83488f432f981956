//! Wiring for the `fleet-worker` binary.
//!
//! A [`Worker`] owns one SQLite store, one in-process bus and one spatial
//! index, and runs the ingestion pipeline between them:
//!
//! - the geo index is built from the store at startup and, optionally,
//!   rebuilt on a timer;
//! - a geofence consumer logs every proximity event;
//! - the ingestion gate consumes `<namespace>/vehicle/+/location` until the
//!   subscription ends or shutdown is requested.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feed;
pub mod seed;
pub mod simulate;

use std::{convert::Infallible, sync::Arc};

use fleet_bus::{Bus, Message};
use fleet_core::cache::RebuildReport;
use fleet_geo::GeoIndex;
use fleet_store_sqlite::SqliteStore;
use fleet_sync::{
  gate::location_filter, BackgroundTasks, EntityLock, GeoIndexBuilder, IngestionGate, OpContext,
  ProximityEngine, RebuildError, SyncEngine,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use config::WorkerConfig;
pub use error::{Error, Result};

pub type Engine = SyncEngine<SqliteStore, SqliteStore, GeoIndex, Bus>;
pub type Gate = IngestionGate<SqliteStore, SqliteStore, GeoIndex, Bus, Bus>;

pub struct Worker {
  store:    Arc<SqliteStore>,
  index:    Arc<GeoIndex>,
  bus:      Bus,
  gate:     Arc<Gate>,
  builder:  GeoIndexBuilder<SqliteStore, GeoIndex>,
  tasks:    BackgroundTasks,
  shutdown: CancellationToken,
  config:   WorkerConfig,
}

impl Worker {
  /// Wire a worker around an already-open store.
  pub fn new(store: SqliteStore, config: WorkerConfig) -> Result<Self> {
    config.validate()?;

    let store = Arc::new(store);
    let index = Arc::new(GeoIndex::new());
    let bus = Bus::new(config.ingest.queue_capacity);
    bus.declare_exchange(&config.proximity.exchange)?;
    let publisher = Arc::new(bus.clone());

    let engine = SyncEngine::new(
      Arc::clone(&store),
      EntityLock::new(Arc::clone(&store), config.lock),
      ProximityEngine::new(Arc::clone(&index), Arc::clone(&publisher), config.proximity.clone()),
      config.sync,
    );
    let gate = IngestionGate::new(Arc::new(engine), publisher, config.namespace.clone(), config.ingest);
    let builder = GeoIndexBuilder::new(Arc::clone(&store), Arc::clone(&index));

    let shutdown = CancellationToken::new();
    Ok(Self {
      store,
      index,
      bus,
      gate: Arc::new(gate),
      builder,
      tasks: BackgroundTasks::new(shutdown.child_token()),
      shutdown,
      config,
    })
  }

  /// Open the store named in `config` and wire a worker around it.
  pub async fn open(config: WorkerConfig) -> Result<Self> {
    let store = SqliteStore::open(&config.store_path).await?;
    Self::new(store, config)
  }

  pub fn store(&self) -> &Arc<SqliteStore> { &self.store }

  pub fn index(&self) -> &Arc<GeoIndex> { &self.index }

  pub fn bus(&self) -> &Bus { &self.bus }

  pub fn tasks(&self) -> &BackgroundTasks { &self.tasks }

  pub fn config(&self) -> &WorkerConfig { &self.config }

  /// Cancelling this token stops [`run`](Self::run).
  pub fn shutdown_token(&self) -> CancellationToken { self.shutdown.clone() }

  /// Rebuild the spatial index from the store right now.
  pub async fn rebuild_index(&self) -> Result<RebuildReport, RebuildError> {
    self.builder.rebuild().await
  }

  /// Stop consuming location reports once the queued ones are handled.
  pub fn stop_ingestion(&self) { self.bus.unsubscribe(&location_filter(&self.config.namespace)); }

  /// Subscribe to location reports and start the background tasks.
  ///
  /// Reports published after this returns are queued for the gate, even
  /// before [`Running::run`] is awaited.
  pub fn start(&self) -> Result<Running<'_>> {
    let inbox = self.bus.subscribe(&location_filter(&self.config.namespace))?;
    let events = self
      .bus
      .bind(&self.config.proximity.exchange, &self.config.proximity.routing_key)?;

    let builder = self.builder.clone();
    self.tasks.spawn("geo-index-seed", async move { builder.rebuild().await.map(drop) });

    if let Some(period) = self.config.geo_index.refresh_interval() {
      let builder = self.builder.clone();
      self.tasks.spawn_periodic("geo-index-refresh", period, move || {
        let builder = builder.clone();
        async move { builder.rebuild().await.map(drop) }
      });
    }

    self.tasks.spawn("geofence-consumer", async move {
      consumer::consume(events).await;
      Ok::<(), Infallible>(())
    });

    Ok(Running { worker: self, inbox })
  }

  /// [`start`](Self::start) and [`Running::run`] in one step.
  pub async fn run(&self) -> Result<()> {
    self.start()?.run().await;
    Ok(())
  }
}

/// A started worker whose ingestion loop has not been driven yet.
pub struct Running<'a> {
  worker: &'a Worker,
  inbox:  mpsc::Receiver<Message>,
}

impl Running<'_> {
  /// Consume reports until shutdown is requested or ingestion is stopped,
  /// then wait for in-flight messages and stop every background task.
  pub async fn run(self) {
    let worker = self.worker;
    info!(
      store = %worker.config.store_path.display(),
      namespace = %worker.config.namespace,
      "worker running"
    );

    let ctx = OpContext::new(worker.shutdown.child_token());
    Arc::clone(&worker.gate).run(self.inbox, ctx).await;

    worker.tasks.shutdown().await;
    info!(failures = worker.tasks.failures(), "worker stopped");
  }
}

#[cfg(test)]
mod tests;
