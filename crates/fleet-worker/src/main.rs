//! fleet-worker binary.
//!
//! Reads `fleet.toml` (or the path given with `--config`) plus `FLEET_*`
//! environment overrides, opens the SQLite store and runs the location
//! ingestion pipeline. The remaining subcommands seed and inspect the store.
//!
//! ```
//! fleet-worker seed demos/seed.json
//! fleet-worker run --simulate
//! fleet-worker current B1234ABC
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use fleet_core::store::LocationStore as _;
use fleet_store_sqlite::SqliteStore;
use fleet_worker::{Worker, WorkerConfig, feed, seed, simulate::Simulator};
use tokio::io::BufReader;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Fleet location ingestion worker")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "fleet.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Consume location reports until interrupted.
  Run {
    /// Publish synthetic reports for every registered vehicle.
    #[arg(long)]
    simulate:    bool,
    /// Delay between synthetic reports.
    #[arg(long, default_value_t = 2000)]
    interval_ms: u64,
    /// Read `<topic> <json>` lines from stdin; exit once it is drained.
    #[arg(long)]
    stdin:       bool,
  },
  /// Register the vehicles and points of interest in a JSON file.
  Seed { file: PathBuf },
  /// Print the current location of a vehicle.
  Current { vehicle_id: String },
  /// Print the location history of a vehicle.
  History {
    vehicle_id: String,
    #[arg(long, default_value_t = 0)]
    start:      i64,
    #[arg(long, default_value_t = i64::MAX)]
    end:        i64,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("FLEET")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let mut worker_cfg: WorkerConfig = settings
    .try_deserialize()
    .context("failed to deserialise WorkerConfig")?;
  worker_cfg.store_path = expand_tilde(&worker_cfg.store_path);

  match cli.command {
    Command::Run { simulate, interval_ms, stdin } => {
      run(worker_cfg, simulate, Duration::from_millis(interval_ms), stdin).await
    }
    Command::Seed { file } => {
      let store = open_store(&worker_cfg.store_path).await?;
      let contents = seed::SeedFile::load(&file)
        .await
        .with_context(|| format!("failed to load seed file {file:?}"))?;
      seed::apply(&store, contents).await.context("seeding failed")?;
      Ok(())
    }
    Command::Current { vehicle_id } => {
      let store = open_store(&worker_cfg.store_path).await?;
      match store.current_location(&vehicle_id).await? {
        Some(current) => println!("{}", serde_json::to_string_pretty(&current)?),
        None => warn!(vehicle_id, "no current location"),
      }
      Ok(())
    }
    Command::History { vehicle_id, start, end } => {
      let store = open_store(&worker_cfg.store_path).await?;
      let rows = store.history(&vehicle_id, start, end).await?;
      println!("{}", serde_json::to_string_pretty(&rows)?);
      Ok(())
    }
  }
}

async fn run(
  config: WorkerConfig,
  simulate: bool,
  interval: Duration,
  stdin: bool,
) -> anyhow::Result<()> {
  let store_path = config.store_path.clone();
  let worker = Arc::new(
    Worker::open(config)
      .await
      .with_context(|| format!("failed to start worker on {store_path:?}"))?,
  );

  let shutdown = worker.shutdown_token();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      info!("interrupt received, shutting down");
      shutdown.cancel();
    }
  });

  let running = worker.start()?;

  if simulate {
    let vehicles = worker
      .store()
      .vehicles()
      .await?
      .into_iter()
      .map(|v| v.vehicle_id)
      .collect();
    let points = worker.store().points_of_interest().await?;
    let simulator = Simulator::new(worker.config().namespace.clone(), vehicles, points, interval);
    worker.tasks().spawn("simulator", simulator.run(worker.bus().clone()));
  }

  if stdin {
    let feeder = Arc::clone(&worker);
    worker.tasks().spawn("stdin-feed", async move {
      let published = feed::publish_lines(BufReader::new(tokio::io::stdin()), feeder.bus()).await?;
      info!(published, "stdin drained");
      feeder.stop_ingestion();
      Ok::<(), std::io::Error>(())
    });
  }

  running.run().await;
  Ok(())
}

async fn open_store(path: &Path) -> anyhow::Result<SqliteStore> {
  SqliteStore::open(path)
    .await
    .with_context(|| format!("failed to open store at {path:?}"))
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
