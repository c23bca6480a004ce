//! porcupin-node — the backup-engine daemon binary.
//!
//! Startup sequence:
//!   1. Load (or default) `config.yaml` from the data directory
//!   2. Open the persistence store
//!   3. Wire the indexer adapter and blob store
//!   4. Run catch-up, then realtime subscribers, then the trigger-queue loop
//!   5. Run the retry/scanner worker alongside it
//!
//! The CLI surface is deliberately thin (data dir, optional config path
//! override) — the rich argument surface and the REST control facade are
//! out of scope for this binary (see the root specification's Non-goals).

mod diskwalk;

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::{watch, RwLock};
use tracing::info;

use porcupin_backup::config::EngineConfig;
use porcupin_backup::{Orchestrator, PinManager, ProgressCounters, ScannerWorker, Synchronizer};
use porcupin_blobstore::KuboHttpBlobStore;
use porcupin_core::constants::DEFAULT_DB_FILE_NAME;
use porcupin_indexer::IndexerClient;
use porcupin_store::StoreHandle;

use diskwalk::WalkingDiskUsageProbe;

#[derive(Parser, Debug)]
#[command(
    name = "porcupin-node",
    version,
    about = "porcupin backup engine — keeps a durable local replica of your NFTs' content-addressed assets"
)]
struct Args {
    /// Directory holding the persistence store and config.yaml.
    #[arg(long, default_value = "~/.porcupin/data")]
    data_dir: PathBuf,

    /// Override the config file path (defaults to `{data_dir}/config.yaml`).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,porcupin=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("porcupin backup engine starting");

    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join("config.yaml"));
    let config = load_config(&config_path)?;

    // ── Persistence store ────────────────────────────────────────────────
    let db_path = data_dir.join(DEFAULT_DB_FILE_NAME);
    let store = Arc::new(StoreHandle::open(&db_path).context("opening persistence store")?);

    // ── Indexer adapter ───────────────────────────────────────────────────
    let indexer: Arc<dyn porcupin_indexer::Indexer> =
        Arc::new(IndexerClient::new(config.tzkt.base_url.clone()));

    // ── Blob store ────────────────────────────────────────────────────────
    let repo_path = if config.ipfs.repo_path.is_empty() {
        data_dir.join("ipfs-repo").display().to_string()
    } else {
        config.ipfs.repo_path.clone()
    };
    let blobstore: Arc<dyn porcupin_blobstore::BlobStore> = Arc::new(KuboHttpBlobStore::new(
        config.ipfs.api_base.clone(),
        repo_path.clone(),
    ));

    // ── Shared engine state ───────────────────────────────────────────────
    let progress = Arc::new(ProgressCounters::new());
    let paused = Arc::new(RwLock::new(false));
    let disk_dirty = Arc::new(AtomicBool::new(false));

    let pin_manager = Arc::new(PinManager::new(
        Arc::clone(&store),
        Arc::clone(&blobstore),
        Arc::clone(&indexer),
        config.ipfs.clone(),
        config.backup.clone(),
        Arc::clone(&paused),
        Arc::clone(&disk_dirty),
        Arc::clone(&progress),
    ));

    let synchronizer = Arc::new(Synchronizer::new(
        Arc::clone(&store),
        Arc::clone(&indexer),
        Arc::clone(&pin_manager),
        Arc::clone(&paused),
        Arc::clone(&progress),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&synchronizer),
        Arc::clone(&pin_manager),
        Arc::clone(&progress),
        Arc::clone(&paused),
        config.tzkt.base_url.replace("http", "ws"),
    ));

    let scanner = ScannerWorker::new(
        Arc::clone(&pin_manager),
        Arc::clone(&orchestrator),
        Arc::new(WalkingDiskUsageProbe),
        PathBuf::from(repo_path),
        config.backup.max_retries,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let orchestrator_task = tokio::spawn(Arc::clone(&orchestrator).run(shutdown_rx.clone()));
    let scanner_task = tokio::spawn(scanner.run(shutdown_rx));

    info!("node ready");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown signal received, stopping");
    let _ = shutdown_tx.send(true);

    let _ = orchestrator_task.await;
    let _ = scanner_task.await;

    Ok(())
}

/// Read `config.yaml`, falling back to every-field-default if the file is
/// absent (first boot) so the daemon can still start.
fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "no config.yaml found, using defaults");
        return Ok(EngineConfig::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing config at {}", path.display()))
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
