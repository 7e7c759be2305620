use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use aks_sync_cli::AzCli;
use aks_sync_engine::{Catalog, SyncController};

mod config;
mod sink;

use config::{Preferences, PreferencesStore};
use sink::CatalogFileSink;

/// How often the preferences file is checked for edits
const PREFERENCES_POLL: Duration = Duration::from_secs(5);

/// aks-sync - Discover AKS clusters and keep a kubeconfig per cluster
#[derive(Parser, Debug)]
#[command(name = "aks-sync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Preferences file (defaults to the user config dir)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Keep syncing until interrupted
    Run(SyncArgs),

    /// Run a single sync cycle and print the catalog as JSON
    Once(SyncArgs),

    /// Persist the azcli binary path
    SetAzcliPath {
        /// Path to azcli, empty to reset to the default
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Print the effective preferences
    ShowConfig,
}

/// Overrides for the stored preferences
#[derive(clap::Args, Debug, Default)]
struct SyncArgs {
    /// azcli binary to run
    #[arg(long, value_name = "PATH")]
    azcli_path: Option<String>,

    /// Directory kubeconfig files are written to
    #[arg(long, value_name = "DIR")]
    storage_dir: Option<PathBuf>,

    /// Seconds between sync cycles
    #[arg(long, value_name = "SECS")]
    interval_secs: Option<u64>,

    /// File the published catalog is written to
    #[arg(long, value_name = "FILE")]
    catalog_out: Option<PathBuf>,
}

impl SyncArgs {
    fn overrides(&self) -> Preferences {
        Preferences {
            azcli_path: self.azcli_path.clone(),
            storage_dir: self.storage_dir.clone(),
            sync_interval_secs: self.interval_secs,
            catalog_path: self.catalog_out.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run_app(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run_app(args: Args) -> Result<()> {
    let config_path = match args.config {
        Some(path) => path,
        None => Preferences::default_path()
            .context("Could not determine the config directory, pass --config")?,
    };

    match args.command {
        Command::Run(sync) => run_loop(PreferencesStore::open(config_path, sync.overrides())?).await,
        Command::Once(sync) => {
            let write_catalog = sync.catalog_out.is_some();
            run_once(PreferencesStore::open(config_path, sync.overrides())?, write_catalog).await
        }
        Command::SetAzcliPath { path } => {
            let mut store = PreferencesStore::open(config_path, Preferences::default())?;
            store.set_azcli_path(Some(path))?;
            println!(
                "azcli path set to {} in {}",
                store.preferences().cli_settings().binary(),
                store.path().display()
            );
            Ok(())
        }
        Command::ShowConfig => {
            let store = PreferencesStore::open(config_path, Preferences::default())?;
            let prefs = store.preferences();
            println!("preferences:  {}", store.path().display());
            println!("azcli:        {}", prefs.cli_settings().binary());
            println!("storage dir:  {}", prefs.storage_dir().display());
            println!("catalog:      {}", prefs.catalog_path().display());
            println!("interval:     {}s", prefs.sync_interval().as_secs());
            Ok(())
        }
    }
}

/// Run the sync loop until Ctrl-C
async fn run_loop(mut store: PreferencesStore) -> Result<()> {
    let prefs = store.preferences();
    let catalog = Catalog::new();
    let cli = Arc::new(AzCli::new(store.settings()));

    let controller = SyncController::new(cli, prefs.storage_dir(), catalog.clone())
        .with_interval(prefs.sync_interval())
        .watch_settings(store.settings());

    let sink_cancel = CancellationToken::new();
    let sink = tokio::spawn(
        CatalogFileSink::new(catalog, prefs.catalog_path()).run(sink_cancel.clone()),
    );

    info!(
        azcli = %prefs.cli_settings().binary(),
        storage_dir = %prefs.storage_dir().display(),
        interval_secs = prefs.sync_interval().as_secs(),
        "starting cluster sync"
    );
    let handle = controller.spawn();

    let mut poll = tokio::time::interval(PREFERENCES_POLL);
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                info!("shutting down");
                break;
            }

            _ = poll.tick() => {
                if let Err(e) = store.reload() {
                    warn!(error = %format!("{:#}", e), "ignoring unreadable preferences");
                }
            }
        }
    }

    handle.stop().await;
    sink_cancel.cancel();
    sink.await.context("Catalog writer task failed")?;
    Ok(())
}

/// Run exactly one cycle and print the resulting catalog
async fn run_once(store: PreferencesStore, write_catalog: bool) -> Result<()> {
    let prefs = store.preferences();
    let catalog = Catalog::new();
    let cli = Arc::new(AzCli::new(store.settings()));

    let mut controller = SyncController::new(cli, prefs.storage_dir(), catalog.clone());
    let sink = write_catalog.then(|| CatalogFileSink::new(catalog.clone(), prefs.catalog_path()));
    sync_once(&mut controller, sink.as_ref()).await?;

    let json = serde_json::to_string_pretty(&catalog.entries())
        .context("Failed to serialize catalog")?;
    println!("{}", json);
    Ok(())
}

/// One cycle, then mirror the catalog to the sink whatever the outcome.
///
/// A failed cycle clears the catalog, and the file must show that too.
async fn sync_once(
    controller: &mut SyncController<AzCli>,
    sink: Option<&CatalogFileSink>,
) -> Result<()> {
    let result = controller.run_cycle().await;

    if let Some(sink) = sink {
        sink.write().await?;
    }

    result.map(|_| ()).context("Failed to sync clusters")
}
