use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use catalog_sync::browser::ChromeLauncher;
use catalog_sync::input::load_items;
use catalog_sync::logging;
use catalog_sync::proxy::HttpProxyProbe;
use catalog_sync::reconcile::Reconciler;
use catalog_sync::runner::ScrapeRun;
use catalog_sync::utils::lock::RunLock;
use catalog_sync::{AppConfig, AppError};

/// Locks older than this belong to a crashed run.
const STALE_LOCK_AFTER: Duration = Duration::from_secs(300);

#[derive(Parser)]
#[command(name = "catalog-sync")]
#[command(about = "Harvests catalog prices behind a login and reconciles them into a master table")]
struct Cli {
    /// Extra configuration file layered over config/*.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every identifier from the worklist into a new batch file
    Scrape {
        #[arg(long, conflicts_with = "no_headless")]
        headless: bool,
        #[arg(long)]
        no_headless: bool,
    },

    /// Merge batch files into the master and reorder the worklist
    Reconcile,
}

impl Commands {
    fn run_name(&self) -> &'static str {
        match self {
            Commands::Scrape { .. } => "scrape",
            Commands::Reconcile => "reconcile",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("catalog-sync: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Commands::Scrape { headless, no_headless } = &cli.command {
        if *headless {
            config.site.headless = true;
        } else if *no_headless {
            config.site.headless = false;
        }
    }
    let config = Arc::new(config);

    let run_name = cli.command.run_name();
    let lock = match RunLock::acquire(&config.paths.lock_dir, run_name, STALE_LOCK_AFTER) {
        Ok(lock) => lock,
        Err(AppError::AlreadyRunning { pid }) => {
            eprintln!("catalog-sync: another {} run (pid {}) holds the lock, exiting", run_name, pid);
            return Ok(ExitCode::from(2));
        }
        Err(e) => return Err(e).context("acquiring run lock"),
    };

    let _guard = logging::init(&config, run_name, &lock).context("initialising logging")?;
    info!(command = run_name, "Starting catalog-sync");

    let work = async {
        match cli.command {
            Commands::Scrape { .. } => scrape(config.clone()).await,
            Commands::Reconcile => reconcile(config.clone()),
        }
    };

    tokio::select! {
        outcome = work => match outcome {
            Ok(()) => {
                info!("Done");
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                error!(error = %e, "Run failed");
                Ok(ExitCode::FAILURE)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, shutting down");
            Ok(ExitCode::from(130))
        }
    }
}

async fn scrape(config: Arc<AppConfig>) -> catalog_sync::Result<()> {
    let items = load_items(&config.paths.input_file, &config.input.header_markers);
    let launcher = Arc::new(ChromeLauncher::new(config.clone()));
    let probe = Box::new(HttpProxyProbe::new(config.site.proxy_test_url.clone(), config.timeouts.proxy_test()));

    let summary = ScrapeRun::new(config, launcher, probe).execute(&items).await?;
    if let Some(file) = summary.batch_file {
        info!(file = %file.display(), rows = summary.processed, "Batch file complete");
    }
    Ok(())
}

fn reconcile(config: Arc<AppConfig>) -> catalog_sync::Result<()> {
    let report = Reconciler::new(config).reconcile()?;
    info!(
        ingested = report.ingested_files.len(),
        skipped = report.skipped_files.len(),
        moved = report.moved_files.len(),
        updated_keys = report.updated_keys,
        master_rows = report.master.len(),
        "Reconciliation finished"
    );
    Ok(())
}
