//! One scraping run: proxy selection, session start and the per-item loop.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::browser::BrowserLauncher;
use crate::config::AppConfig;
use crate::credentials::Credentials;
use crate::extraction::ExtractionEngine;
use crate::models::{ExtractionResult, ItemQuery};
use crate::proxy::{load_proxy_list, ProxyProbe, ProxySelector};
use crate::session::SessionManager;
use crate::sink::IncrementalSink;
use crate::Result;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub batch_file: Option<PathBuf>,
}

pub struct ScrapeRun {
    config: Arc<AppConfig>,
    launcher: Arc<dyn BrowserLauncher>,
    probe: Box<dyn ProxyProbe>,
}

impl ScrapeRun {
    pub fn new(config: Arc<AppConfig>, launcher: Arc<dyn BrowserLauncher>, probe: Box<dyn ProxyProbe>) -> Self {
        Self { config, launcher, probe }
    }

    /// Processes `items` in order, appending one row per item to a fresh
    /// batch file. Fatal errors end the run after closing the browser.
    pub async fn execute(self, items: &[ItemQuery]) -> Result<RunSummary> {
        if items.is_empty() {
            warn!("No identifiers to process");
            return Ok(RunSummary::default());
        }

        let credentials = Credentials::load(&self.config.paths.credentials_file)?;
        let candidates = load_proxy_list(&self.config.paths.proxy_file);
        let mut selector = ProxySelector::new(candidates, self.probe);
        let proxy = selector.select().await?;
        match &proxy {
            Some(p) => info!(proxy = %p, "Using proxy"),
            None => info!("Running without proxy"),
        }

        let mut session = SessionManager::new(self.config.clone(), self.launcher, credentials, proxy)?;
        let outcome = match session.start().await {
            Ok(()) => process_items(&self.config, &mut session, items).await,
            Err(e) => Err(e),
        };
        session.shutdown().await;

        let summary = outcome?;
        info!(
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Run finished"
        );
        Ok(summary)
    }
}

async fn process_items(config: &Arc<AppConfig>, session: &mut SessionManager, items: &[ItemQuery]) -> Result<RunSummary> {
    let mut sink = IncrementalSink::create(&config.paths.batch_dir, &config.paths.batch_prefix)?;
    let engine = ExtractionEngine::new(config.clone());
    let attempts = config.retry.item_attempts;
    let mut summary = RunSummary { batch_file: Some(sink.path().to_path_buf()), ..Default::default() };

    for (index, item) in items.iter().enumerate() {
        info!(identifier = %item, position = index + 1, total = items.len(), "Processing item");

        let mut row = None;
        for attempt in 1..=attempts {
            match engine.extract(session, item).await {
                Ok(result) => {
                    row = Some(result);
                    break;
                }
                Err(e) if e.is_fatal() => {
                    error!(identifier = %item, error = %e, "Fatal error, aborting run");
                    return Err(e);
                }
                Err(e) => {
                    warn!(identifier = %item, attempt, attempts, error = %e, "Extraction raised");
                    if attempt < attempts {
                        sleep(config.retry.retry_delay()).await;
                    }
                }
            }
        }

        let result = match row {
            Some(result) => result,
            None => {
                error!(identifier = %item, attempts, "Item failed on every attempt");
                sleep(config.retry.item_cooldown()).await;
                ExtractionResult::failed(item.as_str(), attempts)
            }
        };

        sink.write(&result)?;
        summary.processed += 1;
        if result.status.is_success() {
            summary.succeeded += 1;
        } else {
            summary.failed += 1;
        }
    }
    Ok(summary)
}
