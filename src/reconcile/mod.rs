//! Folds incremental batch files into the master table and reorders the
//! daily worklist.

pub mod merge;
pub mod table;
pub mod worklist;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::models::SENTINEL;
use crate::utils::encoding::read_text;
use crate::utils::error::AppError;
use crate::utils::fs::{archive_copy, move_to_archive};
use crate::Result;

pub use merge::{canonical_timestamp, newest_per_key, parse_timestamp};
pub use table::Table;
pub use worklist::WorklistStats;

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub master: Table,
    pub archived_master: Option<PathBuf>,
    pub ingested_files: Vec<PathBuf>,
    pub skipped_files: Vec<PathBuf>,
    pub moved_files: Vec<PathBuf>,
    pub updated_keys: usize,
    pub worklist: Option<WorklistStats>,
}

pub struct Reconciler {
    config: Arc<AppConfig>,
}

impl Reconciler {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }

    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let paths = &self.config.paths;
        let settings = &self.config.reconcile;
        let mut report = ReconcileReport::default();

        // The master is only rewritten after this copy exists.
        report.archived_master = archive_copy(&paths.master_file, &paths.archive_dir, &settings.master_archive_prefix)?;

        let (incoming, ingested, skipped) = self.collect_batches()?;
        report.ingested_files = ingested;
        report.skipped_files = skipped;

        let existing = self.read_master()?;

        if report.ingested_files.is_empty() {
            info!("No new batch files, master left as is");
            let existing = existing.map(|master| self.dedup(master));
            report.worklist = worklist::regenerate(&paths.input_file, existing.as_ref(), settings);
            report.master = existing.unwrap_or_default();
            return Ok(report);
        }

        let incoming = self.dedup(incoming);
        report.updated_keys = incoming.len();
        info!(rows = incoming.len(), "Incoming rows after per-key reduction");

        let mut combined = incoming;
        if let Some(master) = existing {
            info!(rows = master.len(), "Existing master rows");
            combined.append(master);
        }
        let mut master = self.dedup(combined);
        master.map_column(&settings.timestamp_column, canonical_timestamp);

        if master.is_empty() {
            warn!("Merged master is empty, not writing it");
        } else {
            master.write(&paths.master_file, b';', Some(SENTINEL))?;
            info!(rows = master.len(), file = %paths.master_file.display(), "Master written");
        }

        for file in &report.ingested_files {
            match move_to_archive(file, &paths.archive_dir, &settings.batch_archive_prefix) {
                Ok(target) => report.moved_files.push(target),
                Err(e) => error!(file = %file.display(), error = %e, "Archiving batch file failed"),
            }
        }

        report.worklist = worklist::regenerate(&paths.input_file, Some(&master), settings);
        report.master = master;
        Ok(report)
    }

    /// Reads every batch file in name order. Unreadable files and files
    /// without the key column are skipped and stay where they are.
    fn collect_batches(&self) -> Result<(Table, Vec<PathBuf>, Vec<PathBuf>)> {
        let settings = &self.config.reconcile;
        let pattern = self.config.paths.batch_pattern();
        let mut files: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| AppError::Internal(format!("invalid batch pattern {}: {}", pattern, e)))?
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(error = %e, "Batch file not accessible");
                    None
                }
            })
            .collect();
        files.sort();
        info!(count = files.len(), %pattern, "Batch files found");

        let mut incoming = Table::new(Vec::new());
        let mut ingested = Vec::new();
        let mut skipped = Vec::new();
        for file in files {
            let mut batch = match Table::read_batch(&file) {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "Batch file unreadable, skipped");
                    skipped.push(file);
                    continue;
                }
            };
            if batch.column(&settings.key_column).is_none() {
                warn!(file = %file.display(), column = %settings.key_column, "Batch file has no key column, skipped");
                skipped.push(file);
                continue;
            }
            let name = file_name(&file);
            batch.set_column(&settings.source_file_column, &name);
            info!(file = %name, rows = batch.len(), "Batch file read");
            incoming.append(batch);
            ingested.push(file);
        }
        Ok((incoming, ingested, skipped))
    }

    fn read_master(&self) -> Result<Option<Table>> {
        let path = &self.config.paths.master_file;
        if !path.exists() {
            info!(file = %path.display(), "No master yet, starting a new one");
            return Ok(None);
        }
        let (text, _) = read_text(path)?;
        if text.trim().is_empty() {
            warn!(file = %path.display(), "Master file is empty, starting a new one");
            return Ok(None);
        }
        let master = Table::parse(&text, b';')?;
        if master.column(&self.config.reconcile.key_column).is_none() {
            return Err(AppError::Internal(format!(
                "master {} has no {} column",
                path.display(),
                self.config.reconcile.key_column
            )));
        }
        Ok(Some(master))
    }

    /// Case-normalizes keys and keeps the newest row per key.
    fn dedup(&self, mut table: Table) -> Table {
        let settings = &self.config.reconcile;
        table.map_column(&settings.key_column, |v| v.trim().to_uppercase());
        for column in &settings.uppercase_columns {
            table.map_column(column, str::to_uppercase);
        }
        let Some(key) = table.column(&settings.key_column) else {
            return table;
        };
        let timestamp = table.column(&settings.timestamp_column);
        let before = table.len();
        table.rows = newest_per_key(std::mem::take(&mut table.rows), key, timestamp);
        if before > table.len() {
            info!(dropped = before - table.len(), "Older rows superseded");
        }
        table
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
