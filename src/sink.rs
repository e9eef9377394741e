use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::{ExtractionResult, BATCH_HEADERS};
use crate::Result;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Append-only batch file for one scraping run.
pub struct IncrementalSink {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

impl IncrementalSink {
    /// `<dir>/<prefix><YYYY.MM.DD_HHMMSS>.csv`
    pub fn create(dir: &Path, prefix: &str) -> Result<Self> {
        let name = format!("{}{}.csv", prefix, Local::now().format("%Y.%m.%d_%H%M%S"));
        Self::open(&dir.join(name))
    }

    /// Opens `path` for appending; BOM and header go in only when it is empty.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_empty = file.metadata()?.len() == 0;
        if is_empty {
            file.write_all(UTF8_BOM)?;
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .from_writer(file);
        if is_empty {
            writer.write_record(BATCH_HEADERS)?;
            writer.flush()?;
        }
        info!(file = %path.display(), "Batch file ready");

        Ok(Self { path: path.to_path_buf(), writer, rows: 0 })
    }

    pub fn write(&mut self, result: &ExtractionResult) -> Result<()> {
        self.writer.write_record(result.to_record())?;
        self.writer.flush()?;
        self.rows += 1;
        debug!(identifier = %result.identifier, file = %self.path.display(), "Row written");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
}
