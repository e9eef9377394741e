use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

use crate::utils::error::AppError;
use crate::Result;

/// Process-singleton marker file keyed by run name, removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn path_for(dir: &Path, run_name: &str) -> PathBuf {
        dir.join(format!("{}.lock", run_name))
    }

    /// Creates the marker, removing one older than `stale_after` first.
    pub fn acquire(dir: &Path, run_name: &str, stale_after: Duration) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = Self::path_for(dir, run_name);

        if path.exists() {
            let age = fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok());

            match age {
                Some(age) if age < stale_after => {
                    let pid = fs::read_to_string(&path)
                        .map(|s| s.trim().to_string())
                        .unwrap_or_else(|_| "unknown".to_string());
                    return Err(AppError::AlreadyRunning { pid });
                }
                Some(age) => {
                    warn!(lock = %path.display(), age_secs = age.as_secs(), "Removing stale lock file");
                    fs::remove_file(&path)?;
                }
                None => {
                    warn!(lock = %path.display(), "Removing unreadable lock file");
                    fs::remove_file(&path)?;
                }
            }
        }

        let mut file = OpenOptions::new().write(true).create_new(true).open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                AppError::AlreadyRunning { pid: "unknown".to_string() }
            } else {
                AppError::Io(e)
            }
        })?;
        write!(file, "{}", std::process::id())?;
        info!(lock = %path.display(), "Lock acquired");

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "Could not remove lock file");
        }
    }
}
