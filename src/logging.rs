use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::AppConfig;
use crate::utils::error::AppError;
use crate::utils::fs::archive_copy;
use crate::utils::lock::RunLock;
use crate::Result;

/// Copies the previous run's log into the archive and truncates it.
pub fn archive_previous_log(log_file: &Path, archive_dir: &Path) -> Result<Option<PathBuf>> {
    let has_content = fs::metadata(log_file).map(|m| m.len() > 0).unwrap_or(false);
    if !has_content {
        return Ok(None);
    }
    let prefix = log_file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "log".to_string());
    let archived = archive_copy(log_file, archive_dir, &prefix)?;
    File::create(log_file)?;
    Ok(archived)
}

/// Rotates `<log_dir>/<run_name>.log`. Only the holder of the run lock may
/// touch the file, another instance could still be writing to it.
pub fn prepare_log_file(config: &AppConfig, run_name: &str, _lock: &RunLock) -> Result<PathBuf> {
    let log_dir = &config.paths.log_dir;
    fs::create_dir_all(log_dir)?;
    let log_file = log_dir.join(format!("{}.log", run_name));
    if config.logging.archive_previous {
        archive_previous_log(&log_file, &config.paths.archive_dir)?;
    }
    Ok(log_file)
}

/// Console plus `<log_dir>/<run_name>.log`. Keep the guard alive until exit
/// so buffered lines reach the file.
pub fn init(config: &AppConfig, run_name: &str, lock: &RunLock) -> Result<WorkerGuard> {
    prepare_log_file(config, run_name, lock)?;
    let log_dir = &config.paths.log_dir;
    let file_name = format!("{}.log", run_name);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.default_directive))
        .map_err(|e| AppError::Internal(format!("invalid log filter: {}", e)))?;

    let (file_writer, guard) = non_blocking(rolling::never(log_dir, &file_name));
    let file_layer = fmt::Layer::new()
        .with_writer(file_writer)
        .with_target(false)
        .with_ansi(false);
    let console_layer = fmt::Layer::new()
        .with_writer(std::io::stdout)
        .with_target(false);

    Registry::default()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| AppError::Internal(format!("logging already initialised: {}", e)))?;

    Ok(guard)
}
