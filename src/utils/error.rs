use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("Login step failed: {step}")]
    StepFailed { step: String },

    #[error("No browsing context is open")]
    NoBrowser,

    #[error("None of the {tried} configured proxies passed the connectivity test")]
    AllProxiesFailed { tried: usize },

    #[error("Proxy connection failed via {proxy}: {message}")]
    ProxyConnection { proxy: String, message: String },

    #[error("Could not reset browser profile {}: {message}", path.display())]
    ProfileReset { path: PathBuf, message: String },

    #[error("Another instance is already running (pid {pid})")]
    AlreadyRunning { pid: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Conditions after which the whole run has to stop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::AllProxiesFailed { .. }
                | AppError::ProxyConnection { .. }
                | AppError::ProfileReset { .. }
                | AppError::Credentials(_)
        )
    }

    pub fn step(step: impl Into<String>) -> Self {
        AppError::StepFailed { step: step.into() }
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
