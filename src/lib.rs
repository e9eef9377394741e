pub mod browser;
pub mod config;
pub mod credentials;
pub mod element_finder;
pub mod extraction;
pub mod input;
pub mod logging;
pub mod models;
pub mod proxy;
pub mod reconcile;
pub mod runner;
pub mod session;
pub mod sink;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
