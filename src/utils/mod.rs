pub mod encoding;
pub mod error;
pub mod fs;
pub mod lock;
