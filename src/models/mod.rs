pub mod extraction;
pub mod item;
pub mod proxy;

// Re-exports for convenience
pub use extraction::*;
pub use item::*;
pub use proxy::*;

/// Placeholder written for every field that could not be captured.
pub const SENTINEL: &str = "N/A";

/// `"N/A"` for blank cells, the trimmed value otherwise.
pub fn or_sentinel(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        SENTINEL.to_string()
    } else {
        trimmed.to_string()
    }
}
