use std::path::Path;
use tracing::{debug, info, warn};

use crate::browser::{Browser, StoredCookie};
use crate::Result;

/// Writes the context's cookies as pretty JSON. Returns the cookie count.
pub async fn export_snapshot(browser: &dyn Browser, path: &Path) -> Result<usize> {
    let cookies = browser.cookies().await?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&cookies)?)?;
    info!(count = cookies.len(), file = %path.display(), "Cookie snapshot saved");
    Ok(cookies.len())
}

/// Loads a snapshot into the context. A missing file restores nothing; a
/// cookie the browser rejects is skipped.
pub async fn restore_snapshot(browser: &dyn Browser, path: &Path) -> Result<usize> {
    if !path.exists() {
        debug!(file = %path.display(), "No cookie snapshot");
        return Ok(0);
    }
    let cookies: Vec<StoredCookie> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let mut restored = 0;
    for cookie in &cookies {
        match browser.add_cookie(cookie).await {
            Ok(()) => restored += 1,
            Err(e) => warn!(cookie = %cookie.name, error = %e, "Cookie could not be restored"),
        }
    }
    info!(restored, total = cookies.len(), "Cookie snapshot restored");
    Ok(restored)
}
