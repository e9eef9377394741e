use std::collections::HashSet;
use std::path::Path;
use tracing::{error, info, warn};

use crate::models::ItemQuery;
use crate::utils::encoding::read_text;

/// Identifiers from the first `;`-separated column of the worklist: trimmed,
/// blanks dropped, case-insensitive duplicates collapsed to their first
/// spelling, and a leading header cell skipped. Any read failure yields an
/// empty list.
pub fn load_items(path: &Path, header_markers: &[String]) -> Vec<ItemQuery> {
    if !path.exists() {
        error!(file = %path.display(), "Input file not found");
        return Vec::new();
    }
    let (content, encoding) = match read_text(path) {
        Ok(decoded) => decoded,
        Err(e) => {
            error!(file = %path.display(), error = %e, "Reading input file failed");
            return Vec::new();
        }
    };
    info!(file = %path.display(), ?encoding, "Input file decoded");

    let items = parse_items(&content, header_markers);
    if items.is_empty() {
        warn!(file = %path.display(), "Input file contains no identifiers");
    } else {
        info!(count = items.len(), "Unique identifiers loaded");
    }
    items
}

pub fn parse_items(content: &str, header_markers: &[String]) -> Vec<ItemQuery> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable input row");
                continue;
            }
        };
        let Some(item) = record.get(0).and_then(ItemQuery::new) else {
            continue;
        };
        if seen.insert(item.normalized()) {
            items.push(item);
        }
    }

    if let Some(first) = items.first() {
        let lowered = first.as_str().to_lowercase();
        if header_markers.iter().any(|marker| lowered.contains(&marker.to_lowercase())) {
            info!(header = %first, "Skipping header row");
            items.remove(0);
        }
    }
    items
}
