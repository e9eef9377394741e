use chrono::{NaiveDate, NaiveDateTime};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::TIMESTAMP_FORMAT;

const DATETIME_FORMATS: [&str; 7] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d.%m.%Y"];

/// Lenient parse of the timestamp layouts found in batch and master files.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Parsable values in canonical layout; anything else unchanged.
pub fn canonical_timestamp(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        None => raw.to_string(),
    }
}

/// Newest first; undated rows after every dated one.
fn newest_first(a: &Option<NaiveDateTime>, b: &Option<NaiveDateTime>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sorts by (key ascending, timestamp descending) and keeps the first row of
/// every key. The sort is stable, so among equal timestamps the row that
/// came first in `rows` wins.
pub fn newest_per_key(rows: Vec<Vec<String>>, key: usize, timestamp: Option<usize>) -> Vec<Vec<String>> {
    let mut keyed: Vec<(Option<NaiveDateTime>, Vec<String>)> = rows
        .into_iter()
        .map(|row| (timestamp.and_then(|i| parse_timestamp(&row[i])), row))
        .collect();
    keyed.sort_by(|(ts_a, a), (ts_b, b)| a[key].cmp(&b[key]).then_with(|| newest_first(ts_a, ts_b)));

    let mut seen = HashSet::new();
    keyed
        .into_iter()
        .filter(|(_, row)| seen.insert(row[key].clone()))
        .map(|(_, row)| row)
        .collect()
}
