use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{error, info, warn};

use super::merge::parse_timestamp;
use super::table::Table;
use crate::config::ReconcileConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorklistStats {
    pub total: usize,
    pub undated: usize,
    pub dated: usize,
    pub duplicates_removed: usize,
}

/// Rewrites the daily worklist in processing order: keys never captured
/// first, then oldest capture first. Problems are logged and leave the
/// file untouched.
pub fn regenerate(path: &Path, master: Option<&Table>, config: &ReconcileConfig) -> Option<WorklistStats> {
    if !path.exists() {
        warn!(file = %path.display(), "Worklist not found");
        return None;
    }
    let mut table = match Table::read(path, b';') {
        Ok(table) => table,
        Err(e) => {
            error!(file = %path.display(), error = %e, "Reading worklist failed");
            return None;
        }
    };
    info!(file = %path.display(), columns = ?table.headers, "Worklist loaded");

    let key = config.key_column.as_str();
    if table.column(key).is_none() {
        let Some(alias) = config.key_aliases.iter().find(|a| table.column(a).is_some()).cloned() else {
            error!(column = key, aliases = ?config.key_aliases, "Worklist has no key column");
            return None;
        };
        table.rename_column(&alias, key);
    }

    table.map_column(key, |v| v.trim().to_uppercase());
    for column in &config.uppercase_columns {
        table.map_column(column, str::to_uppercase);
    }

    let duplicates_removed = drop_duplicate_keys(&mut table, key);
    attach_master_timestamps(&mut table, master, config);

    let ts_index = table.ensure_column(&config.timestamp_column);
    let mut keyed: Vec<_> = table
        .rows
        .drain(..)
        .map(|row| (parse_timestamp(&row[ts_index]), row))
        .collect();
    // `None < Some(_)`: undated rows first, then ascending.
    keyed.sort_by(|(a, _), (b, _)| a.cmp(b));
    let undated = keyed.iter().filter(|(ts, _)| ts.is_none()).count();
    table.rows = keyed.into_iter().map(|(_, row)| row).collect();

    if let Err(e) = table.write(path, b';', None) {
        error!(file = %path.display(), error = %e, "Writing worklist failed");
        return None;
    }

    let stats = WorklistStats {
        total: table.len(),
        undated,
        dated: table.len() - undated,
        duplicates_removed,
    };
    info!(total = stats.total, undated = stats.undated, dated = stats.dated, "Worklist reordered");
    Some(stats)
}

fn drop_duplicate_keys(table: &mut Table, key: &str) -> usize {
    let Some(index) = table.column(key) else {
        return 0;
    };
    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in &table.rows {
        *counts.entry(row[index].clone()).or_default() += 1;
    }
    let mut duplicated: Vec<&String> = counts.iter().filter(|(_, n)| **n > 1).map(|(k, _)| k).collect();
    if duplicated.is_empty() {
        return 0;
    }
    duplicated.sort();
    warn!(keys = ?duplicated, "Worklist contains duplicate keys");

    let before = table.len();
    let mut seen = HashSet::new();
    table.rows.retain(|row| seen.insert(row[index].clone()));
    let removed = before - table.len();
    info!(removed, remaining = table.len(), "Duplicate worklist rows dropped");
    removed
}

/// Replaces the worklist's timestamp column with the master's value per key.
/// Without a master the existing column is kept.
fn attach_master_timestamps(table: &mut Table, master: Option<&Table>, config: &ReconcileConfig) {
    let Some(master) = master else {
        table.ensure_column(&config.timestamp_column);
        return;
    };
    let latest: HashMap<&str, &str> = match (master.column(&config.key_column), master.column(&config.timestamp_column)) {
        (Some(k), Some(t)) => master.rows.iter().map(|row| (row[k].as_str(), row[t].as_str())).collect(),
        _ => HashMap::new(),
    };

    table.drop_column(&config.timestamp_column);
    let Some(key_index) = table.column(&config.key_column) else {
        return;
    };
    let ts_index = table.ensure_column(&config.timestamp_column);
    for row in &mut table.rows {
        row[ts_index] = latest.get(row[key_index].as_str()).map(|s| s.to_string()).unwrap_or_default();
    }
}
