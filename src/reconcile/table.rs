use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::utils::encoding::read_text;
use crate::utils::error::AppError;
use crate::Result;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Header plus string rows; every row has exactly `headers.len()` cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self { headers, rows: Vec::new() }
    }

    pub fn parse(text: &str, delimiter: u8) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        if headers.iter().all(String::is_empty) {
            return Err(AppError::Internal("no header row".to_string()));
        }

        let width = headers.len();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            let mut row: Vec<String> = record.iter().take(width).map(str::to_string).collect();
            row.resize(width, String::new());
            rows.push(row);
        }
        Ok(Self { headers, rows })
    }

    pub fn read(path: &Path, delimiter: u8) -> Result<Self> {
        let (text, _) = read_text(path)?;
        Self::parse(&text, delimiter)
    }

    /// Semicolon first; a single resulting column means the file was
    /// written comma separated.
    pub fn read_batch(path: &Path) -> Result<Self> {
        let (text, _) = read_text(path)?;
        let table = Self::parse(&text, b';')?;
        if table.headers.len() == 1 {
            return Self::parse(&text, b',');
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of `name`, appending an empty column when absent.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(index) = self.column(name) {
            return index;
        }
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.len() - 1
    }

    pub fn set_column(&mut self, name: &str, value: &str) {
        let index = self.ensure_column(name);
        for row in &mut self.rows {
            row[index] = value.to_string();
        }
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column(from) {
            Some(index) => {
                self.headers[index] = to.to_string();
                true
            }
            None => false,
        }
    }

    pub fn drop_column(&mut self, name: &str) {
        if let Some(index) = self.column(name) {
            self.headers.remove(index);
            for row in &mut self.rows {
                row.remove(index);
            }
        }
    }

    pub fn map_column<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&str) -> String,
    {
        if let Some(index) = self.column(name) {
            for row in &mut self.rows {
                row[index] = f(&row[index]);
            }
        }
    }

    /// Appends `other`'s rows below this table's, matching columns by name.
    /// Columns only one side has are added; missing cells stay empty.
    pub fn append(&mut self, other: Table) {
        let mapping: Vec<usize> = other.headers.iter().map(|h| self.ensure_column(h)).collect();
        let width = self.headers.len();
        for source in other.rows {
            let mut row = vec![String::new(); width];
            for (cell, &target) in source.into_iter().zip(&mapping) {
                row[target] = cell;
            }
            self.rows.push(row);
        }
    }

    /// Writes UTF-8 with BOM; empty cells become `empty_fill` when given.
    pub fn write(&self, path: &Path, delimiter: u8, empty_fill: Option<&str>) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        file.write_all(UTF8_BOM)?;

        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .from_writer(file);
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            match empty_fill {
                Some(fill) => writer.write_record(row.iter().map(|c| if c.is_empty() { fill } else { c.as_str() }))?,
                None => writer.write_record(row)?,
            }
        }
        writer.flush()?;
        Ok(())
    }
}
