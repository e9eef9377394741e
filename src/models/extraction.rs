use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::SENTINEL;

/// Canonical timestamp layout for every file this crate writes.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Header row of an incremental batch file.
pub const BATCH_HEADERS: [&str; 9] = [
    "Timestamp",
    "Identifier",
    "Material_No",
    "Status",
    "Gross",
    "Net",
    "Sale_Note",
    "Extraction_Source",
    "Status_Text",
];

/// Which strategy produced (or failed to produce) a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionSource {
    None,
    Primary { attempt: u32 },
    Fallback,
    PrimaryExhausted,
    BothFailed,
    FallbackError,
}

impl fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionSource::None => f.write_str(SENTINEL),
            ExtractionSource::Primary { attempt } => write!(f, "primary (attempt {})", attempt),
            ExtractionSource::Fallback => f.write_str("fallback"),
            ExtractionSource::PrimaryExhausted => f.write_str("failed primary (all attempts)"),
            ExtractionSource::BothFailed => f.write_str("failed both"),
            ExtractionSource::FallbackError => f.write_str("error fallback"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadFailure {
    Timeout,
    Navigation,
}

/// Terminal outcome of one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionStatus {
    Pending,
    SuccessPrimary { attempt: u32 },
    SuccessFallback,
    LoadFailed { cause: LoadFailure, attempts: u32 },
    NotFound,
    FallbackError,
    ExtractionFailed { attempts: u32 },
}

impl ExtractionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionStatus::SuccessPrimary { .. } | ExtractionStatus::SuccessFallback)
    }
}

impl fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionStatus::Pending => f.write_str("Pending"),
            ExtractionStatus::SuccessPrimary { attempt } => write!(f, "Success (primary - attempt {})", attempt),
            ExtractionStatus::SuccessFallback => f.write_str("Success (fallback)"),
            ExtractionStatus::LoadFailed { cause: LoadFailure::Timeout, attempts } => {
                write!(f, "Failed (timeout loading page after {} attempts)", attempts)
            }
            ExtractionStatus::LoadFailed { cause: LoadFailure::Navigation, attempts } => {
                write!(f, "Failed (navigation error after {} attempts)", attempts)
            }
            ExtractionStatus::NotFound => f.write_str("Failed (not found via either strategy)"),
            ExtractionStatus::FallbackError => f.write_str("Error (fallback extraction)"),
            ExtractionStatus::ExtractionFailed { attempts } => {
                write!(f, "Failed (extraction raised after {} attempts)", attempts)
            }
        }
    }
}

/// One captured row. Fields that could not be read stay at [`SENTINEL`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub timestamp: NaiveDateTime,
    pub identifier: String,
    pub material_code: String,
    pub availability: String,
    pub gross_price: String,
    pub net_price: String,
    pub sale_note: String,
    pub source: ExtractionSource,
    pub status: ExtractionStatus,
}

impl ExtractionResult {
    pub fn pending(identifier: &str) -> Self {
        Self {
            timestamp: Local::now().naive_local(),
            identifier: identifier.to_string(),
            material_code: SENTINEL.to_string(),
            availability: SENTINEL.to_string(),
            gross_price: SENTINEL.to_string(),
            net_price: SENTINEL.to_string(),
            sale_note: SENTINEL.to_string(),
            source: ExtractionSource::None,
            status: ExtractionStatus::Pending,
        }
    }

    /// Synthetic row recorded when every outer attempt raised.
    pub fn failed(identifier: &str, attempts: u32) -> Self {
        Self {
            status: ExtractionStatus::ExtractionFailed { attempts },
            ..Self::pending(identifier)
        }
    }

    /// Cells in [`BATCH_HEADERS`] order.
    pub fn to_record(&self) -> [String; 9] {
        [
            self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            self.identifier.clone(),
            self.material_code.clone(),
            self.availability.clone(),
            self.gross_price.clone(),
            self.net_price.clone(),
            self.sale_note.clone(),
            self.source.to_string(),
            self.status.to_string(),
        ]
    }
}
