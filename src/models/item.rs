use serde::{Deserialize, Serialize};
use std::fmt;

/// An identifier requested from the shop. Never blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemQuery(String);

impl ItemQuery {
    /// Trims the raw value; `None` when nothing is left.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key used for case-insensitive deduplication and joins.
    pub fn normalized(&self) -> String {
        self.0.to_uppercase()
    }
}

impl fmt::Display for ItemQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ItemQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
