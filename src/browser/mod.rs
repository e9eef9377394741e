//! Narrow browsing capability used by the session and extraction engines.
//!
//! Everything above this module talks to [`Browser`] and [`BrowserLauncher`]
//! only, so the state machines can run against a scripted fake.

pub mod chrome;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::models::ProxyCandidate;
use crate::Result;

pub use chrome::{ChromeBrowser, ChromeLauncher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocatorKind {
    Css,
    XPath,
}

/// One page-location rule. Serialized as a plain string: XPath when it starts
/// with `//` or `(`, CSS otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Locator {
    pub kind: LocatorKind,
    pub query: String,
}

impl Locator {
    pub fn css(query: impl Into<String>) -> Self {
        Self { kind: LocatorKind::Css, query: query.into() }
    }

    pub fn xpath(query: impl Into<String>) -> Self {
        Self { kind: LocatorKind::XPath, query: query.into() }
    }

    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with("//") || trimmed.starts_with('(') {
            Self::xpath(trimmed)
        } else {
            Self::css(trimmed)
        }
    }
}

impl From<String> for Locator {
    fn from(raw: String) -> Self {
        Locator::parse(&raw)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.query
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LocatorKind::Css => write!(f, "css={}", self.query),
            LocatorKind::XPath => write!(f, "xpath={}", self.query),
        }
    }
}

/// Snapshot of a located element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundElement {
    pub text: String,
}

impl FoundElement {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn trimmed(&self) -> &str {
        self.text.trim()
    }
}

/// Page load failure reported by [`Browser::navigate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("page load timed out: {0}")]
    Timeout(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
}

impl LoadError {
    pub fn message(&self) -> &str {
        match self {
            LoadError::Timeout(m) | LoadError::Navigation(m) => m,
        }
    }

    /// Only navigation errors carry the network stack's error codes.
    pub fn is_proxy_failure(&self, signatures: &[String]) -> bool {
        match self {
            LoadError::Navigation(message) => signatures.iter().any(|s| message.contains(s.as_str())),
            LoadError::Timeout(_) => false,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            LoadError::Timeout(_) => "timeout",
            LoadError::Navigation(_) => "navigation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub secure: Option<bool>,
    #[serde(default)]
    pub http_only: Option<bool>,
}

/// An open browsing context.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> std::result::Result<(), LoadError>;

    /// `None` when nothing matches within `timeout`.
    async fn find(&self, locator: &Locator, timeout: Duration) -> Option<FoundElement>;

    /// Clicks the first element matching `locator`, falling back to a scripted
    /// click when direct interaction is blocked. `Ok(false)` when absent.
    async fn click(&self, locator: &Locator, timeout: Duration) -> Result<bool>;

    /// Clears and types into the first matching element. `Ok(false)` when absent.
    async fn fill(&self, locator: &Locator, value: &str, timeout: Duration) -> Result<bool>;

    /// Runs a function body that receives its arguments as `args`.
    async fn execute_script(&self, body: &str, args: Vec<serde_json::Value>) -> Result<serde_json::Value>;

    fn current_url(&self) -> String;

    async fn cookies(&self) -> Result<Vec<StoredCookie>>;

    async fn add_cookie(&self, cookie: &StoredCookie) -> Result<()>;

    async fn screenshot(&self, path: &Path) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Creates browsing contexts bound to the durable profile and an optional proxy.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, proxy: Option<&ProxyCandidate>) -> Result<Box<dyn Browser>>;
}
