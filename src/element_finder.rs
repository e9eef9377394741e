//! Ordered "try these locators in turn" lookups.
//!
//! A [`SelectorChain`] is plain data: the first candidate that matches wins
//! and the rest are never touched.

use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser::{Browser, FoundElement, Locator};
use crate::config::AppConfig;
use crate::Result;

/// Which candidate of a chain matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainMatch {
    pub index: usize,
    pub locator: Locator,
    pub element: Option<FoundElement>,
}

#[derive(Debug, Clone, Copy)]
pub struct SelectorChain<'a> {
    name: &'a str,
    candidates: &'a [Locator],
}

impl<'a> SelectorChain<'a> {
    pub fn new(name: &'a str, candidates: &'a [Locator]) -> Self {
        Self { name, candidates }
    }

    /// Waits up to `timeout` for each candidate in order.
    pub async fn find(&self, browser: &dyn Browser, timeout: Duration) -> Option<ChainMatch> {
        for (index, locator) in self.candidates.iter().enumerate() {
            if let Some(element) = browser.find(locator, timeout).await {
                debug!(chain = self.name, %locator, index, "Chain candidate matched");
                return Some(ChainMatch { index, locator: locator.clone(), element: Some(element) });
            }
        }
        debug!(chain = self.name, tried = self.candidates.len(), "No chain candidate matched");
        None
    }

    pub async fn click(&self, browser: &dyn Browser, timeout: Duration) -> Result<Option<ChainMatch>> {
        for (index, locator) in self.candidates.iter().enumerate() {
            if browser.click(locator, timeout).await? {
                info!(chain = self.name, %locator, "Clicked");
                return Ok(Some(ChainMatch { index, locator: locator.clone(), element: None }));
            }
        }
        Ok(None)
    }

    pub async fn fill(&self, browser: &dyn Browser, value: &str, timeout: Duration) -> Result<Option<ChainMatch>> {
        for (index, locator) in self.candidates.iter().enumerate() {
            if browser.fill(locator, value, timeout).await? {
                info!(chain = self.name, %locator, "Field filled");
                return Ok(Some(ChainMatch { index, locator: locator.clone(), element: None }));
            }
        }
        Ok(None)
    }
}

const CONSENT_SCRIPT: &str = r#"
    const host = document.querySelector(args[0]);
    if (!host || !host.shadowRoot) { return false; }
    const button = host.shadowRoot.querySelector(args[1]);
    if (!button) { return false; }
    button.click();
    return true;
"#;

/// Accepts the consent overlay when present. Never fails the caller.
pub async fn dismiss_consent(browser: &dyn Browser, config: &AppConfig) -> bool {
    let host = Locator::css(config.selectors.consent_host.as_str());
    if browser.find(&host, config.timeouts.consent()).await.is_none() {
        debug!(host = %config.selectors.consent_host, "No consent overlay");
        return false;
    }
    tokio::time::sleep(config.delays.consent_settle()).await;

    let args = vec![json!(config.selectors.consent_host), json!(config.selectors.consent_button)];
    match browser.execute_script(CONSENT_SCRIPT, args).await {
        Ok(serde_json::Value::Bool(true)) => {
            info!("Consent overlay accepted");
            tokio::time::sleep(config.delays.consent_settle()).await;
            true
        }
        Ok(_) => {
            warn!(button = %config.selectors.consent_button, "Consent button not found inside overlay");
            false
        }
        Err(e) => {
            warn!(error = %e, "Dismissing consent overlay failed");
            false
        }
    }
}
