//! Proxy list loading and liveness-tested selection.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::models::{Liveness, ProxyCandidate};
use crate::utils::encoding::read_text;
use crate::utils::error::AppError;
use crate::Result;

/// One endpoint per line; blank lines and `#` comments are skipped.
/// A missing or unreadable file yields an empty list.
pub fn load_proxy_list(path: &Path) -> Vec<ProxyCandidate> {
    if !path.exists() {
        warn!(file = %path.display(), "Proxy file not found, continuing without proxy");
        return Vec::new();
    }
    match read_text(path) {
        Ok((content, _)) => {
            let proxies = parse_proxy_list(&content);
            info!(count = proxies.len(), file = %path.display(), "Proxies loaded");
            proxies
        }
        Err(e) => {
            error!(file = %path.display(), error = %e, "Reading proxy file failed");
            Vec::new()
        }
    }
}

pub fn parse_proxy_list(content: &str) -> Vec<ProxyCandidate> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ProxyCandidate::new)
        .collect()
}

/// Connectivity check for a single candidate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProxyProbe: Send + Sync {
    async fn probe(&self, candidate: &ProxyCandidate) -> bool;
}

/// Fetches the echo URL through the proxy.
pub struct HttpProxyProbe {
    test_url: String,
    timeout: Duration,
}

impl HttpProxyProbe {
    pub fn new(test_url: impl Into<String>, timeout: Duration) -> Self {
        Self { test_url: test_url.into(), timeout }
    }

    async fn fetch(&self, candidate: &ProxyCandidate) -> Result<Option<String>> {
        let client = reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(candidate.server_url())?)
            .timeout(self.timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        let response = client.get(&self.test_url).send().await?.error_for_status()?;
        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
        Ok(body.get("origin").and_then(|o| o.as_str()).map(str::to_string))
    }
}

#[async_trait]
impl ProxyProbe for HttpProxyProbe {
    async fn probe(&self, candidate: &ProxyCandidate) -> bool {
        match self.fetch(candidate).await {
            Ok(origin) => {
                info!(proxy = %candidate, origin = origin.as_deref().unwrap_or("N/A"), "Proxy alive");
                true
            }
            Err(e) => {
                warn!(proxy = %candidate, error = %e, "Proxy test failed");
                false
            }
        }
    }
}

pub struct ProxySelector {
    candidates: Vec<ProxyCandidate>,
    probe: Box<dyn ProxyProbe>,
}

impl ProxySelector {
    pub fn new(candidates: Vec<ProxyCandidate>, probe: Box<dyn ProxyProbe>) -> Self {
        Self { candidates, probe }
    }

    pub fn candidates(&self) -> &[ProxyCandidate] {
        &self.candidates
    }

    /// First live candidate in shuffled order. `Ok(None)` when no proxies are
    /// configured; [`AppError::AllProxiesFailed`] when every candidate fails.
    pub async fn select(&mut self) -> Result<Option<ProxyCandidate>> {
        if self.candidates.is_empty() {
            info!("No proxies configured, continuing without proxy");
            return Ok(None);
        }

        self.candidates.shuffle(&mut rand::thread_rng());

        for candidate in self.candidates.iter_mut() {
            info!(proxy = %candidate, "Testing proxy");
            if self.probe.probe(candidate).await {
                candidate.mark(Liveness::Alive);
                return Ok(Some(candidate.clone()));
            }
            candidate.mark(Liveness::Failed);
        }

        error!(tried = self.candidates.len(), "No proxy passed the connectivity test");
        Err(AppError::AllProxiesFailed { tried: self.candidates.len() })
    }
}
