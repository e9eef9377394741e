use async_trait::async_trait;
use headless_chrome::protocol::cdp::Network::CookieParam;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::util::Timeout;
use headless_chrome::{Browser as ChromeProcess, Element, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use super::{Browser, BrowserLauncher, LoadError, Locator, LocatorKind, StoredCookie};
use crate::config::AppConfig;
use crate::models::ProxyCandidate;
use crate::utils::error::AppError;
use crate::Result;

const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(3600);

/// Launches Chrome bound to the durable profile directory.
pub struct ChromeLauncher {
    config: Arc<AppConfig>,
}

impl ChromeLauncher {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, proxy: Option<&ProxyCandidate>) -> Result<Box<dyn Browser>> {
        let profile_dir = self.config.paths.profile_dir.clone();
        std::fs::create_dir_all(&profile_dir)?;

        let proxy_server = proxy.map(|p| p.server_url());
        let config = Arc::clone(&self.config);
        let launch_proxy = proxy_server.clone();
        let launch_profile = profile_dir.clone();
        let (process, tab) = tokio::task::spawn_blocking(move || -> Result<(ChromeProcess, Arc<Tab>)> {
            let mut launch_options = LaunchOptions::default_builder()
                .headless(config.site.headless)
                .sandbox(false)
                .user_data_dir(Some(launch_profile))
                .proxy_server(launch_proxy.as_deref())
                .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
                .args(vec![
                    OsStr::new("--no-sandbox"),
                    OsStr::new("--disable-dev-shm-usage"),
                    OsStr::new("--disable-gpu"),
                    OsStr::new("--disable-extensions"),
                    OsStr::new("--disable-background-timer-throttling"),
                    OsStr::new("--disable-backgrounding-occluded-windows"),
                    OsStr::new("--disable-renderer-backgrounding"),
                    OsStr::new("--disable-blink-features=AutomationControlled"),
                ])
                .build()
                .map_err(|e| AppError::Browser(format!("Failed to create launch options: {}", e)))?;

            if let Some(chrome_path) = &config.site.chrome_path {
                launch_options.path = Some(PathBuf::from(chrome_path));
            }

            let process = ChromeProcess::new(launch_options)
                .map_err(|e| AppError::Browser(format!("Failed to launch browser: {}", e)))?;
            let tab = process
                .new_tab()
                .map_err(|e| AppError::Browser(format!("Failed to create tab: {}", e)))?;

            if let Some(user_agent) = &config.site.user_agent {
                tab.set_user_agent(user_agent, None, None)
                    .map_err(|e| AppError::Browser(format!("Failed to set user agent: {}", e)))?;
            }
            Ok((process, tab))
        })
        .await
        .map_err(task_failed)??;

        info!(
            profile = %profile_dir.display(),
            proxy = proxy_server.as_deref().unwrap_or("direct"),
            "Browser context launched"
        );

        Ok(Box::new(ChromeBrowser { _process: process, tab }))
    }
}

/// One Chrome process driven through a single tab.
pub struct ChromeBrowser {
    // Kept alive for the lifetime of the tab.
    _process: ChromeProcess,
    tab: Arc<Tab>,
}

impl ChromeBrowser {
    async fn on_tab<R, F>(&self, op: F) -> std::result::Result<R, JoinError>
    where
        F: FnOnce(&Tab) -> R + Send + 'static,
        R: Send + 'static,
    {
        off_runtime(&self.tab, op).await
    }
}

/// headless_chrome waits block the calling thread for up to the navigation
/// timeout, so they run on the blocking pool.
async fn off_runtime<S, R, F>(shared: &Arc<S>, op: F) -> std::result::Result<R, JoinError>
where
    S: Send + Sync + 'static,
    F: FnOnce(&S) -> R + Send + 'static,
    R: Send + 'static,
{
    let shared = Arc::clone(shared);
    tokio::task::spawn_blocking(move || op(&shared)).await
}

fn task_failed(e: JoinError) -> AppError {
    AppError::Browser(format!("Browser task failed: {}", e))
}

fn locate<'t>(tab: &'t Tab, locator: &Locator, timeout: Duration) -> Option<Element<'t>> {
    let found = match locator.kind {
        LocatorKind::Css => tab.wait_for_element_with_custom_timeout(&locator.query, timeout),
        LocatorKind::XPath => tab.wait_for_xpath_with_custom_timeout(&locator.query, timeout),
    };
    found.ok()
}

fn classify_load_error(error: anyhow::Error) -> LoadError {
    let message = error.to_string();
    let lowered = message.to_lowercase();
    let timed_out = error.chain().any(|cause| cause.is::<Timeout>())
        || lowered.contains("timeout")
        || lowered.contains("timed out");
    if timed_out {
        LoadError::Timeout(message)
    } else {
        LoadError::Navigation(message)
    }
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn navigate(&self, url: &str, timeout: Duration) -> std::result::Result<(), LoadError> {
        let url = url.to_string();
        self.on_tab(move |tab| -> anyhow::Result<()> {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
        .map_err(|e| LoadError::Navigation(format!("Browser task failed: {}", e)))?
        .map_err(classify_load_error)
    }

    async fn find(&self, locator: &Locator, timeout: Duration) -> Option<super::FoundElement> {
        let locator = locator.clone();
        let text = self
            .on_tab(move |tab| {
                let element = locate(tab, &locator, timeout)?;
                match element.get_inner_text() {
                    Ok(text) => Some(text),
                    Err(e) => {
                        debug!(%locator, error = %e, "Element found but text unreadable");
                        Some(String::new())
                    }
                }
            })
            .await;
        match text {
            Ok(text) => text.map(super::FoundElement::new),
            Err(e) => {
                warn!(error = %e, "Element lookup task failed");
                None
            }
        }
    }

    async fn click(&self, locator: &Locator, timeout: Duration) -> Result<bool> {
        let locator = locator.clone();
        self.on_tab(move |tab| -> Result<bool> {
            let Some(element) = locate(tab, &locator, timeout) else {
                return Ok(false);
            };
            if let Err(e) = element.scroll_into_view() {
                debug!(%locator, error = %e, "Scrolling into view failed");
            }
            if let Err(e) = element.click() {
                debug!(%locator, error = %e, "Direct click failed, using scripted click");
                element
                    .call_js_fn("function() { this.click(); }", vec![], false)
                    .map_err(|e| AppError::Browser(format!("Scripted click on {} failed: {}", locator, e)))?;
            }
            Ok(true)
        })
        .await
        .map_err(task_failed)?
    }

    async fn fill(&self, locator: &Locator, value: &str, timeout: Duration) -> Result<bool> {
        let locator = locator.clone();
        let value = value.to_string();
        self.on_tab(move |tab| -> Result<bool> {
            let Some(element) = locate(tab, &locator, timeout) else {
                return Ok(false);
            };
            if let Err(e) = element.click() {
                debug!(%locator, error = %e, "Focus click failed");
            }
            element
                .call_js_fn("function() { this.value = ''; }", vec![], false)
                .map_err(|e| AppError::Browser(format!("Clearing {} failed: {}", locator, e)))?;
            element
                .type_into(&value)
                .map_err(|e| AppError::Browser(format!("Typing into {} failed: {}", locator, e)))?;
            Ok(true)
        })
        .await
        .map_err(task_failed)?
    }

    async fn execute_script(&self, body: &str, args: Vec<serde_json::Value>) -> Result<serde_json::Value> {
        let args = serde_json::Value::Array(args);
        let expression = format!("(function(args) {{ {} }})({})", body, args);
        let remote = self
            .on_tab(move |tab| tab.evaluate(&expression, false))
            .await
            .map_err(task_failed)?
            .map_err(|e| AppError::Browser(format!("Script evaluation failed: {}", e)))?;
        Ok(remote.value.unwrap_or(serde_json::Value::Null))
    }

    fn current_url(&self) -> String {
        self.tab.get_url()
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>> {
        let cookies = self
            .on_tab(|tab| tab.get_cookies())
            .await
            .map_err(task_failed)?
            .map_err(|e| AppError::Browser(format!("Reading cookies failed: {}", e)))?;
        let mut stored = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let value = serde_json::to_value(&cookie)?;
            stored.push(serde_json::from_value(value)?);
        }
        Ok(stored)
    }

    async fn add_cookie(&self, cookie: &StoredCookie) -> Result<()> {
        let param: CookieParam = serde_json::from_value(serde_json::to_value(cookie)?)?;
        let name = cookie.name.clone();
        self.on_tab(move |tab| tab.set_cookies(vec![param]).map(|_| ()))
            .await
            .map_err(task_failed)?
            .map_err(|e| AppError::Browser(format!("Setting cookie {} failed: {}", name, e)))?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let data = self
            .on_tab(|tab| tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true))
            .await
            .map_err(task_failed)?
            .map_err(|e| AppError::Browser(format!("Screenshot capture failed: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, data)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let closed = self.on_tab(|tab| tab.close(true)).await.map_err(task_failed)?;
        if let Err(e) = closed {
            warn!(error = %e, "Closing tab failed");
        }
        Ok(())
    }
}
