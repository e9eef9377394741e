//! Authenticated browsing session: probe, profile reset and login retries.

pub mod cookies;
pub mod login;

use std::fmt;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::browser::{Browser, BrowserLauncher};
use crate::config::AppConfig;
use crate::credentials::Credentials;
use crate::models::ProxyCandidate;
use crate::utils::error::AppError;
use crate::utils::fs::{force_remove_dir, move_aside};
use crate::Result;

pub use login::{LoginFlow, LoginPatterns};

const SMOKE_TEST_URL: &str = "data:,";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    ProbingSession,
    LoggingIn { attempt: u32 },
    Authenticated,
    LoginFailed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unauthenticated => f.write_str("unauthenticated"),
            SessionState::ProbingSession => f.write_str("probing"),
            SessionState::LoggingIn { attempt } => write!(f, "logging in (attempt {})", attempt),
            SessionState::Authenticated => f.write_str("authenticated"),
            SessionState::LoginFailed => f.write_str("login failed"),
        }
    }
}

pub struct SessionManager {
    config: Arc<AppConfig>,
    launcher: Arc<dyn BrowserLauncher>,
    credentials: Credentials,
    proxy: Option<ProxyCandidate>,
    patterns: LoginPatterns,
    browser: Option<Box<dyn Browser>>,
    state: SessionState,
}

impl SessionManager {
    pub fn new(
        config: Arc<AppConfig>,
        launcher: Arc<dyn BrowserLauncher>,
        credentials: Credentials,
        proxy: Option<ProxyCandidate>,
    ) -> Result<Self> {
        let patterns = LoginPatterns::compile(&config)?;
        Ok(Self {
            config,
            launcher,
            credentials,
            proxy,
            patterns,
            browser: None,
            state: SessionState::Unauthenticated,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn proxy(&self) -> Option<&ProxyCandidate> {
        self.proxy.as_ref()
    }

    /// Label used in proxy-related errors.
    pub fn proxy_label(&self) -> String {
        self.proxy.as_ref().map(|p| p.address.clone()).unwrap_or_else(|| "direct".to_string())
    }

    pub fn browser(&self) -> Result<&dyn Browser> {
        self.browser.as_deref().ok_or(AppError::NoBrowser)
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "Session state change");
        }
        self.state = next;
    }

    /// Launches the first context, restores the cookie snapshot into a fresh
    /// profile and makes sure the session is authenticated.
    pub async fn start(&mut self) -> Result<()> {
        let had_profile = self.config.paths.profile_dir.exists();
        self.launch().await?;
        if !had_profile {
            let browser = self.browser()?;
            if let Err(e) = cookies::restore_snapshot(browser, &self.config.paths.cookie_file).await {
                warn!(error = %e, "Loading cookie snapshot failed");
            }
        }
        self.ensure_authenticated().await
    }

    /// Probes the landing page and logs in again when the probe fails.
    pub async fn ensure_authenticated(&mut self) -> Result<()> {
        self.transition(SessionState::ProbingSession);
        self.open_landing_page().await?;
        sleep(self.config.delays.landing_settle()).await;

        if self.probe().await {
            info!("Session restored from profile");
            self.transition(SessionState::Authenticated);
            return Ok(());
        }
        info!("No valid session in profile");
        self.reauthenticate().await
    }

    /// Cheap per-item check; re-authenticates synchronously when it fails.
    pub async fn check_session(&mut self) -> Result<()> {
        if self.browser.is_none() {
            warn!("No browsing context open, re-authenticating");
            return self.reauthenticate().await;
        }
        self.transition(SessionState::ProbingSession);

        let on_shop = self.browser()?.current_url().contains(&self.config.site.shop_domain);
        if !on_shop {
            debug!("Not on shop domain, opening landing page for session check");
            self.open_landing_page().await?;
            sleep(self.config.delays.page_settle()).await;
        }

        if self.probe().await {
            self.transition(SessionState::Authenticated);
            Ok(())
        } else {
            warn!("Session no longer valid, re-authenticating");
            self.reauthenticate().await
        }
    }

    /// Marker lookup on the current page. The marker element is shared with
    /// logged-out variants, so its text has to contain the expected phrase.
    pub async fn probe(&self) -> bool {
        let Ok(browser) = self.browser() else {
            return false;
        };
        let marker = &self.config.selectors.session_marker;
        match browser.find(marker, self.config.timeouts.session_check()).await {
            Some(element) if element.text.contains(&self.config.site.session_marker_text) => {
                debug!("Session marker text present");
                true
            }
            Some(element) => {
                let preview: String = element.text.chars().take(50).collect();
                info!(text = %preview.replace('\n', " "), "Session marker present without expected text");
                false
            }
            None => {
                info!(%marker, "Session marker not found");
                false
            }
        }
    }

    /// Discards the context, wipes the profile and logs in with a fresh one.
    pub async fn reauthenticate(&mut self) -> Result<()> {
        self.close_browser().await;
        sleep(self.config.delays.context_release()).await;

        self.reset_profile()?;
        sleep(self.config.delays.profile_release()).await;

        info!(proxy = %self.proxy_label(), "Launching fresh context for login");
        self.launch().await?;
        self.login_with_retries().await
    }

    pub async fn shutdown(&mut self) {
        self.close_browser().await;
        info!(state = %self.state, "Session closed");
    }

    async fn open_landing_page(&self) -> Result<()> {
        let signatures = &self.config.site.proxy_error_signatures;
        let browser = self.browser()?;
        if let Err(e) = browser.navigate(&self.config.site.start_url, self.config.timeouts.page_load()).await {
            if e.is_proxy_failure(signatures) {
                error!(proxy = %self.proxy_label(), error = %e, "Proxy failure while opening landing page");
                return Err(AppError::ProxyConnection { proxy: self.proxy_label(), message: e.message().to_string() });
            }
            warn!(error = %e, "Landing page did not load cleanly");
        }
        Ok(())
    }

    fn reset_profile(&self) -> Result<()> {
        let dir = &self.config.paths.profile_dir;
        if !dir.exists() {
            return Ok(());
        }
        match force_remove_dir(dir) {
            Ok(()) => {
                info!(profile = %dir.display(), "Browser profile deleted");
                Ok(())
            }
            Err(delete_err) => {
                error!(profile = %dir.display(), error = %delete_err, "Deleting browser profile failed, renaming it");
                match move_aside(dir) {
                    Ok(moved) => {
                        warn!(to = %moved.display(), "Browser profile moved aside");
                        Ok(())
                    }
                    Err(rename_err) => Err(AppError::ProfileReset {
                        path: dir.clone(),
                        message: format!("delete failed: {}; rename failed: {}", delete_err, rename_err),
                    }),
                }
            }
        }
    }

    async fn login_with_retries(&mut self) -> Result<()> {
        let attempts = self.config.retry.login_attempts;
        for attempt in 1..=attempts {
            self.transition(SessionState::LoggingIn { attempt });
            info!(attempt, attempts, "Starting login");

            let outcome = {
                let browser = self.browser()?;
                LoginFlow::new(browser, &self.config, &self.credentials, &self.patterns).run().await
            };

            match outcome {
                Ok(()) => {
                    info!("Login completed");
                    let browser = self.browser()?;
                    if let Err(e) = cookies::export_snapshot(browser, &self.config.paths.cookie_file).await {
                        warn!(error = %e, "Saving cookie snapshot failed");
                    }
                    self.transition(SessionState::Authenticated);
                    return Ok(());
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(attempt, attempts, error = %e, "Login attempt failed");
                    if attempt < attempts {
                        info!(wait_secs = self.config.retry.login_backoff().as_secs(), "Backing off before next login");
                        sleep(self.config.retry.login_backoff()).await;
                        self.launch().await?;
                    }
                }
            }
        }

        error!(attempts, "Login attempts exhausted, continuing without confirmed session");
        self.transition(SessionState::LoginFailed);
        Ok(())
    }

    /// Replaces any open context with a new, smoke-tested one.
    async fn launch(&mut self) -> Result<()> {
        self.close_browser().await;
        let attempts = self.config.retry.launch_attempts;
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.try_launch().await {
                Ok(browser) => {
                    self.browser = Some(browser);
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Browser launch failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        sleep(self.config.retry.launch_retry_delay()).await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| AppError::Browser("no launch attempted".to_string())))
    }

    async fn try_launch(&self) -> Result<Box<dyn Browser>> {
        let browser = self.launcher.launch(self.proxy.as_ref()).await?;
        if let Err(e) = browser.navigate(SMOKE_TEST_URL, self.config.timeouts.page_load()).await {
            let _ = browser.close().await;
            return Err(AppError::Browser(format!("smoke test failed: {}", e)));
        }
        Ok(browser)
    }

    async fn close_browser(&mut self) {
        if let Some(browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!(error = %e, "Closing browser failed");
            }
        }
    }
}
