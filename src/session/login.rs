use regex::Regex;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::browser::Browser;
use crate::config::AppConfig;
use crate::credentials::Credentials;
use crate::element_finder::{dismiss_consent, SelectorChain};
use crate::utils::error::AppError;
use crate::Result;

/// URL patterns compiled once per session.
#[derive(Debug, Clone)]
pub struct LoginPatterns {
    pub transition: Regex,
    pub success: Regex,
}

impl LoginPatterns {
    pub fn compile(config: &AppConfig) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| AppError::Internal(format!("invalid URL pattern {}: {}", pattern, e)))
        };
        Ok(Self {
            transition: compile(&config.site.login_transition_url_pattern)?,
            success: compile(&config.site.login_success_url_pattern)?,
        })
    }
}

/// One pass through the login form. Every required step fails with
/// [`AppError::StepFailed`] when none of its candidates match.
pub struct LoginFlow<'a> {
    browser: &'a dyn Browser,
    config: &'a AppConfig,
    credentials: &'a Credentials,
    patterns: &'a LoginPatterns,
}

impl<'a> LoginFlow<'a> {
    pub fn new(
        browser: &'a dyn Browser,
        config: &'a AppConfig,
        credentials: &'a Credentials,
        patterns: &'a LoginPatterns,
    ) -> Self {
        Self { browser, config, credentials, patterns }
    }

    pub async fn run(&self) -> Result<()> {
        let cfg = self.config;
        let selectors = &cfg.selectors;
        let timeouts = &cfg.timeouts;

        if !self.browser.current_url().contains(&cfg.site.start_url) {
            self.browser
                .navigate(&cfg.site.start_url, timeouts.page_load())
                .await
                .map_err(|e| AppError::step(format!("landing page ({})", e)))?;
            sleep(cfg.delays.login_landing_settle()).await;
        }
        if self.browser.find(&selectors.page_ready, timeouts.element_search()).await.is_none() {
            return Err(AppError::step("landing page"));
        }
        info!("Landing page ready for login");

        dismiss_consent(self.browser, cfg).await;

        SelectorChain::new("login button", &selectors.login_buttons)
            .click(self.browser, timeouts.element_search())
            .await?
            .ok_or_else(|| AppError::step("login button"))?;

        SelectorChain::new("identity field", &selectors.identity_fields)
            .fill(self.browser, &self.credentials.email, timeouts.element_search())
            .await?
            .ok_or_else(|| AppError::step("identity field"))?;

        SelectorChain::new("continue button", &selectors.continue_buttons)
            .click(self.browser, timeouts.element_search())
            .await?
            .ok_or_else(|| AppError::step("continue button"))?;

        self.wait_for_password_step().await;

        SelectorChain::new("password field", &selectors.password_fields)
            .fill(self.browser, &self.credentials.password, timeouts.element_search())
            .await?
            .ok_or_else(|| AppError::step("password field"))?;
        info!("Password entered");

        SelectorChain::new("submit button", &selectors.submit_buttons)
            .click(self.browser, timeouts.submit_search())
            .await?
            .ok_or_else(|| AppError::step("submit button"))?;

        let domain = cfg.site.shop_domain.as_str();
        if !self.wait_for_url(|url| url.contains(domain), timeouts.page_load()).await {
            return Err(AppError::step(format!("redirect to {}", domain)));
        }
        info!(domain, "Redirected back to shop");
        sleep(cfg.delays.post_login_settle()).await;

        self.verify_success().await
    }

    /// Either the URL moves to the identity provider or the password field
    /// shows up. Neither is required.
    async fn wait_for_password_step(&self) {
        let timeouts = &self.config.timeouts;
        let transition = &self.patterns.transition;
        if self.wait_for_url(|url| transition.is_match(url), timeouts.login_transition()).await {
            info!("Password step detected by URL");
        } else if self
            .browser
            .find(&self.config.selectors.password_appear, timeouts.password_appear())
            .await
            .is_some()
        {
            info!("Password step detected by field");
        } else {
            warn!("No clear password step transition, continuing");
        }
    }

    async fn wait_for_url<F>(&self, predicate: F, timeout: Duration) -> bool
    where
        F: Fn(&str) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if predicate(&self.browser.current_url()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(self.config.delays.poll_interval()).await;
        }
    }

    async fn verify_success(&self) -> Result<()> {
        let markers = SelectorChain::new("login success", &self.config.selectors.login_success_markers);
        if let Some(found) = markers.find(self.browser, self.config.timeouts.element_search()).await {
            info!(marker = %found.locator, "Login confirmed by marker");
            return Ok(());
        }
        let url = self.browser.current_url();
        if self.patterns.success.is_match(&url) {
            info!(%url, "Login confirmed by URL");
            return Ok(());
        }
        Err(AppError::step("login verification"))
    }
}
