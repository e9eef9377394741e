use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::browser::{Browser, LoadError, Locator};
use crate::config::AppConfig;
use crate::element_finder::dismiss_consent;
use crate::models::{
    or_sentinel, ExtractionResult, ExtractionSource, ExtractionStatus, ItemQuery, LoadFailure,
};
use crate::session::SessionManager;
use crate::utils::error::AppError;
use crate::Result;

/// First whitespace-separated token of an identifier cell.
fn first_token(text: &str) -> Option<String> {
    text.split_whitespace().next().map(str::to_string)
}

fn load_failure(error: &LoadError) -> LoadFailure {
    match error {
        LoadError::Timeout(_) => LoadFailure::Timeout,
        LoadError::Navigation(_) => LoadFailure::Navigation,
    }
}

/// Reads one item page per identifier: the primary layout with retries,
/// then the table layout once.
pub struct ExtractionEngine {
    config: Arc<AppConfig>,
}

impl ExtractionEngine {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }

    /// Every page-level outcome is folded into the returned result. `Err` is
    /// reserved for session failures and proxy breakage, which the caller
    /// retries or treats as fatal.
    pub async fn extract(&self, session: &mut SessionManager, item: &ItemQuery) -> Result<ExtractionResult> {
        session.check_session().await?;
        let session: &SessionManager = session;
        let browser = session.browser()?;

        let identifier = item.as_str();
        let url = self.config.site.item_url(identifier);
        let attempts = self.config.retry.primary_attempts;
        let mut result = ExtractionResult::pending(identifier);

        for attempt in 1..=attempts {
            info!(identifier, attempt, attempts, "Opening item page");
            if let Err(e) = browser.navigate(&url, self.config.timeouts.page_load()).await {
                self.save_screenshot(browser, &e, identifier).await;
                if e.is_proxy_failure(&self.config.site.proxy_error_signatures) {
                    error!(identifier, proxy = %session.proxy_label(), error = %e, "Proxy connection failed, stopping run");
                    return Err(AppError::ProxyConnection {
                        proxy: session.proxy_label(),
                        message: e.message().to_string(),
                    });
                }
                warn!(identifier, attempt, error = %e, "Item page did not load");
                if attempt == attempts {
                    result.status = ExtractionStatus::LoadFailed { cause: load_failure(&e), attempts: attempt };
                    self.log_outcome(&result);
                    return Ok(result);
                }
                sleep(self.config.retry.retry_delay()).await;
                continue;
            }

            dismiss_consent(browser, &self.config).await;
            sleep(self.config.delays.page_settle()).await;

            if self.read_primary(browser, attempt, &mut result).await {
                self.log_outcome(&result);
                return Ok(result);
            }
            warn!(identifier, attempt, "Identifier field missing or empty");
            if attempt < attempts {
                sleep(self.config.retry.retry_delay()).await;
            }
        }

        result.source = ExtractionSource::PrimaryExhausted;
        warn!(identifier, "Primary layout exhausted, trying table layout");
        self.read_fallback(browser, session, &url, &mut result).await?;
        self.log_outcome(&result);
        Ok(result)
    }

    async fn read_primary(&self, browser: &dyn Browser, attempt: u32, result: &mut ExtractionResult) -> bool {
        let selectors = &self.config.selectors.primary;
        let Some(code) = browser
            .find(&selectors.identifier, self.config.timeouts.element_search())
            .await
            .and_then(|element| first_token(&element.text))
        else {
            return false;
        };

        debug!(material_code = %code, "Primary identifier found");
        result.material_code = code;
        result.availability = self.read_field(browser, &selectors.availability).await;
        result.gross_price = self.read_field(browser, &selectors.gross_price).await;
        result.net_price = self.read_field(browser, &selectors.net_price).await;
        result.sale_note = self.read_field(browser, &selectors.sale_note).await;
        result.source = ExtractionSource::Primary { attempt };
        result.status = ExtractionStatus::SuccessPrimary { attempt };
        true
    }

    async fn read_fallback(
        &self,
        browser: &dyn Browser,
        session: &SessionManager,
        url: &str,
        result: &mut ExtractionResult,
    ) -> Result<()> {
        if let Err(e) = browser.navigate(url, self.config.timeouts.page_load()).await {
            self.save_screenshot(browser, &e, &result.identifier).await;
            if e.is_proxy_failure(&self.config.site.proxy_error_signatures) {
                error!(identifier = %result.identifier, error = %e, "Proxy connection failed, stopping run");
                return Err(AppError::ProxyConnection {
                    proxy: session.proxy_label(),
                    message: e.message().to_string(),
                });
            }
            error!(identifier = %result.identifier, error = %e, "Table layout page did not load");
            result.source = ExtractionSource::FallbackError;
            result.status = ExtractionStatus::FallbackError;
            return Ok(());
        }

        dismiss_consent(browser, &self.config).await;
        sleep(self.config.delays.fallback_settle()).await;

        let selectors = &self.config.selectors.fallback;
        let code = browser
            .find(&selectors.identifier, self.config.timeouts.element_search())
            .await
            .and_then(|element| first_token(&element.text));

        match code {
            Some(code) => {
                result.material_code = code;
                result.availability = self.read_field(browser, &selectors.availability).await;
                result.gross_price = self.read_field(browser, &selectors.gross_price).await;
                result.net_price = self.read_field(browser, &selectors.net_price).await;
                // Shared between both layouts.
                result.sale_note = self.read_field(browser, &self.config.selectors.primary.sale_note).await;
                result.source = ExtractionSource::Fallback;
                result.status = ExtractionStatus::SuccessFallback;
            }
            None => {
                warn!(identifier = %result.identifier, "Table layout identifier missing as well");
                result.source = ExtractionSource::BothFailed;
                result.status = ExtractionStatus::NotFound;
            }
        }
        Ok(())
    }

    async fn read_field(&self, browser: &dyn Browser, locator: &Locator) -> String {
        match browser.find(locator, self.config.timeouts.field_search_quick()).await {
            Some(element) => or_sentinel(&element.text),
            None => or_sentinel(""),
        }
    }

    fn screenshot_path(&self, kind: &str, identifier: &str) -> PathBuf {
        let safe: String = identifier
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.config.paths.log_dir.join(format!(
            "error_{}_{}_{}.png",
            kind,
            safe,
            Local::now().format("%Y%m%d_%H%M%S")
        ))
    }

    async fn save_screenshot(&self, browser: &dyn Browser, error: &LoadError, identifier: &str) {
        let kind = if error.is_proxy_failure(&self.config.site.proxy_error_signatures) {
            "proxy"
        } else {
            error.kind_label()
        };
        let path = self.screenshot_path(kind, identifier);
        match browser.screenshot(&path).await {
            Ok(()) => info!(path = %path.display(), "Screenshot saved"),
            Err(e) => debug!(error = %e, "Screenshot failed"),
        }
    }

    fn log_outcome(&self, result: &ExtractionResult) {
        if result.status.is_success() {
            info!(
                identifier = %result.identifier,
                source = %result.source,
                status = %result.status,
                material_code = %result.material_code,
                "Item extracted"
            );
        } else {
            warn!(
                identifier = %result.identifier,
                source = %result.source,
                status = %result.status,
                "Item not extracted"
            );
        }
    }
}
