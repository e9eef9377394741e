use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::browser::Locator;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub site: SiteConfig,
    pub timeouts: TimeoutsConfig,
    pub retry: RetryConfig,
    pub delays: DelaysConfig,
    pub selectors: SelectorsConfig,
    pub input: InputConfig,
    pub reconcile: ReconcileConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub input_file: PathBuf,
    pub credentials_file: PathBuf,
    pub proxy_file: PathBuf,
    pub profile_dir: PathBuf,
    pub cookie_file: PathBuf,
    pub batch_dir: PathBuf,
    pub batch_prefix: String,
    pub master_file: PathBuf,
    pub archive_dir: PathBuf,
    pub log_dir: PathBuf,
    pub lock_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub start_url: String,
    /// Detail page template, `{identifier}` is substituted.
    pub item_url_template: String,
    pub shop_domain: String,
    pub proxy_test_url: String,
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub user_agent: Option<String>,
    /// Text the session marker carries only while logged in.
    pub session_marker_text: String,
    pub login_transition_url_pattern: String,
    pub login_success_url_pattern: String,
    pub proxy_error_signatures: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub page_load_ms: u64,
    pub element_search_ms: u64,
    pub field_search_quick_ms: u64,
    pub proxy_test_ms: u64,
    pub session_check_ms: u64,
    pub consent_ms: u64,
    pub login_transition_ms: u64,
    pub password_appear_ms: u64,
    pub submit_search_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub primary_attempts: u32,
    pub item_attempts: u32,
    pub retry_delay_ms: u64,
    pub item_cooldown_ms: u64,
    pub login_attempts: u32,
    pub login_backoff_ms: u64,
    pub launch_attempts: u32,
    pub launch_retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelaysConfig {
    pub landing_settle_ms: u64,
    pub login_landing_settle_ms: u64,
    pub context_release_ms: u64,
    pub profile_release_ms: u64,
    pub post_login_settle_ms: u64,
    pub page_settle_ms: u64,
    pub fallback_settle_ms: u64,
    pub consent_settle_ms: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorsConfig {
    pub session_marker: Locator,
    pub page_ready: Locator,
    pub consent_host: String,
    pub consent_button: String,
    pub login_buttons: Vec<Locator>,
    pub identity_fields: Vec<Locator>,
    pub continue_buttons: Vec<Locator>,
    pub password_appear: Locator,
    pub password_fields: Vec<Locator>,
    pub submit_buttons: Vec<Locator>,
    pub login_success_markers: Vec<Locator>,
    pub primary: PrimarySelectors,
    pub fallback: FallbackSelectors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimarySelectors {
    pub identifier: Locator,
    pub availability: Locator,
    pub gross_price: Locator,
    pub net_price: Locator,
    pub sale_note: Locator,
}

/// The table layout has no sale note of its own; the primary location is reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackSelectors {
    pub identifier: Locator,
    pub availability: Locator,
    pub gross_price: Locator,
    pub net_price: Locator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub header_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub key_column: String,
    pub timestamp_column: String,
    pub source_file_column: String,
    pub uppercase_columns: Vec<String>,
    pub key_aliases: Vec<String>,
    pub master_archive_prefix: String,
    pub batch_archive_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub default_directive: String,
    pub archive_previous: bool,
}

fn locators(list: &[&str]) -> Vec<Locator> {
    list.iter().map(|s| Locator::parse(s)).collect()
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_file: PathBuf::from("data/Input/worklist.csv"),
            credentials_file: PathBuf::from("data/Input/credentials.txt"),
            proxy_file: PathBuf::from("data/Proxy/proxies.txt"),
            profile_dir: PathBuf::from("data/user-data-dir"),
            cookie_file: PathBuf::from("data/cookie/cookies.json"),
            batch_dir: PathBuf::from("data/PD_Data"),
            batch_prefix: "shop_PD_".to_string(),
            master_file: PathBuf::from("data/BD/shop_BD.csv"),
            archive_dir: PathBuf::from("data/Archiv"),
            log_dir: PathBuf::from("data/Log"),
            lock_dir: PathBuf::from("data"),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            start_url: "https://shop.viessmann.com/de/de/home".to_string(),
            item_url_template: "https://shop.viessmann.com/details/{identifier}?origins=O,M,E&searchTerm={identifier}&page=0&selectedDetailsTab=description".to_string(),
            shop_domain: "shop.viessmann.com".to_string(),
            proxy_test_url: "https://httpbin.org/ip".to_string(),
            headless: true,
            chrome_path: None,
            user_agent: None,
            session_marker_text: "Neuer Warenkorb".to_string(),
            login_transition_url_pattern: r"(?i)iam\.viessmann\.com|login|auth".to_string(),
            login_success_url_pattern: r"(?i)account|dashboard|profile".to_string(),
            proxy_error_signatures: vec![
                "net::ERR_PROXY_CONNECTION_FAILED".to_string(),
                "net::ERR_TUNNEL_CONNECTION_FAILED".to_string(),
                "net::ERR_NAME_NOT_RESOLVED".to_string(),
                "Unable to connect to the proxy server".to_string(),
            ],
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            page_load_ms: 35_000,
            element_search_ms: 10_000,
            field_search_quick_ms: 3_000,
            proxy_test_ms: 10_000,
            session_check_ms: 8_000,
            consent_ms: 7_000,
            login_transition_ms: 30_000,
            password_appear_ms: 10_000,
            submit_search_ms: 5_000,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            primary_attempts: 3,
            item_attempts: 3,
            retry_delay_ms: 5_000,
            item_cooldown_ms: 300_000,
            login_attempts: 3,
            login_backoff_ms: 300_000,
            launch_attempts: 3,
            launch_retry_delay_ms: 5_000,
        }
    }
}

impl Default for DelaysConfig {
    fn default() -> Self {
        Self {
            landing_settle_ms: 3_000,
            login_landing_settle_ms: 5_000,
            context_release_ms: 2_000,
            profile_release_ms: 3_000,
            post_login_settle_ms: 3_000,
            page_settle_ms: 500,
            fallback_settle_ms: 1_000,
            consent_settle_ms: 1_000,
            poll_interval_ms: 250,
        }
    }
}

impl Default for SelectorsConfig {
    fn default() -> Self {
        Self {
            session_marker: Locator::css("div.cart-navigation-price-and-commission"),
            page_ready: Locator::css("body"),
            consent_host: "#usercentrics-root".to_string(),
            consent_button: r#"button[data-testid="uc-accept-all-button"]"#.to_string(),
            login_buttons: locators(&[
                "button[data-testid='login-button']",
                "button.login-button",
                "a[href*='login']",
                "a[href*='Login']",
                "button[aria-label*='Login']",
                "a[href*='account/login']",
                "a[href*='my-account']",
            ]),
            identity_fields: locators(&[
                "input[name='isiwebuserid']",
                "input[type='text'][name*='user']",
                "input[class*='mdc-text-field__input']",
                "input[type='email']",
                "input[name*='email']",
                "input[name*='user']",
                "input[placeholder*='email']",
                "input[placeholder*='Email']",
            ]),
            continue_buttons: locators(&[
                "//button[contains(., 'Weiter')]",
                "//button[contains(., 'Continue')]",
                "//button[contains(., 'Next')]",
                "//input[@type='submit']",
                "//button[@type='submit']",
            ]),
            password_appear: Locator::css("input[type='password']"),
            password_fields: locators(&[
                "input#isiwebpasswd",
                "input[name='isiwebpasswd']",
                "input[type='password']",
                "input[name*='password']",
                "input[name*='pass']",
            ]),
            submit_buttons: locators(&[
                "button#submitButton:not([disabled])",
                "button[type='submit']:not([disabled])",
                "input[type='submit']",
                "//button[contains(text(), 'Login')]",
                "//button[contains(text(), 'Anmelden')]",
                "//button[contains(text(), 'Sign In')]",
            ]),
            login_success_markers: locators(&[
                "div.user-menu",
                "a.account-link",
                "span.user-name",
                "div[class*='user']",
                "div[class*='account']",
                "div[class*='logged-in']",
                "a[href*='logout']",
                "button[data-testid*='logout']",
                "div[class*='welcome']",
                "span[class*='user']",
            ]),
            primary: PrimarySelectors {
                identifier: Locator::css(
                    r#"app-info[data-cy="product_detail.info_bar.material_number"] div.grey-blue-font"#,
                ),
                availability: Locator::css(
                    r#"app-info[data-cy="product_detail.info_bar.status"] div.availability-text > div"#,
                ),
                gross_price: Locator::css("span[data-cy='product_detail.info_bar.gross_price']"),
                net_price: Locator::css("span[data-cy='product_detail.info_bar.net_price'] b"),
                sale_note: Locator::css(
                    r#"app-info[data-cy="product_detail.info_bar.sale_note"] div.grey-blue-font > div"#,
                ),
            },
            fallback: FallbackSelectors {
                identifier: Locator::css(
                    r#"table#product-table tbody tr:first-child td[data-cy="product_overview.product_table.material_number_row_data"] app-copy-to-clipboard div"#,
                ),
                availability: Locator::css(
                    r#"table#product-table tbody tr:first-child td[data-cy="product_overview.product_table.availability_row_data"] app-availability div.availability-text div"#,
                ),
                gross_price: Locator::css(
                    r#"table#product-table tbody tr:first-child td p[data-cy="product_overview.product_table.price_row_data.gross_price"]"#,
                ),
                net_price: Locator::css(
                    r#"table#product-table tbody tr:first-child td p[data-cy="product_overview.product_table.price_row_data.net_price"]"#,
                ),
            },
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            header_markers: vec![
                "artikelnummer".to_string(),
                "art.-nr".to_string(),
                "identifier".to_string(),
            ],
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            key_column: "Identifier".to_string(),
            timestamp_column: "Timestamp".to_string(),
            source_file_column: "Source_File".to_string(),
            uppercase_columns: vec!["Material_No".to_string()],
            key_aliases: vec![
                "Artikelnummer".to_string(),
                "Artikel-Nr".to_string(),
                "ArtNr".to_string(),
                "Artikel_Nr".to_string(),
            ],
            master_archive_prefix: "archiv_shop_BD".to_string(),
            batch_archive_prefix: "Archiv".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_directive: "catalog_sync=info".to_string(),
            archive_previous: true,
        }
    }
}

impl PathsConfig {
    /// Glob matching every incremental batch file.
    pub fn batch_pattern(&self) -> String {
        self.batch_dir
            .join(format!("{}*.csv", self.batch_prefix))
            .to_string_lossy()
            .into_owned()
    }
}

impl SiteConfig {
    pub fn item_url(&self, identifier: &str) -> String {
        self.item_url_template.replace("{identifier}", identifier)
    }
}

impl TimeoutsConfig {
    pub fn page_load(&self) -> Duration { ms(self.page_load_ms) }
    pub fn element_search(&self) -> Duration { ms(self.element_search_ms) }
    pub fn field_search_quick(&self) -> Duration { ms(self.field_search_quick_ms) }
    pub fn proxy_test(&self) -> Duration { ms(self.proxy_test_ms) }
    pub fn session_check(&self) -> Duration { ms(self.session_check_ms) }
    pub fn consent(&self) -> Duration { ms(self.consent_ms) }
    pub fn login_transition(&self) -> Duration { ms(self.login_transition_ms) }
    pub fn password_appear(&self) -> Duration { ms(self.password_appear_ms) }
    pub fn submit_search(&self) -> Duration { ms(self.submit_search_ms) }
}

impl RetryConfig {
    pub fn retry_delay(&self) -> Duration { ms(self.retry_delay_ms) }
    pub fn item_cooldown(&self) -> Duration { ms(self.item_cooldown_ms) }
    pub fn login_backoff(&self) -> Duration { ms(self.login_backoff_ms) }
    pub fn launch_retry_delay(&self) -> Duration { ms(self.launch_retry_delay_ms) }
}

impl DelaysConfig {
    pub fn landing_settle(&self) -> Duration { ms(self.landing_settle_ms) }
    pub fn login_landing_settle(&self) -> Duration { ms(self.login_landing_settle_ms) }
    pub fn context_release(&self) -> Duration { ms(self.context_release_ms) }
    pub fn profile_release(&self) -> Duration { ms(self.profile_release_ms) }
    pub fn post_login_settle(&self) -> Duration { ms(self.post_login_settle_ms) }
    pub fn page_settle(&self) -> Duration { ms(self.page_settle_ms) }
    pub fn fallback_settle(&self) -> Duration { ms(self.fallback_settle_ms) }
    pub fn consent_settle(&self) -> Duration { ms(self.consent_settle_ms) }
    pub fn poll_interval(&self) -> Duration { ms(self.poll_interval_ms.max(1)) }
}

impl AppConfig {
    /// Compiled defaults, then `config/*.toml`, then an explicit file, then
    /// `CATALOG_SYNC__SECTION__KEY` environment variables.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path.to_path_buf()));
        }

        let s = builder
            .add_source(Environment::with_prefix("CATALOG_SYNC").separator("__").try_parsing(true))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        if config.site.chrome_path.is_none() {
            config.site.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("site.start_url", &self.site.start_url),
            ("site.item_url_template", &self.site.item_url_template),
            ("site.proxy_test_url", &self.site.proxy_test_url),
        ] {
            if !Self::is_http_url(value) {
                return Err(ConfigError::Message(format!("Invalid URL in {}: '{}'", name, value)));
            }
        }

        if !self.site.item_url_template.contains("{identifier}") {
            return Err(ConfigError::Message(
                "site.item_url_template must contain the {identifier} placeholder".into(),
            ));
        }

        if self.site.shop_domain.trim().is_empty() {
            return Err(ConfigError::Message("site.shop_domain must not be empty".into()));
        }

        for (name, pattern) in [
            ("site.login_transition_url_pattern", &self.site.login_transition_url_pattern),
            ("site.login_success_url_pattern", &self.site.login_success_url_pattern),
        ] {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(ConfigError::Message(format!("Invalid pattern in {}: {}", name, e)));
            }
        }

        if self.retry.primary_attempts == 0
            || self.retry.item_attempts == 0
            || self.retry.login_attempts == 0
            || self.retry.launch_attempts == 0
        {
            return Err(ConfigError::Message("Retry attempt counts must be greater than 0".into()));
        }

        let chains = [
            ("selectors.login_buttons", self.selectors.login_buttons.len()),
            ("selectors.identity_fields", self.selectors.identity_fields.len()),
            ("selectors.continue_buttons", self.selectors.continue_buttons.len()),
            ("selectors.password_fields", self.selectors.password_fields.len()),
            ("selectors.submit_buttons", self.selectors.submit_buttons.len()),
        ];
        for (name, len) in chains {
            if len == 0 {
                return Err(ConfigError::Message(format!("{} must list at least one selector", name)));
            }
        }

        if self.reconcile.key_column.trim().is_empty() || self.reconcile.timestamp_column.trim().is_empty() {
            return Err(ConfigError::Message("Reconcile key and timestamp columns must be named".into()));
        }

        if self.paths.batch_prefix.is_empty() {
            return Err(ConfigError::Message("paths.batch_prefix must not be empty".into()));
        }

        Ok(())
    }

    fn is_http_url(value: &str) -> bool {
        // The template placeholder is not a valid URL character sequence on its own.
        let probe = value.replace("{identifier}", "x");
        match Url::parse(&probe) {
            Ok(url) => matches!(url.scheme(), "http" | "https"),
            Err(_) => false,
        }
    }
}
