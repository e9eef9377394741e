// Integration tests for catalog-sync
// The browser is replaced by a scripted in-memory shop so the session,
// extraction and run loops can be driven end to end.

pub mod extraction_tests;
pub mod session_tests;

use async_trait::async_trait;
use catalog_sync::browser::{Browser, BrowserLauncher, FoundElement, LoadError, Locator, StoredCookie};
use catalog_sync::config::AppConfig;
use catalog_sync::credentials::Credentials;
use catalog_sync::models::ProxyCandidate;
use catalog_sync::proxy::ProxyProbe;
use catalog_sync::session::SessionManager;
use catalog_sync::{AppError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const START_URL: &str = "https://shop.test/home";
pub const LOGIN_URL: &str = "https://iam.example.test/login";
pub const MARKER_TEXT: &str = "Neuer Warenkorb";

/// One item detail page. The primary identifier only renders from visit
/// `primary_from_visit` on.
#[derive(Debug, Clone, Default)]
pub struct ItemPage {
    pub elements: HashMap<String, String>,
    pub primary_from_visit: u32,
}

impl ItemPage {
    pub fn primary(code: &str, gross: &str) -> Self {
        Self::default()
            .with("#p-id", &format!("{} (Ersatzteil)", code))
            .with("#p-avail", "Lieferbar")
            .with("#p-gross", gross)
            .with("#p-net", "  ")
    }

    pub fn table(code: &str, gross: &str) -> Self {
        Self::default()
            .with("#f-id", code)
            .with("#f-avail", "2-3 Tage")
            .with("#f-gross", gross)
            .with("#f-net", "9,99 €")
    }

    pub fn with(mut self, query: &str, text: &str) -> Self {
        self.elements.insert(query.to_string(), text.to_string());
        self
    }
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub url: String,
    pub logged_in: bool,
    pub login_works: bool,
    /// Marker probes answered as logged in before the session expires.
    pub probes_before_expiry: Option<u32>,
    pub launches: u32,
    /// Launch number from which launching fails.
    pub fail_launches_from: Option<u32>,
    pub proxies_used: Vec<Option<String>>,
    pub items: HashMap<String, ItemPage>,
    pub visits: HashMap<String, u32>,
    /// URL fragment, error, remaining count.
    pub nav_failures: Vec<(String, LoadError, u32)>,
    /// Exact URL, visit number that fails, error.
    pub fail_on_visit: Vec<(String, u32, LoadError)>,
    pub filled: Vec<(String, String)>,
    pub restored_cookies: Vec<String>,
    pub screenshots: Vec<PathBuf>,
    pub closed: u32,
}

impl FakeState {
    fn on_shop(&self) -> bool {
        self.url.contains("shop.test")
    }

    fn on_login(&self) -> bool {
        self.url == LOGIN_URL
    }

    fn current_item(&self) -> Option<(&ItemPage, u32)> {
        let id = self.url.strip_prefix("https://shop.test/details/")?;
        let page = self.items.get(id)?;
        Some((page, self.visits.get(&self.url).copied().unwrap_or(0)))
    }

    fn lookup(&mut self, query: &str) -> Option<String> {
        if self.url.is_empty() || self.url == "data:," {
            return None;
        }
        match query {
            "body" => Some(String::new()),
            "#cart" if self.on_shop() => {
                if let Some(left) = self.probes_before_expiry.as_mut() {
                    if *left == 0 {
                        self.logged_in = false;
                    } else {
                        *left -= 1;
                    }
                }
                Some(if self.logged_in { format!("{} 0,00 €", MARKER_TEXT) } else { "Anmelden".to_string() })
            }
            "#logout" if self.on_shop() && self.logged_in => Some("Abmelden".to_string()),
            "#login" if self.on_shop() && !self.logged_in => Some("Login".to_string()),
            "#email" | "#next" | "#password" | "#submit" if self.on_login() => Some(String::new()),
            _ => {
                let (page, visits) = self.current_item()?;
                if query == "#p-id" && visits < page.primary_from_visit {
                    return None;
                }
                page.elements.get(query).cloned()
            }
        }
    }
}

pub type Shared = Arc<Mutex<FakeState>>;

pub struct FakeBrowser {
    state: Shared,
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn navigate(&self, url: &str, _timeout: Duration) -> std::result::Result<(), LoadError> {
        let mut state = self.state.lock().unwrap();
        if url != "data:," {
            if let Some(entry) = state.nav_failures.iter_mut().find(|(frag, _, left)| *left > 0 && url.contains(frag.as_str())) {
                entry.2 -= 1;
                return Err(entry.1.clone());
            }
            let next = state.visits.get(url).copied().unwrap_or(0) + 1;
            if let Some((_, _, error)) = state.fail_on_visit.iter().find(|(u, n, _)| u == url && *n == next) {
                let error = error.clone();
                *state.visits.entry(url.to_string()).or_default() += 1;
                return Err(error);
            }
            *state.visits.entry(url.to_string()).or_default() += 1;
        }
        state.url = url.to_string();
        Ok(())
    }

    async fn find(&self, locator: &Locator, _timeout: Duration) -> Option<FoundElement> {
        self.state.lock().unwrap().lookup(&locator.query).map(FoundElement::new)
    }

    async fn click(&self, locator: &Locator, _timeout: Duration) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.lookup(&locator.query).is_none() {
            return Ok(false);
        }
        match locator.query.as_str() {
            "#login" => state.url = LOGIN_URL.to_string(),
            "#submit" if state.login_works => {
                state.logged_in = true;
                state.url = START_URL.to_string();
            }
            _ => {}
        }
        Ok(true)
    }

    async fn fill(&self, locator: &Locator, value: &str, _timeout: Duration) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.lookup(&locator.query).is_none() {
            return Ok(false);
        }
        state.filled.push((locator.query.clone(), value.to_string()));
        Ok(true)
    }

    async fn execute_script(&self, _body: &str, _args: Vec<serde_json::Value>) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Bool(false))
    }

    fn current_url(&self) -> String {
        self.state.lock().unwrap().url.clone()
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>> {
        let state = self.state.lock().unwrap();
        let mut cookies = Vec::new();
        if state.logged_in {
            cookies.push(StoredCookie {
                name: "session".to_string(),
                value: "abc".to_string(),
                domain: Some("shop.test".to_string()),
                path: Some("/".to_string()),
                expires: None,
                secure: Some(true),
                http_only: Some(true),
            });
        }
        Ok(cookies)
    }

    async fn add_cookie(&self, cookie: &StoredCookie) -> Result<()> {
        self.state.lock().unwrap().restored_cookies.push(cookie.name.clone());
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.state.lock().unwrap().screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().closed += 1;
        Ok(())
    }
}

pub struct FakeLauncher {
    pub state: Shared,
    pub profile_dir: PathBuf,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, proxy: Option<&ProxyCandidate>) -> Result<Box<dyn Browser>> {
        {
            let mut state = self.state.lock().unwrap();
            state.launches += 1;
            state.proxies_used.push(proxy.map(|p| p.address.clone()));
            if state.fail_launches_from.is_some_and(|from| state.launches >= from) {
                return Err(AppError::Browser("chrome did not start".to_string()));
            }
            state.url = String::new();
        }
        std::fs::create_dir_all(&self.profile_dir)?;
        Ok(Box::new(FakeBrowser { state: self.state.clone() }))
    }
}

pub struct AlwaysAlive;

#[async_trait]
impl ProxyProbe for AlwaysAlive {
    async fn probe(&self, _candidate: &ProxyCandidate) -> bool {
        true
    }
}

pub struct NeverAlive;

#[async_trait]
impl ProxyProbe for NeverAlive {
    async fn probe(&self, _candidate: &ProxyCandidate) -> bool {
        false
    }
}

fn css(query: &str) -> Locator {
    Locator::css(query)
}

/// Fast configuration rooted in `dir`, pointed at the fake shop.
pub fn test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();

    let paths = &mut config.paths;
    paths.input_file = dir.join("Input/worklist.csv");
    paths.credentials_file = dir.join("Input/credentials.txt");
    paths.proxy_file = dir.join("Proxy/proxies.txt");
    paths.profile_dir = dir.join("user-data-dir");
    paths.cookie_file = dir.join("cookie/cookies.json");
    paths.batch_dir = dir.join("PD_Data");
    paths.master_file = dir.join("BD/shop_BD.csv");
    paths.archive_dir = dir.join("Archiv");
    paths.log_dir = dir.join("Log");
    paths.lock_dir = dir.to_path_buf();

    let site = &mut config.site;
    site.start_url = START_URL.to_string();
    site.item_url_template = "https://shop.test/details/{identifier}".to_string();
    site.shop_domain = "shop.test".to_string();
    site.session_marker_text = MARKER_TEXT.to_string();
    site.login_transition_url_pattern = "login".to_string();
    site.login_success_url_pattern = "account".to_string();

    let t = &mut config.timeouts;
    t.page_load_ms = 30;
    t.element_search_ms = 5;
    t.field_search_quick_ms = 5;
    t.session_check_ms = 5;
    t.consent_ms = 1;
    t.login_transition_ms = 10;
    t.password_appear_ms = 5;
    t.submit_search_ms = 5;

    let r = &mut config.retry;
    r.retry_delay_ms = 0;
    r.item_cooldown_ms = 0;
    r.login_backoff_ms = 0;
    r.launch_retry_delay_ms = 0;

    let d = &mut config.delays;
    d.landing_settle_ms = 0;
    d.login_landing_settle_ms = 0;
    d.context_release_ms = 0;
    d.profile_release_ms = 0;
    d.post_login_settle_ms = 0;
    d.page_settle_ms = 0;
    d.fallback_settle_ms = 0;
    d.consent_settle_ms = 0;
    d.poll_interval_ms = 1;

    let s = &mut config.selectors;
    s.session_marker = css("#cart");
    s.page_ready = css("body");
    s.consent_host = "#consent".to_string();
    s.login_buttons = vec![css("#login-legacy"), css("#login")];
    s.identity_fields = vec![css("#email")];
    s.continue_buttons = vec![css("#next")];
    s.password_appear = css("#password");
    s.password_fields = vec![css("#password")];
    s.submit_buttons = vec![css("#submit")];
    s.login_success_markers = vec![css("#logout")];
    s.primary.identifier = css("#p-id");
    s.primary.availability = css("#p-avail");
    s.primary.gross_price = css("#p-gross");
    s.primary.net_price = css("#p-net");
    s.primary.sale_note = css("#p-sale");
    s.fallback.identifier = css("#f-id");
    s.fallback.availability = css("#f-avail");
    s.fallback.gross_price = css("#f-gross");
    s.fallback.net_price = css("#f-net");

    config
}

pub struct Harness {
    pub dir: TempDir,
    pub config: Arc<AppConfig>,
    pub state: Shared,
}

impl Harness {
    pub fn new(setup: impl FnOnce(&mut FakeState)) -> Self {
        Self::with_config(setup, |_| {})
    }

    pub fn with_config(setup: impl FnOnce(&mut FakeState), tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(dir.path());
        tweak(&mut config);
        let mut state = FakeState { login_works: true, ..Default::default() };
        setup(&mut state);
        Self { dir, config: Arc::new(config), state: Arc::new(Mutex::new(state)) }
    }

    pub fn launcher(&self) -> Arc<dyn BrowserLauncher> {
        Arc::new(FakeLauncher { state: self.state.clone(), profile_dir: self.config.paths.profile_dir.clone() })
    }

    pub fn credentials() -> Credentials {
        Credentials { email: "einkauf@example.test".to_string(), password: "geheim".to_string() }
    }

    pub fn session(&self) -> SessionManager {
        SessionManager::new(self.config.clone(), self.launcher(), Self::credentials(), None).unwrap()
    }

    pub async fn started_session(&self) -> SessionManager {
        let mut session = self.session();
        session.start().await.unwrap();
        session
    }

    pub fn write_credentials(&self) {
        let path = &self.config.paths.credentials_file;
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "email=einkauf@example.test\npassword=\"geheim\"\n").unwrap();
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}
