//! Browser session management for feed capture and login.
//!
//! Uses chromiumoxide (CDP). Stealth patches and the saved session are
//! registered before the first navigation so the site sees a logged-in,
//! ordinary-looking Chrome from its very first request.

mod config;
#[cfg(feature = "browser")]
mod page;
pub mod session;
mod stealth;

pub use config::{BrowserEngineConfig, BrowserEngineType, DEFAULT_USER_AGENT};
#[cfg(feature = "browser")]
pub use page::ChromeFeedPage;
pub use session::{SessionCookie, SessionError, SessionState};
pub use stealth::stealth_init_script;

#[cfg(feature = "browser")]
use std::time::Duration;

#[cfg(feature = "browser")]
use anyhow::Context;
use anyhow::Result;
#[cfg(feature = "browser")]
use tokio::task::JoinHandle;
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, CookieSameSite, SetCookiesParams, SetUserAgentOverrideParams, TimeSinceEpoch,
};
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;

/// Login page used by [`BrowserSession::login`].
pub const LOGIN_URL: &str = "https://www.instagram.com/accounts/login/";

/// Account credentials for the login flow.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A launched (or connected) browser.
#[cfg(feature = "browser")]
pub struct BrowserSession {
    config: BrowserEngineConfig,
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
}

#[cfg(feature = "browser")]
impl BrowserSession {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        // Common install locations
        "/opt/google/chrome/google-chrome",
    ];

    /// Create a new browser session. Nothing is launched until first use.
    pub fn new(config: BrowserEngineConfig) -> Self {
        Self {
            config,
            browser: None,
            handler: None,
        }
    }

    /// Find Chrome executable.
    fn find_chrome() -> Result<std::path::PathBuf> {
        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in [
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(path) = which::which(cmd) {
                info!("Found Chrome in PATH: {}", path.display());
                return Ok(path);
            }
        }

        Err(anyhow::anyhow!(
            "Chrome/Chromium not found. Please install it:\n\
             - Arch/Manjaro: sudo pacman -S chromium\n\
             - Ubuntu/Debian: sudo apt install chromium-browser\n\
             - Fedora: sudo dnf install chromium\n\
             - Or download from: https://www.google.com/chrome/"
        ))
    }

    /// Launch or connect to browser if not already running.
    pub async fn ensure_browser(&mut self) -> Result<()> {
        if self.browser.is_some() {
            return Ok(());
        }

        // If remote URL is configured, connect to existing browser
        if let Some(remote_url) = self.config.remote_url.clone() {
            return self.connect_remote(&remote_url).await;
        }

        info!("Launching browser (headless={})", self.config.headless);

        let chrome_path = Self::find_chrome()?;

        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);

        // Set headless mode (with_head means NOT headless, confusingly)
        if !self.config.headless {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--no-sandbox") // Often needed for headless in containers/restricted environments
            .arg("--mute-audio");

        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        let (browser, handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        self.attach(browser, handler);
        Ok(())
    }

    /// Connect to a remote Chrome instance.
    async fn connect_remote(&mut self, url: &str) -> Result<()> {
        info!("Connecting to remote browser at {}", url);

        // Get WebSocket URL from the /json/version endpoint
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let client = reqwest::Client::new();
        let resp: serde_json::Value = client
            .get(&version_url)
            .send()
            .await
            .context("Failed to connect to remote browser")?
            .json()
            .await
            .context("Failed to parse browser version info")?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("No webSocketDebuggerUrl in response"))?;

        info!("Connecting to WebSocket: {}", ws_url);

        let (browser, handler) = Browser::connect(ws_url)
            .await
            .context("Failed to connect to remote browser")?;

        self.attach(browser, handler);
        Ok(())
    }

    fn attach(&mut self, browser: Browser, mut handler: chromiumoxide::Handler) {
        // Spawn handler task
        self.handler = Some(tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        }));
        self.browser = Some(browser);
    }

    /// Open a blank tab with user agent, stealth patches and the saved
    /// session applied, ready for the first navigation.
    pub async fn open_page(&mut self, session: Option<&SessionState>) -> Result<Page> {
        self.ensure_browser().await?;
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Browser not running"))?;

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to create page")?;

        page.execute(SetUserAgentOverrideParams::new(
            self.config.user_agent.clone(),
        ))
        .await
        .context("Failed to set user agent")?;

        if self.config.engine == BrowserEngineType::Stealth {
            debug!("Registering stealth scripts");
            page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
                stealth_init_script(),
            ))
            .await
            .context("Failed to register stealth scripts")?;
        }

        if let Some(session) = session {
            Self::apply_session(&page, session).await?;
        }

        Ok(page)
    }

    /// Open a tab ready for feed capture.
    pub async fn open_feed_page(&mut self, session: &SessionState) -> Result<ChromeFeedPage> {
        let page = self.open_page(Some(session)).await?;
        Ok(ChromeFeedPage::new(
            page,
            Duration::from_secs(self.config.timeout),
        ))
    }

    /// Inject saved cookies and localStorage into a page before navigation.
    ///
    /// Cookies go through `Network.setCookies`, which accepts domain-scoped
    /// cookies while the tab is still on `about:blank`.
    async fn apply_session(page: &Page, session: &SessionState) -> Result<()> {
        let mut params = Vec::new();
        for cookie in session.usable_cookies() {
            match cookie_param(cookie) {
                Ok(param) => params.push(param),
                Err(e) => warn!("Failed to build cookie {}: {}", cookie.name, e),
            }
        }

        if params.is_empty() {
            anyhow::bail!("None of the saved session cookies could be injected");
        }

        let injected = params.len();
        page.execute(SetCookiesParams::new(params))
            .await
            .context("Failed to inject session cookies")?;
        debug!("Injected {} session cookies", injected);

        if let Some(script) = session.local_storage_script() {
            page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script))
                .await
                .context("Failed to register localStorage restore script")?;
        }

        Ok(())
    }

    /// Log in with username and password and return the resulting session.
    ///
    /// Challenges (captcha, 2FA) are not handled; run headed and complete
    /// them manually within the wait window if they appear.
    pub async fn login(&mut self, credentials: &Credentials, settle: Duration) -> Result<SessionState> {
        let page = self.open_page(None).await?;

        info!("Navigating to {}", LOGIN_URL);
        page.goto(LOGIN_URL)
            .await
            .with_context(|| format!("Failed to load {}", LOGIN_URL))?;

        let timeout = Duration::from_secs(self.config.timeout);
        let username = wait_for_selector(&page, "input[name='username']", timeout).await?;
        username.click().await?.type_str(&credentials.username).await?;

        let password = wait_for_selector(&page, "input[name='password']", timeout).await?;
        password.click().await?.type_str(&credentials.password).await?;

        page.find_element("button[type='submit']")
            .await
            .context("Login button not found")?
            .click()
            .await
            .context("Failed to submit login form")?;

        info!("Submitted login form, waiting {}s", settle.as_secs());
        tokio::time::sleep(settle).await;

        // "Save your login info?" prompt; optional, layout changes often
        match page.find_element("main section button").await {
            Ok(button) => match button.click().await {
                Ok(_) => info!("Dismissed 'Save info' prompt"),
                Err(e) => warn!("'Save info' prompt not clickable: {}", e),
            },
            Err(_) => warn!("'Save info' prompt not found, proceeding"),
        }

        let cookies = page
            .get_cookies()
            .await
            .context("Failed to read browser cookies")?;

        let session = SessionState {
            cookies: cookies
                .into_iter()
                .map(|c| SessionCookie {
                    name: c.name,
                    value: c.value,
                    domain: c.domain,
                    path: c.path,
                    expires: c.expires,
                    http_only: c.http_only,
                    secure: c.secure,
                    same_site: c.same_site.as_ref().map(|s| format!("{:?}", s)),
                })
                .collect(),
            origins: Vec::new(),
        };

        let _ = page.close().await;

        if !session.cookies.iter().any(|c| c.name == "sessionid") {
            warn!("No sessionid cookie after login; the session may not be authenticated");
        }

        Ok(session)
    }

    /// Close the browser.
    pub async fn close(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                debug!("Browser close failed: {}", e);
            }
            let _ = browser.wait().await;
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

/// Build the CDP cookie for a saved cookie, keeping expiry and SameSite.
#[cfg(feature = "browser")]
fn cookie_param(cookie: &SessionCookie) -> std::result::Result<CookieParam, String> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .domain(cookie.domain.clone())
        .path(cookie.path.clone())
        .secure(cookie.secure)
        .http_only(cookie.http_only);

    // Negative expiry marks a session cookie
    if cookie.expires > 0.0 {
        builder = builder.expires(TimeSinceEpoch::new(cookie.expires));
    }
    if let Some(same_site) = cookie.same_site.as_deref().and_then(parse_same_site) {
        builder = builder.same_site(same_site);
    }

    builder.build()
}

#[cfg(feature = "browser")]
fn parse_same_site(value: &str) -> Option<CookieSameSite> {
    match value.to_ascii_lowercase().as_str() {
        "strict" => Some(CookieSameSite::Strict),
        "lax" => Some(CookieSameSite::Lax),
        "none" => Some(CookieSameSite::None),
        _ => None,
    }
}

/// Poll for a selector until it appears or `timeout` elapses.
#[cfg(feature = "browser")]
async fn wait_for_selector(
    page: &Page,
    selector: &str,
    timeout: Duration,
) -> Result<chromiumoxide::Element> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match page.find_element(selector).await {
            Ok(element) => return Ok(element),
            Err(e) if tokio::time::Instant::now() >= deadline => {
                return Err(anyhow::anyhow!(
                    "Timeout waiting for selector {}: {}",
                    selector,
                    e
                ));
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(250)).await,
        }
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct BrowserSession;

#[cfg(not(feature = "browser"))]
impl BrowserSession {
    pub fn new(_config: BrowserEngineConfig) -> Self {
        Self
    }

    pub async fn login(
        &mut self,
        _credentials: &Credentials,
        _settle: std::time::Duration,
    ) -> Result<SessionState> {
        Err(anyhow::anyhow!(
            "Browser support not compiled. Rebuild with: cargo build --features browser"
        ))
    }

    pub async fn close(&mut self) {}
}
