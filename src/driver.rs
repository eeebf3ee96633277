//! Page drivers: a headed Chromium session and a fetch-only HTTP fallback.
//!
//! Both expose the same small surface so the scrape operations never know
//! which one is loading pages.

use crate::cookies::{CookieJar, StoredCookie};
use crate::error::{Result, ScholarError};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// User agent string for the HTTP driver
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Upper bound on "show more" clicks for one list
const MAX_EXPAND_CLICKS: usize = 500;

/// Loads pages and hands back their current markup.
#[async_trait]
pub trait Driver: Send {
    /// Navigate to `url` and wait for the load to finish.
    async fn goto(&mut self, url: &str) -> Result<()>;

    /// Markup of the current page as it is now.
    async fn content(&mut self) -> Result<String>;

    /// Bring the current page up to date after the operator intervened.
    async fn refresh(&mut self) -> Result<()>;

    /// Click `button_selector` until it carries the `disabled` attribute.
    async fn expand(&mut self, button_selector: &str, pause: Duration) -> Result<()>;

    /// Shut the session down.
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
impl<T: Driver + ?Sized> Driver for Box<T> {
    async fn goto(&mut self, url: &str) -> Result<()> {
        (**self).goto(url).await
    }

    async fn content(&mut self) -> Result<String> {
        (**self).content().await
    }

    async fn refresh(&mut self) -> Result<()> {
        (**self).refresh().await
    }

    async fn expand(&mut self, button_selector: &str, pause: Duration) -> Result<()> {
        (**self).expand(button_selector, pause).await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}

/// Does this page look like a CAPTCHA / traffic block instead of content?
pub fn looks_like_captcha(html: &str) -> bool {
    html.contains("gs_captcha_f")
        || html.contains("Solving the above CAPTCHA")
        || html.contains("unusual traffic")
}

// ============================================================================
// Chromium
// ============================================================================

/// Options for launching the browser
#[derive(Debug, Clone, Default)]
pub struct ChromeOptions {
    /// Chrome/Chromium binary, detected when `None`
    pub executable: Option<PathBuf>,
    /// Persistent profile directory
    pub profile_dir: Option<PathBuf>,
    /// Run without a window; the operator cannot solve CAPTCHAs then
    pub headless: bool,
    /// Proxy server, e.g. `http://127.0.0.1:7890`
    pub proxy: Option<String>,
    /// Restore cookies from and save them to this jar
    pub cookies: Option<CookieJar>,
}

/// Headed Chromium session driven over the DevTools protocol.
pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    cookies: Option<CookieJar>,
}

impl ChromeDriver {
    /// Launch the browser and open a blank tab.
    pub async fn launch(options: ChromeOptions) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-blink-features=AutomationControlled")
            .window_size(1280, 900);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(exe) = &options.executable {
            builder = builder.chrome_executable(exe);
        }
        if let Some(dir) = &options.profile_dir {
            builder = builder.user_data_dir(dir);
        }
        if let Some(proxy) = &options.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        let config = builder.build().map_err(ScholarError::Browser)?;

        info!(headless = options.headless, "Launching browser");
        let (browser, mut handler) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler stopped");
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;

        let driver = Self {
            browser,
            page,
            handler,
            cookies: options.cookies,
        };
        driver.restore_cookies().await?;
        Ok(driver)
    }

    async fn restore_cookies(&self) -> Result<()> {
        let Some(jar) = &self.cookies else {
            return Ok(());
        };
        let params = jar
            .load()
            .into_iter()
            .map(|c| {
                CookieParam::builder()
                    .name(c.name)
                    .value(c.value)
                    .domain(c.domain)
                    .path(if c.path.is_empty() { "/".to_string() } else { c.path })
                    .secure(c.secure)
                    .http_only(c.http_only)
                    .build()
                    .map_err(ScholarError::Browser)
            })
            .collect::<Result<Vec<_>>>()?;
        if !params.is_empty() {
            debug!(count = params.len(), "Restoring cookies");
            self.page.set_cookies(params).await?;
        }
        Ok(())
    }

    async fn save_cookies(&mut self) -> Result<()> {
        let Some(jar) = &self.cookies else {
            return Ok(());
        };
        let cookies: Vec<StoredCookie> = self
            .page
            .get_cookies()
            .await?
            .into_iter()
            .map(|c| StoredCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect();
        jar.save(&cookies)?;
        Ok(())
    }
}

#[async_trait]
impl Driver for ChromeDriver {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn content(&mut self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    async fn refresh(&mut self) -> Result<()> {
        // The operator works in the live window; re-reading the DOM is enough.
        Ok(())
    }

    async fn expand(&mut self, button_selector: &str, pause: Duration) -> Result<()> {
        for clicks in 0..MAX_EXPAND_CLICKS {
            let button = match self.page.find_element(button_selector).await {
                Ok(button) => button,
                Err(e) => {
                    debug!(selector = button_selector, error = %e, "No expand button");
                    return Ok(());
                }
            };
            if button.attribute("disabled").await?.is_some() {
                debug!(selector = button_selector, clicks, "List fully expanded");
                return Ok(());
            }
            button.click().await?;
            tokio::time::sleep(pause).await;
        }
        warn!(selector = button_selector, "Gave up expanding after {} clicks", MAX_EXPAND_CLICKS);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.save_cookies().await {
            warn!(error = %e, "Failed to save cookies");
        }
        self.browser.close().await?;
        self.browser.wait().await?;
        self.handler.abort();
        info!("Browser closed");
        Ok(())
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Fetch-only driver. No scripts run, so "show more" cannot be clicked;
/// callers page through long lists instead.
pub struct HttpDriver {
    client: reqwest::Client,
    cookies: Option<CookieJar>,
    current_url: Option<String>,
    body: String,
}

impl HttpDriver {
    pub fn new(proxy: Option<&str>, cookies: Option<CookieJar>) -> Result<Self> {
        Ok(Self {
            client: build_http_client(proxy)?,
            cookies,
            current_url: None,
            body: String::new(),
        })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Cache-Control", "no-cache")
            .header("Upgrade-Insecure-Requests", "1");

        // Re-read the jar on every request so freshly pasted cookies apply on retry.
        if let Some(jar) = &self.cookies {
            let header = jar.header();
            if !header.is_empty() {
                request = request.header("Cookie", header);
            }
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!(url, "Rate limited");
            return Ok(String::new());
        }
        if !status.is_success() {
            return Err(ScholarError::Http {
                code: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        if looks_like_captcha(&body) {
            warn!(url, "CAPTCHA page served");
        }
        Ok(body)
    }
}

/// Build HTTP client with optional proxy
fn build_http_client(proxy: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .cookie_store(true);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
            ScholarError::Config(format!("Invalid proxy URL '{}': {}", proxy_url, e))
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ScholarError::Config(format!("Failed to build HTTP client: {}", e)))
}

fn has_enabled_button(html: &str, button_selector: &str) -> Result<bool> {
    let selector = scraper::Selector::parse(&format!("{}:not([disabled])", button_selector))
        .map_err(|e| ScholarError::Parse(e.to_string()))?;
    Ok(scraper::Html::parse_document(html).select(&selector).next().is_some())
}

#[async_trait]
impl Driver for HttpDriver {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.body = self.fetch(url).await?;
        self.current_url = Some(url.to_string());
        Ok(())
    }

    async fn content(&mut self) -> Result<String> {
        Ok(self.body.clone())
    }

    async fn refresh(&mut self) -> Result<()> {
        if let Some(url) = self.current_url.clone() {
            self.body = self.fetch(&url).await?;
        }
        Ok(())
    }

    async fn expand(&mut self, button_selector: &str, _pause: Duration) -> Result<()> {
        if has_enabled_button(&self.body, button_selector)? {
            debug!(
                selector = button_selector,
                "List has more rows than one page, leaving it to paging"
            );
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.current_url = None;
        self.body.clear();
        Ok(())
    }
}
