//! A page session with a human in the loop.
//!
//! Pages are opened until a "ready" selector shows up. If it never does, the
//! session blocks on the operator: retry re-reads the page, cancel stops the
//! call with [`ScholarError::Cancelled`].

use crate::config::ScholarConfig;
use crate::driver::{looks_like_captcha, Driver};
use crate::error::{Result, ScholarError};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::io::{self, BufRead, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default operator prompt
pub const DEFAULT_PROMPT: &str = "The page did not finish loading. Fix it in the browser window, then retry.";

/// Asks the operator whether a failed page should be tried again.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn ask_retry(&self, message: &str) -> bool;
}

#[async_trait]
impl<T: Prompter + ?Sized> Prompter for Box<T> {
    async fn ask_retry(&self, message: &str) -> bool {
        (**self).ask_retry(message).await
    }
}

/// Reads `[R]etry / [c]ancel` from the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn ask_retry(&self, message: &str) -> bool {
        let message = message.to_string();
        tokio::task::spawn_blocking(move || {
            let mut stderr = io::stderr();
            let _ = writeln!(stderr, "\n{}", message);
            let _ = write!(stderr, "[R]etry / [c]ancel > ");
            let _ = stderr.flush();

            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                // EOF: nobody is there to fix the page
                Ok(0) => false,
                Ok(_) => !matches!(line.trim().to_lowercase().as_str(), "c" | "cancel" | "q"),
                Err(_) => false,
            }
        })
        .await
        .unwrap_or(false)
    }
}

/// Never retries; for unattended runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverRetry;

#[async_trait]
impl Prompter for NeverRetry {
    async fn ask_retry(&self, _message: &str) -> bool {
        false
    }
}

/// Does `html` contain an element matching `css`?
pub fn page_has(html: &str, css: &str) -> Result<bool> {
    let selector = Selector::parse(css).map_err(|e| ScholarError::Parse(e.to_string()))?;
    Ok(Html::parse_document(html).select(&selector).next().is_some())
}

/// One driver shared by every scrape call.
pub struct Session<D, P> {
    driver: D,
    prompter: P,
    expand_pause: Duration,
    ready_timeout: Duration,
    ready_poll: Duration,
    nav_delay_ms: (u64, u64),
    navigations: u64,
}

impl<D: Driver, P: Prompter> Session<D, P> {
    pub fn new(driver: D, prompter: P, config: &ScholarConfig) -> Self {
        Self {
            driver,
            prompter,
            expand_pause: config.expand_pause,
            ready_timeout: config.ready_timeout,
            ready_poll: config.ready_poll,
            nav_delay_ms: config.nav_delay_ms,
            navigations: 0,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Pages loaded so far
    pub fn navigations(&self) -> u64 {
        self.navigations
    }

    /// Navigate to `url` and return its markup once `ready_selector` is present.
    pub async fn open(&mut self, url: &str, ready_selector: &str) -> Result<String> {
        self.polite_delay().await;
        debug!(url, "Navigating");
        self.driver.goto(url).await?;
        self.navigations += 1;
        self.wait_ready(url, ready_selector).await
    }

    /// Click a "show more" button until the list is complete.
    pub async fn expand(&mut self, button_selector: &str) -> Result<()> {
        self.driver.expand(button_selector, self.expand_pause).await
    }

    /// Current markup without navigating.
    pub async fn content(&mut self) -> Result<String> {
        self.driver.content().await
    }

    pub async fn close(&mut self) -> Result<()> {
        info!(navigations = self.navigations, "Closing session");
        self.driver.close().await
    }

    async fn wait_ready(&mut self, url: &str, ready_selector: &str) -> Result<String> {
        let deadline = Instant::now() + self.ready_timeout;
        loop {
            let html = self.driver.content().await?;
            if page_has(&html, ready_selector)? {
                return Ok(html);
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(self.ready_poll).await;
        }

        loop {
            warn!(url, selector = ready_selector, "Page not ready, waiting for operator");
            if !self.prompter.ask_retry(DEFAULT_PROMPT).await {
                let html = self.driver.content().await?;
                if looks_like_captcha(&html) {
                    return Err(ScholarError::Captcha);
                }
                return Err(ScholarError::Cancelled(url.to_string()));
            }
            self.driver.refresh().await?;
            let html = self.driver.content().await?;
            if page_has(&html, ready_selector)? {
                info!(url, "Page recovered");
                return Ok(html);
            }
        }
    }

    async fn polite_delay(&self) {
        let (lo, hi) = self.nav_delay_ms;
        if hi == 0 || self.navigations == 0 {
            return;
        }
        let delay = lo + rand::random::<u64>() % (hi - lo + 1);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}
