//! Runtime settings for a scrape session.

use crate::error::{Result, ScholarError};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default Google Scholar URL
pub const DEFAULT_SCHOLAR_URL: &str = "https://scholar.google.com";

/// Results per "cited by" page; a shorter page is the last one
pub const CITING_PAGE_SIZE: usize = 10;

/// Fallback cache directory when no platform cache dir exists
const FALLBACK_CACHE_DIR: &str = "__google-scholar-citing";

/// Default cache directory: `<platform cache dir>/gscholar-citing`
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|p| p.join("gscholar-citing"))
        .unwrap_or_else(|| PathBuf::from(FALLBACK_CACHE_DIR))
}

/// Settings shared by the session, cache and scrape operations.
#[derive(Debug, Clone)]
pub struct ScholarConfig {
    /// Scholar site or mirror, without trailing slash
    pub base_url: String,
    /// Interface language passed as `hl` to title searches
    pub language: String,
    /// Entries per citing page
    pub page_size: usize,
    /// Pause after each "show more" click
    pub expand_pause: Duration,
    /// How long to wait for the ready selector before asking the operator
    pub ready_timeout: Duration,
    /// Poll interval while waiting for the ready selector
    pub ready_poll: Duration,
    /// Random delay range between navigations, in milliseconds
    pub nav_delay_ms: (u64, u64),
    pub cache_dir: PathBuf,
    pub cache_enabled: bool,
    /// Author profile URLs that are never resolved (known dead profiles)
    pub skip_authors: HashSet<String>,
}

impl Default for ScholarConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SCHOLAR_URL.to_string(),
            language: "zh-CN".to_string(),
            page_size: CITING_PAGE_SIZE,
            expand_pause: Duration::from_secs(2),
            ready_timeout: Duration::from_secs(30),
            ready_poll: Duration::from_millis(500),
            nav_delay_ms: (500, 2000),
            cache_dir: default_cache_dir(),
            cache_enabled: true,
            skip_authors: HashSet::new(),
        }
    }
}

impl ScholarConfig {
    /// Use a mirror site instead of the default Scholar URL.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Settings for tests and offline fixtures: no delays, short waits.
    pub fn for_testing(base_url: &str, cache_dir: PathBuf) -> Self {
        Self {
            expand_pause: Duration::ZERO,
            ready_timeout: Duration::ZERO,
            ready_poll: Duration::from_millis(1),
            nav_delay_ms: (0, 0),
            cache_dir,
            ..Self::default()
        }
        .with_base_url(base_url)
    }

    /// Check the settings before a session is opened.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.base_url).map_err(|e| {
            ScholarError::Config(format!("Invalid base URL '{}': {}", self.base_url, e))
        })?;
        if self.page_size == 0 {
            return Err(ScholarError::Config("page size must be positive".to_string()));
        }
        let (lo, hi) = self.nav_delay_ms;
        if lo > hi {
            return Err(ScholarError::Config(format!(
                "navigation delay range {}..{} is inverted",
                lo, hi
            )));
        }
        Ok(())
    }
}
