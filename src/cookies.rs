//! Session cookie persistence.
//!
//! Cookies earned by solving a CAPTCHA in the browser are saved when the
//! session closes and restored on the next launch, so the operator is not
//! asked again on every run. The HTTP driver sends them as a `Cookie` header.

use crate::error::{Result, ScholarError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default cookie file path: `~/.gscholar_citing_cookies.json`
fn default_cookie_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(".gscholar_citing_cookies.json"))
        .ok_or_else(|| ScholarError::Config("Cannot determine home directory".to_string()))
}

/// Stored cookie, a subset of the DevTools cookie record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

impl StoredCookie {
    fn is_scholar(&self) -> bool {
        self.domain.contains("google")
    }
}

/// Cookie file for one browser profile.
#[derive(Debug, Clone)]
pub struct CookieJar {
    path: PathBuf,
}

impl CookieJar {
    /// Jar at the default path in the home directory
    pub fn new() -> Result<Self> {
        Ok(Self {
            path: default_cookie_path()?,
        })
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load cookies; a missing or malformed file yields an empty list.
    pub fn load(&self) -> Vec<StoredCookie> {
        if !self.path.exists() {
            debug!(path = ?self.path, "Cookie file not found");
            return Vec::new();
        }

        let parsed = std::fs::read_to_string(&self.path)
            .map_err(ScholarError::from)
            .and_then(|s| serde_json::from_str::<Vec<StoredCookie>>(&s).map_err(ScholarError::from));
        match parsed {
            Ok(cookies) => {
                info!(count = cookies.len(), path = ?self.path, "Loaded cookies");
                cookies
            }
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Ignoring unreadable cookie file");
                Vec::new()
            }
        }
    }

    /// Replace the stored cookies with the scholar-domain ones from `cookies`.
    pub fn save(&self, cookies: &[StoredCookie]) -> Result<usize> {
        let kept: Vec<&StoredCookie> = cookies.iter().filter(|c| c.is_scholar()).collect();
        std::fs::write(&self.path, serde_json::to_string_pretty(&kept)?)?;
        info!(count = kept.len(), path = ?self.path, "Saved cookies");
        Ok(kept.len())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            info!(path = ?self.path, "Cleared cookies");
        }
        Ok(())
    }

    /// `Cookie` header value for scholar requests, empty when none are stored.
    pub fn header(&self) -> String {
        self.load()
            .iter()
            .filter(|c| c.is_scholar())
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
