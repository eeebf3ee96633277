//! Custom error types for gscholar-citing.
//!
//! All library functions return `Result<T, ScholarError>` instead of using `unwrap()`.

use thiserror::Error;

/// Main error type for gscholar-citing operations.
#[derive(Debug, Error)]
pub enum ScholarError {
    /// Browser automation error (Chromium DevTools)
    #[error("Browser error: {0}")]
    Browser(String),

    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Unexpected HTTP status from the scholar site
    #[error("HTTP error: {code} for {url}")]
    Http {
        /// Status code
        code: u16,
        /// Requested URL
        url: String,
    },

    /// HTML parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// The operator declined to retry a page that never became ready
    #[error("Cancelled while waiting for {0}")]
    Cancelled(String),

    /// CAPTCHA or "unusual traffic" page served instead of content
    #[error("CAPTCHA detected, solve it in the browser or refresh cookies")]
    Captcha,

    /// Cache store error
    #[error("Cache error: {0}")]
    Cache(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV export error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed URL
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

impl ScholarError {
    /// Whether the operator stopped the run at a recovery prompt.
    pub fn stops_run(&self) -> bool {
        matches!(self, ScholarError::Cancelled(_) | ScholarError::Captcha)
    }
}

impl From<chromiumoxide::error::CdpError> for ScholarError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        ScholarError::Browser(e.to_string())
    }
}

/// Result type alias using `ScholarError`
pub type Result<T> = std::result::Result<T, ScholarError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| ScholarError::Parse(msg.to_string()))
    }
}
