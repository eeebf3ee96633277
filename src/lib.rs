//! # gscholar-citing
//!
//! Walks a Google Scholar author's publications, every paper citing them,
//! and the profiles of the citing authors, through one interactive browser
//! session. Every scrape call is memoized on disk.
//!
//! ## Modules
//!
//! - [`scholar`] - Page extraction and the memoized scrape calls
//! - [`pipeline`] - End-to-end crawl and author resolution
//! - [`session`] - Ready-selector waits and the operator retry prompt
//! - [`driver`] - Chromium and HTTP page drivers
//! - [`cache`] - Disk-backed memoization
//! - [`cookies`] - Cookie persistence
//! - [`export`] - JSON/CSV output
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gscholar_citing::driver::{ChromeDriver, ChromeOptions};
//! use gscholar_citing::pipeline::{crawl, CrawlOptions};
//! use gscholar_citing::scholar::Scholar;
//! use gscholar_citing::session::TerminalPrompter;
//! use gscholar_citing::ScholarConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let driver = ChromeDriver::launch(ChromeOptions::default()).await?;
//!     let mut scholar = Scholar::new(driver, TerminalPrompter, ScholarConfig::default())?;
//!     let report = crawl(&mut scholar, "mbGafk4AAAAJ", &CrawlOptions::default()).await?;
//!     println!("{} citing papers", report.citing_count());
//!     scholar.quit().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod cookies;
pub mod driver;
pub mod error;
pub mod export;
pub mod models;
pub mod pipeline;
pub mod scholar;
pub mod session;

pub use config::ScholarConfig;
pub use error::{Result, ScholarError};
