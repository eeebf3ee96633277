//! gscholar-citing - who cites a Google Scholar author, and who are they
//!
//! ## Usage
//!
//! ```bash
//! gscholar-citing crawl mbGafk4AAAAJ --csv citing.csv
//! gscholar-citing authors --input citing_papers.json
//! gscholar-citing cache stats
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gscholar_citing::cache::ResultCache;
use gscholar_citing::config::default_cache_dir;
use gscholar_citing::cookies::CookieJar;
use gscholar_citing::driver::{ChromeDriver, ChromeOptions, Driver, HttpDriver};
use gscholar_citing::export::{citing_rows, load_json, save_csv, save_json};
use gscholar_citing::models::CitingReport;
use gscholar_citing::pipeline::{collect_author_urls, crawl, resolve_authors, CrawlOptions};
use gscholar_citing::scholar::Scholar;
use gscholar_citing::session::{NeverRetry, Prompter, TerminalPrompter};
use gscholar_citing::ScholarConfig;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

type AnyScholar = Scholar<Box<dyn Driver>, Box<dyn Prompter>>;

// ============================================================================
// CLI Definition
// ============================================================================

/// Collect the papers citing a Google Scholar author, and their authors
#[derive(Parser)]
#[command(name = "gscholar-citing")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl every paper citing an author's publications
    Crawl {
        /// Scholar profile id (the `user` parameter of the profile URL)
        user_id: String,

        /// Report file
        #[arg(short, long, default_value = "citing_papers.json")]
        output: PathBuf,

        /// Also write a flat CSV of citing papers
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Skip the title search for each citing paper
        #[arg(long)]
        no_search: bool,

        /// Skip resolving author profiles
        #[arg(long)]
        no_authors: bool,

        /// Accept citing lists whose length differs from the cited count
        #[arg(long)]
        no_verify: bool,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Resolve the author profiles listed in an existing report
    Authors {
        /// Report written by `crawl`
        #[arg(short, long, default_value = "citing_papers.json")]
        input: PathBuf,

        /// Author index file
        #[arg(short, long, default_value = "citing_authors.json")]
        output: PathBuf,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Inspect or clear the result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,

        /// Cache directory
        #[arg(long, global = true)]
        cache_dir: Option<PathBuf>,
    },

    /// Manage cookies
    Cookies {
        #[command(subcommand)]
        action: CookieAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Entries per scrape function
    Stats,
    /// Delete cached results
    Clear {
        /// Only this function, e.g. `get_author`
        #[arg(long)]
        function: Option<String>,
    },
    /// Show cache directory
    Path,
}

#[derive(Subcommand)]
enum CookieAction {
    /// Clear stored cookies
    Clear,
    /// Show cookie file path
    Path,
}

#[derive(Args)]
struct SessionArgs {
    /// Page driver: a real browser, or plain HTTP requests
    #[arg(long, default_value = "chrome", value_parser = ["chrome", "http"])]
    driver: String,

    /// Chrome/Chromium binary
    #[arg(long)]
    chrome: Option<PathBuf>,

    /// Persistent browser profile directory
    #[arg(long)]
    profile_dir: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,

    /// Proxy URL (e.g., http://127.0.0.1:7890)
    #[arg(long)]
    proxy: Option<String>,

    /// Mirror site URL
    #[arg(long)]
    mirror: Option<String>,

    /// Interface language for title searches
    #[arg(long, default_value = "zh-CN")]
    hl: String,

    /// Cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Do not read or write the result cache
    #[arg(long)]
    no_cache: bool,

    /// Cancel instead of prompting when a page does not load
    #[arg(long)]
    non_interactive: bool,

    /// Author profile URL never to resolve (repeatable)
    #[arg(long = "skip-author")]
    skip_authors: Vec<String>,

    /// Seconds to wait for a page before prompting
    #[arg(long, default_value_t = 30)]
    ready_timeout: u64,
}

impl SessionArgs {
    fn config(&self) -> ScholarConfig {
        let mut config = ScholarConfig::default();
        if let Some(mirror) = &self.mirror {
            config = config.with_base_url(mirror);
        }
        config.language = self.hl.clone();
        config.ready_timeout = std::time::Duration::from_secs(self.ready_timeout);
        config.cache_enabled = !self.no_cache;
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = dir.clone();
        }
        config.skip_authors = self.skip_authors.iter().cloned().collect();
        config
    }

    async fn open(&self) -> Result<AnyScholar> {
        let config = self.config();
        let cookies = match CookieJar::new() {
            Ok(jar) => Some(jar),
            Err(e) => {
                error!(error = %e, "Cookie jar unavailable, continuing without it");
                None
            }
        };

        let driver: Box<dyn Driver> = match self.driver.as_str() {
            "http" => Box::new(HttpDriver::new(self.proxy.as_deref(), cookies)?),
            _ => Box::new(
                ChromeDriver::launch(ChromeOptions {
                    executable: self.chrome.clone(),
                    profile_dir: self.profile_dir.clone(),
                    headless: self.headless,
                    proxy: self.proxy.clone(),
                    cookies,
                })
                .await
                .context("Failed to launch the browser")?,
            ),
        };
        let prompter: Box<dyn Prompter> = if self.non_interactive {
            Box::new(NeverRetry)
        } else {
            Box::new(TerminalPrompter)
        };

        Ok(Scholar::new(driver, prompter, config)?)
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.log_json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }

    match cli.command {
        Commands::Crawl {
            user_id,
            output,
            csv,
            no_search,
            no_authors,
            no_verify,
            session,
        } => {
            let options = CrawlOptions {
                search: !no_search,
                resolve_authors: !no_authors,
                verify_counts: !no_verify,
            };
            run_crawl(&user_id, &options, &session, output, csv).await
        }
        Commands::Authors {
            input,
            output,
            session,
        } => run_authors(input, output, &session).await,
        Commands::Cache { action, cache_dir } => handle_cache(action, cache_dir),
        Commands::Cookies { action } => handle_cookies(action),
    }
}

// ============================================================================
// Crawl
// ============================================================================

async fn run_crawl(
    user_id: &str,
    options: &CrawlOptions,
    session: &SessionArgs,
    output: PathBuf,
    csv: Option<PathBuf>,
) -> Result<()> {
    let mut scholar = session.open().await?;
    let result = crawl(&mut scholar, user_id, options).await;
    if let Err(e) = scholar.quit().await {
        error!(error = %e, "Failed to close the session");
    }
    let report = result.with_context(|| format!("Crawl of {} stopped", user_id))?;

    save_json(&output, &report).context("Failed to write report")?;
    if let Some(csv_path) = csv {
        save_csv(&csv_path, &citing_rows(&report)).context("Failed to write CSV")?;
    }

    println!(
        "{} published papers, {} citing papers -> {}",
        report.papers.len(),
        report.citing_count(),
        output.display()
    );
    Ok(())
}

// ============================================================================
// Authors
// ============================================================================

async fn run_authors(input: PathBuf, output: PathBuf, session: &SessionArgs) -> Result<()> {
    let report: CitingReport = load_json(&input)
        .with_context(|| format!("Failed to read report {}", input.display()))?;

    let config = session.config();
    let urls = collect_author_urls(&report, &config.base_url)?;
    info!(authors = urls.len(), "Collected author links");
    if urls.is_empty() {
        println!("No author links in {}", input.display());
        return Ok(());
    }

    let mut scholar = session.open().await?;
    let result = resolve_authors(&mut scholar, &urls).await;
    if let Err(e) = scholar.quit().await {
        error!(error = %e, "Failed to close the session");
    }
    let index = result.context("Author resolution stopped")?;

    save_json(&output, &index).context("Failed to write author index")?;
    println!("{} of {} authors -> {}", index.len(), urls.len(), output.display());
    Ok(())
}

// ============================================================================
// Cache / Cookies
// ============================================================================

fn handle_cache(action: CacheAction, cache_dir: Option<PathBuf>) -> Result<()> {
    let cache = ResultCache::new(cache_dir.unwrap_or_else(default_cache_dir));

    match action {
        CacheAction::Stats => {
            let stats = cache.stats()?;
            if stats.is_empty() {
                println!("Cache is empty.");
            }
            for (function, entries) in stats {
                println!("{:<24} {}", function, entries);
            }
        }
        CacheAction::Clear { function } => {
            let removed = match function {
                Some(name) => cache.clear_function(&name)?,
                None => cache.clear()?,
            };
            println!("Removed {} cached results.", removed);
        }
        CacheAction::Path => {
            println!("Cache directory: {:?}", cache.dir());
        }
    }

    Ok(())
}

fn handle_cookies(action: CookieAction) -> Result<()> {
    let jar = CookieJar::new()?;

    match action {
        CookieAction::Clear => {
            jar.clear()?;
            println!("Cookies cleared.");
        }
        CookieAction::Path => {
            println!("Cookie file: {:?}", jar.path());
        }
    }

    Ok(())
}
