//! Crawl an author's citations end to end.
//!
//! Publication list -> "cited by" lists -> title search per citing paper ->
//! profile of every author met along the way.

use crate::driver::Driver;
use crate::error::Result;
use crate::models::{
    AuthorIndex, CitingEntry, CitingReport, CitingReportEntry, DetailedAuthor, PaperReport,
    PublishedPaper, ResolvedAuthor, ResolvedCitingPaper,
};
use crate::scholar::{absolute_url, user_id_from_url, CitingList, Scholar, MAX_CITING_PAGES};
use crate::session::Prompter;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Which stages of a crawl to run.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Search every citing paper's title
    pub search: bool,
    /// Resolve every author profile
    pub resolve_authors: bool,
    /// Re-read a citing list once when its length disagrees with the cited count
    pub verify_counts: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            search: true,
            resolve_authors: true,
            verify_counts: true,
        }
    }
}

/// Resolves author links, remembering outcomes for the rest of the run.
struct AuthorResolver {
    base_url: String,
    seen: HashMap<String, Option<DetailedAuthor>>,
}

impl AuthorResolver {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            seen: HashMap::new(),
        }
    }

    async fn resolve<D: Driver, P: Prompter>(
        &mut self,
        scholar: &mut Scholar<D, P>,
        author: &mut ResolvedAuthor,
    ) -> Result<()> {
        let Some(href) = author.href.as_deref() else {
            return Ok(());
        };
        let url = absolute_url(&self.base_url, href)?;
        if scholar.config().skip_authors.contains(&url) {
            debug!(url = %url, "Skipping listed author");
            return Ok(());
        }

        if let Some(known) = self.seen.get(&url) {
            author.detail = known.clone();
            return Ok(());
        }

        let detail = match scholar.get_author(&url).await {
            Ok(detail) => Some(detail),
            Err(e) if e.stops_run() => return Err(e),
            Err(e) => {
                warn!(url = %url, error = %e, "Could not resolve author");
                None
            }
        };
        self.seen.insert(url, detail.clone());
        author.detail = detail;
        Ok(())
    }

    fn resolved(&self) -> usize {
        self.seen.values().filter(|d| d.is_some()).count()
    }
}

/// Crawl everything citing the publications of `user_id`.
pub async fn crawl<D: Driver, P: Prompter>(
    scholar: &mut Scholar<D, P>,
    user_id: &str,
    options: &CrawlOptions,
) -> Result<CitingReport> {
    let published = scholar.get_published_papers(user_id).await?;
    info!(user_id, papers = published.len(), "Crawling citations");

    let mut resolver = AuthorResolver::new(&scholar.config().base_url);
    let mut papers = Vec::with_capacity(published.len());

    for (n, paper) in published.into_iter().enumerate() {
        let Some(citing_href) = paper.citing_href.clone() else {
            debug!(title = %paper.title, "No citations");
            papers.push(PaperReport {
                paper,
                citing_papers: Vec::new(),
            });
            continue;
        };

        info!(n = n + 1, title = %paper.title, cited = %paper.cited_count, "Published paper");
        let list = fetch_citing_list(scholar, &paper, &citing_href, options.verify_counts).await?;

        let mut citing_papers = Vec::with_capacity(list.entries.len());
        for entry in list.entries {
            let citing = match entry {
                CitingEntry::Raw(html) => CitingReportEntry::Raw(html),
                CitingEntry::Paper(p) => {
                    let mut resolved = ResolvedCitingPaper::from(p);
                    if options.search {
                        resolved.searched = scholar
                            .get_papers(&resolved.title)
                            .await?
                            .into_iter()
                            .map(Into::into)
                            .collect();
                    }
                    if options.resolve_authors {
                        for author in resolved.authors.iter_mut() {
                            resolver.resolve(scholar, author).await?;
                        }
                        for hit in resolved.searched.iter_mut() {
                            for author in hit.authors.iter_mut() {
                                resolver.resolve(scholar, author).await?;
                            }
                        }
                    }
                    CitingReportEntry::Paper(resolved)
                }
            };
            citing_papers.push(citing);
        }

        papers.push(PaperReport {
            paper,
            citing_papers,
        });
    }

    let report = CitingReport {
        user_id: user_id.to_string(),
        generated_at: chrono::Local::now().to_rfc3339(),
        papers,
    };
    info!(
        published = report.papers.len(),
        citing = report.citing_count(),
        authors = resolver.resolved(),
        "Crawl complete"
    );
    Ok(report)
}

/// Read a citing list, re-reading it once if its length disagrees with the
/// cited count shown on the publication list.
async fn fetch_citing_list<D: Driver, P: Prompter>(
    scholar: &mut Scholar<D, P>,
    paper: &PublishedPaper,
    citing_href: &str,
    verify: bool,
) -> Result<CitingList> {
    let list = scholar.get_citing_papers(citing_href).await?;
    let Some(cited) = paper.cited_count_value().filter(|_| verify) else {
        return Ok(list);
    };
    // Anything past the result limit is never listed
    let expected = cited.min(MAX_CITING_PAGES * scholar.config().page_size);
    if expected == list.entries.len() {
        return Ok(list);
    }

    warn!(
        citing_href,
        expected,
        found = list.entries.len(),
        "Citing count mismatch, reading the list again"
    );
    let removed = scholar.invalidate_citing_list(&list)?;
    debug!(removed, "Dropped cached citing pages");

    let list = scholar.get_citing_papers(citing_href).await?;
    if expected != list.entries.len() {
        warn!(
            citing_href,
            expected,
            found = list.entries.len(),
            "Citing count still differs, keeping what was found"
        );
    }
    Ok(list)
}

/// Sorted, de-duplicated profile URLs of every citing-paper author.
pub fn collect_author_urls(report: &CitingReport, base_url: &str) -> Result<Vec<String>> {
    let mut urls = BTreeSet::new();
    for entry in report.papers.iter().flat_map(|p| &p.citing_papers) {
        let CitingReportEntry::Paper(paper) = entry else {
            continue;
        };
        for href in paper.authors.iter().filter_map(|a| a.href.as_deref()) {
            urls.insert(absolute_url(base_url, href)?);
        }
    }
    Ok(urls.into_iter().collect())
}

/// Resolve profile URLs into an index keyed by `user` id.
///
/// Listed dead profiles are skipped. A cancelled prompt stops the run; any
/// other failure skips that author.
pub async fn resolve_authors<D: Driver, P: Prompter>(
    scholar: &mut Scholar<D, P>,
    urls: &[String],
) -> Result<AuthorIndex> {
    let mut index = AuthorIndex::new();
    for (n, url) in urls.iter().enumerate() {
        if scholar.config().skip_authors.contains(url) {
            debug!(url = %url, "Skipping listed author");
            continue;
        }
        let key = user_id_from_url(url).unwrap_or_else(|| url.clone());
        match scholar.get_author(url).await {
            Ok(author) => {
                debug!(n = n + 1, total = urls.len(), name = %author.name, "Resolved author");
                index.insert(key, author);
            }
            Err(e) if e.stops_run() => return Err(e),
            Err(e) => warn!(url = %url, error = %e, "Could not resolve author"),
        }
    }
    info!(resolved = index.len(), total = urls.len(), "Authors resolved");
    Ok(index)
}
