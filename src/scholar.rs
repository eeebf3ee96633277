//! Google Scholar scraping: page extraction and the memoized scrape calls.
//!
//! Extraction is selector-driven and tied to the current page layout. A
//! missing optional selector yields `None` or an empty string, never an error.

use crate::cache::ResultCache;
use crate::config::ScholarConfig;
use crate::driver::Driver;
use crate::error::{OptionExt, Result, ScholarError};
use crate::models::{Author, CitingEntry, CitingPaper, DetailedAuthor, PublishedPaper, SearchedPaper};
use crate::session::{Prompter, Session};
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

/// Cache names of the memoized calls
pub const GET_PUBLISHED_PAPERS: &str = "get_published_papers";
pub const CUR_CITING_PAPERS: &str = "cur_citing_papers";
pub const GET_AUTHOR: &str = "get_author";
pub const GET_PAPERS: &str = "get_papers";

/// Present once a profile page has loaded
pub const PROFILE_READY: &str = "#gsc_prf_i";
/// Present once a result list (citing list or search) has loaded
pub const RESULTS_READY: &str = "#gs_res_ccl_mid";
/// "Show more" button under a publication list
pub const MORE_BUTTON: &str = "#gsc_bpf_more";

/// Publication rows requested per profile page
const PROFILE_PAGE_SIZE: usize = 100;

/// Profile pages read with `cstart` when the list cannot be expanded in place
const MAX_PROFILE_PAGES: usize = 100;

/// Scholar never lists more than 1000 citing results
pub const MAX_CITING_PAGES: usize = 100;

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScholarError::Parse(format!("{}: {}", css, e)))
}

fn text_of(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn attr_of(el: ElementRef, name: &str) -> Option<String> {
    el.value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Clone, Copy)]
enum Sibling {
    Prev,
    Next,
    LastChild,
}

/// Text of a neighbouring node, whether it is a text node or an element.
fn neighbour_text(el: ElementRef, which: Sibling) -> String {
    let node = match which {
        Sibling::Prev => el.prev_sibling(),
        Sibling::Next => el.next_sibling(),
        Sibling::LastChild => el.last_child(),
    };
    node.map(|n| match n.value() {
        Node::Text(t) => {
            let s: &str = t;
            s.to_string()
        }
        Node::Element(_) => ElementRef::wrap(n).map(text_of).unwrap_or_default(),
        _ => String::new(),
    })
    .unwrap_or_default()
    .trim()
    .to_string()
}

fn authors_in(el: ElementRef, sel: &Selector) -> Vec<Author> {
    el.select(sel)
        .map(|a| Author {
            name: text_of(a),
            href: attr_of(a, "href"),
        })
        .collect()
}

// ============================================================================
// URL helpers
// ============================================================================

/// Profile page of a user, asking for the largest publication page.
pub fn profile_url(base_url: &str, user_id: &str) -> Result<String> {
    let mut url = Url::parse(&format!("{}/citations", base_url))?;
    url.query_pairs_mut()
        .append_pair("user", user_id)
        .append_pair("pagesize", &PROFILE_PAGE_SIZE.to_string());
    Ok(url.into())
}

/// Profile page starting at publication row `cstart`.
pub fn profile_page_url(base_url: &str, user_id: &str, cstart: usize) -> Result<String> {
    if cstart == 0 {
        return profile_url(base_url, user_id);
    }
    let mut url = Url::parse(&format!("{}/citations", base_url))?;
    url.query_pairs_mut()
        .append_pair("user", user_id)
        .append_pair("cstart", &cstart.to_string())
        .append_pair("pagesize", &PROFILE_PAGE_SIZE.to_string());
    Ok(url.into())
}

/// Title search URL.
pub fn search_url(base_url: &str, language: &str, title: &str) -> Result<String> {
    let mut url = Url::parse(&format!("{}/scholar", base_url))?;
    url.query_pairs_mut()
        .append_pair("hl", language)
        .append_pair("q", title);
    Ok(url.into())
}

/// Resolve a possibly relative link against the site root.
pub fn absolute_url(base_url: &str, href: &str) -> Result<String> {
    Ok(Url::parse(base_url)?.join(href)?.into())
}

/// The `user` query parameter of a profile URL.
pub fn user_id_from_url(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == "user")
        .map(|(_, v)| v.into_owned())
}

/// URL of the next citing page: bump `start` by `step`, or insert
/// `start=step` as the first parameter when there is none yet.
///
/// The rest of the query string is kept byte-for-byte.
pub fn next_citing_page_url(url: &str, step: usize) -> Result<String> {
    let mut parsed = Url::parse(url)?;
    let query = parsed.query().unwrap_or("");

    let mut pairs: Vec<(String, Option<String>)> = query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('=') {
            Some((k, v)) => (k.to_string(), Some(v.to_string())),
            None => (p.to_string(), None),
        })
        .collect();

    match pairs.iter_mut().find(|(k, _)| k == "start") {
        Some((_, value)) => {
            let current: usize = value
                .as_deref()
                .unwrap_or("0")
                .parse()
                .map_err(|_| ScholarError::Parse(format!("bad start parameter in {}", url)))?;
            let next = current
                .checked_add(step)
                .ok_or_parse(&format!("start parameter overflows in {}", url))?;
            *value = Some(next.to_string());
        }
        None => pairs.insert(0, ("start".to_string(), Some(step.to_string()))),
    }

    let joined = pairs
        .iter()
        .map(|(k, v)| match v {
            Some(v) => format!("{}={}", k, v),
            None => k.clone(),
        })
        .collect::<Vec<_>>()
        .join("&");
    parsed.set_query(Some(&joined));
    Ok(parsed.into())
}

// ============================================================================
// Extraction
// ============================================================================

/// Rows of a fully expanded publication list.
///
/// Links are made absolute against `base_url`; an empty "cited by" link
/// (uncited paper) becomes `None`.
pub fn parse_published_papers(html: &str, base_url: &str) -> Result<Vec<PublishedPaper>> {
    let document = Html::parse_document(html);
    let row_sel = selector("#gsc_a_b > tr")?;
    let title_sel = selector("td.gsc_a_t > a")?;
    let meta_sel = selector("td.gsc_a_t > div")?;
    let cited_sel = selector("td.gsc_a_c > a")?;
    let year_sel = selector("td.gsc_a_y")?;

    let absolute = |href: Option<String>| -> Result<Option<String>> {
        href.map(|h| absolute_url(base_url, &h)).transpose()
    };

    let mut papers = Vec::new();
    for row in document.select(&row_sel) {
        // "There are no articles in this profile." row
        let Some(title_a) = row.select(&title_sel).next() else {
            debug!("Skipping publication row without a title link");
            continue;
        };
        let cited_a = row.select(&cited_sel).next();

        papers.push(PublishedPaper {
            title: text_of(title_a),
            href: absolute(attr_of(title_a, "href"))?,
            metadata: row.select(&meta_sel).map(text_of).collect(),
            cited_count: cited_a.map(text_of).unwrap_or_default(),
            citing_href: absolute(cited_a.and_then(|a| attr_of(a, "href")))?,
            year: row.select(&year_sel).next().map(text_of).unwrap_or_default(),
        });
    }
    Ok(papers)
}

/// Result blocks of one "cited by" page.
pub fn parse_citing_page(html: &str) -> Result<Vec<CitingEntry>> {
    let document = Html::parse_document(html);
    let block_sel = selector("#gs_res_ccl_mid > div")?;
    let title_sel = selector("div.gs_ri > h3 > a")?;
    let author_sel = selector("div.gs_a > a")?;

    let mut entries = Vec::new();
    for block in document.select(&block_sel) {
        let Some(title_a) = block.select(&title_sel).next() else {
            entries.push(CitingEntry::Raw(block.html()));
            continue;
        };
        let paper = CitingPaper {
            title: text_of(title_a),
            href: attr_of(title_a, "href"),
            id: attr_of(title_a, "id"),
            authors: authors_in(block, &author_sel),
        };
        debug!(title = %paper.title, "Citing paper");
        entries.push(CitingEntry::Paper(paper));
    }
    Ok(entries)
}

/// Profile header of an author page.
pub fn parse_author_profile(html: &str, url: &str) -> Result<DetailedAuthor> {
    let document = Html::parse_document(html);
    let name_sel = selector("#gsc_prf_in")?;
    let cited_sel = selector("#gsc_rsb_st > tbody > tr:nth-child(1) > td:nth-child(2)")?;
    let affiliation_sel = selector("#gsc_prf_i > div:nth-child(2)")?;
    let domain_sel = selector("#gsc_prf_ivh")?;
    let link_sel = selector("a")?;

    let name = document
        .select(&name_sel)
        .next()
        .map(text_of)
        .ok_or_parse("profile has no name")?;
    let domain_el = document.select(&domain_sel).next();

    Ok(DetailedAuthor {
        name,
        cited_cnt: document
            .select(&cited_sel)
            .next()
            .map(text_of)
            .unwrap_or_else(|| "0".to_string()),
        affiliation: document
            .select(&affiliation_sel)
            .next()
            .map(text_of)
            .unwrap_or_default(),
        domain: domain_el.map(text_of).unwrap_or_default(),
        profile: domain_el
            .and_then(|d| d.select(&link_sel).next())
            .and_then(|a| attr_of(a, "href")),
        url: url.to_string(),
    })
}

/// Hits of a title search.
pub fn parse_search_results(html: &str) -> Result<Vec<SearchedPaper>> {
    let document = Html::parse_document(html);
    let hit_sel = selector("#gs_res_ccl_mid > div > div.gs_ri")?;
    let title_sel = selector("h3.gs_rt")?;
    let link_sel = selector("a")?;
    let fmaa_sel = selector("div.gs_fmaa")?;
    let fmaa_author_sel = selector("div.gs_fmaa > a")?;
    let gs_a_sel = selector("div.gs_a")?;
    let gs_a_author_sel = selector("div.gs_a > a")?;
    let pdot_sel = selector("span.gs_pdot")?;
    let footer_link_sel = selector("div.gs_fl a")?;
    let third_link_sel = selector("div.gs_fl.gs_flb > a:nth-child(3)")?;
    let cite_regex = Regex::new(r"(?:Cited by|被引用次数|被引用)\s*[：:]?\s*(\d+)")
        .map_err(|e| ScholarError::Parse(e.to_string()))?;

    let mut results = Vec::new();
    for hit in document.select(&hit_sel) {
        let Some(title_h3) = hit.select(&title_sel).next() else {
            continue;
        };

        let mut authors = authors_in(hit, &fmaa_author_sel);
        if authors.is_empty() {
            authors = authors_in(hit, &gs_a_author_sel);
        }

        let gs_a = hit.select(&gs_a_sel).next();
        let authors_raw = hit
            .select(&fmaa_sel)
            .next()
            .or(gs_a)
            .map(text_of)
            .unwrap_or_default();

        let metadata = match hit.select(&pdot_sel).next() {
            Some(pdot) => vec![
                neighbour_text(pdot, Sibling::Prev),
                neighbour_text(pdot, Sibling::Next),
            ],
            None => gs_a
                .map(|a| vec![neighbour_text(a, Sibling::LastChild)])
                .unwrap_or_default(),
        };

        // Prefer the link that points at the citing list; fall back to the
        // third footer link, which is where it sits in the usual layout.
        let cited_count = hit
            .select(&footer_link_sel)
            .filter(|a| a.value().attr("href").is_some_and(|h| h.contains("cites=")))
            .find_map(|a| {
                cite_regex
                    .captures(&text_of(a))
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
            })
            .or_else(|| hit.select(&third_link_sel).next().map(text_of))
            .unwrap_or_default();

        results.push(SearchedPaper {
            title: text_of(title_h3),
            href: title_h3.select(&link_sel).next().and_then(|a| attr_of(a, "href")),
            authors,
            authors_raw,
            metadata,
            cited_count,
        });
    }
    Ok(results)
}

fn has_more_rows(html: &str) -> Result<bool> {
    let document = Html::parse_document(html);
    Ok(document
        .select(&selector(&format!("{}:not([disabled])", MORE_BUTTON))?)
        .next()
        .is_some())
}

// ============================================================================
// Scrape calls
// ============================================================================

/// All pages of a "cited by" list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitingList {
    pub entries: Vec<CitingEntry>,
    /// URLs of the pages that were read, in order
    pub pages: Vec<String>,
}

/// Scrape calls over one session, each memoized on disk.
pub struct Scholar<D, P> {
    session: Session<D, P>,
    cache: ResultCache,
    config: ScholarConfig,
}

impl<D: Driver, P: Prompter> Scholar<D, P> {
    pub fn new(driver: D, prompter: P, config: ScholarConfig) -> Result<Self> {
        config.validate()?;
        let cache = if config.cache_enabled {
            ResultCache::new(&config.cache_dir)
        } else {
            ResultCache::disabled()
        };
        Ok(Self {
            session: Session::new(driver, prompter, &config),
            cache,
            config,
        })
    }

    pub fn config(&self) -> &ScholarConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn session(&self) -> &Session<D, P> {
        &self.session
    }

    /// Every publication of `user_id`, after expanding the list.
    pub async fn get_published_papers(&mut self, user_id: &str) -> Result<Vec<PublishedPaper>> {
        let cache = self.cache.clone();
        cache
            .memoize(GET_PUBLISHED_PAPERS, user_id, self.fetch_published_papers(user_id))
            .await
    }

    async fn fetch_published_papers(&mut self, user_id: &str) -> Result<Vec<PublishedPaper>> {
        let url = profile_url(&self.config.base_url, user_id)?;
        self.session.open(&url, PROFILE_READY).await?;
        self.session.expand(MORE_BUTTON).await?;
        let mut html = self.session.content().await?;
        let mut papers = parse_published_papers(&html, &self.config.base_url)?;

        // The button is still live when the driver cannot click it
        let mut pages = 1;
        while has_more_rows(&html)? {
            if pages >= MAX_PROFILE_PAGES {
                warn!(user_id, pages, "Stopping publication paging at the page limit");
                break;
            }
            let url = profile_page_url(&self.config.base_url, user_id, papers.len())?;
            html = self.session.open(&url, PROFILE_READY).await?;
            let page = parse_published_papers(&html, &self.config.base_url)?;
            if page.is_empty() {
                break;
            }
            debug!(user_id, cstart = papers.len(), rows = page.len(), "Fetched publication page");
            papers.extend(page);
            pages += 1;
        }
        info!(user_id, count = papers.len(), "Fetched publication list");
        Ok(papers)
    }

    /// One page of a "cited by" list.
    pub async fn cur_citing_papers(&mut self, url: &str) -> Result<Vec<CitingEntry>> {
        let cache = self.cache.clone();
        cache
            .memoize(CUR_CITING_PAPERS, url, self.fetch_citing_page(url))
            .await
    }

    async fn fetch_citing_page(&mut self, url: &str) -> Result<Vec<CitingEntry>> {
        let html = self.session.open(url, RESULTS_READY).await?;
        let entries = parse_citing_page(&html)?;
        debug!(url, count = entries.len(), "Fetched citing page");
        Ok(entries)
    }

    /// Walk a "cited by" list until a page comes back short.
    pub async fn get_citing_papers(&mut self, citing_href: &str) -> Result<CitingList> {
        let page_size = self.config.page_size;
        let mut list = CitingList::default();
        let mut url = citing_href.to_string();

        loop {
            let page = self.cur_citing_papers(&url).await?;
            let count = page.len();
            list.entries.extend(page);
            list.pages.push(url.clone());

            if count < page_size {
                break;
            }
            if list.pages.len() >= MAX_CITING_PAGES {
                warn!(citing_href, pages = list.pages.len(), "Stopping at the result limit");
                break;
            }
            url = next_citing_page_url(&url, page_size)?;
        }

        info!(
            citing_href,
            pages = list.pages.len(),
            entries = list.entries.len(),
            "Fetched citing list"
        );
        Ok(list)
    }

    /// Forget the cached pages of a citing list so it is read again.
    pub fn invalidate_citing_list(&self, list: &CitingList) -> Result<usize> {
        let mut removed = 0;
        for page in &list.pages {
            if self.cache.invalidate(CUR_CITING_PAPERS, page.as_str())? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Profile metadata of the author at `author_url`.
    pub async fn get_author(&mut self, author_url: &str) -> Result<DetailedAuthor> {
        let cache = self.cache.clone();
        cache
            .memoize(GET_AUTHOR, author_url, self.fetch_author(author_url))
            .await
    }

    async fn fetch_author(&mut self, author_url: &str) -> Result<DetailedAuthor> {
        let html = self.session.open(author_url, PROFILE_READY).await?;
        let author = parse_author_profile(&html, author_url)?;
        debug!(name = %author.name, url = author_url, "Fetched author");
        Ok(author)
    }

    /// Search hits for a paper title.
    pub async fn get_papers(&mut self, title: &str) -> Result<Vec<SearchedPaper>> {
        let cache = self.cache.clone();
        cache
            .memoize(GET_PAPERS, title, self.fetch_papers(title))
            .await
    }

    async fn fetch_papers(&mut self, title: &str) -> Result<Vec<SearchedPaper>> {
        let url = search_url(&self.config.base_url, &self.config.language, title)?;
        let html = self.session.open(&url, RESULTS_READY).await?;
        let papers = parse_search_results(&html)?;
        debug!(title, count = papers.len(), "Searched title");
        Ok(papers)
    }

    /// Close the browser session.
    pub async fn quit(&mut self) -> Result<()> {
        self.session.close().await
    }
}
