//! Records extracted from scholar pages.
//!
//! Every record is flat and created once per scrape call. Optional fields are
//! `None` when their selector is absent from the page.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shallow author reference as it appears under a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub href: Option<String>,
}

/// Profile-page metadata of an author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedAuthor {
    pub name: String,
    /// Total citations, `"0"` when the profile has no citation table
    pub cited_cnt: String,
    #[serde(rename = "affliation")]
    pub affiliation: String,
    /// Verified email / research domain line
    pub domain: String,
    /// Homepage linked from the domain line
    pub profile: Option<String>,
    /// Profile URL the record was scraped from
    pub url: String,
}

/// One row of an author's own publication list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPaper {
    pub title: String,
    pub href: Option<String>,
    /// Author line and venue line, in page order
    pub metadata: Vec<String>,
    pub cited_count: String,
    /// Link to the "cited by" list, absent for uncited papers
    pub citing_href: Option<String>,
    pub year: String,
}

impl PublishedPaper {
    /// Cited count as a number; blank counts mean zero.
    pub fn cited_count_value(&self) -> Option<usize> {
        parse_count(&self.cited_count)
    }
}

/// A paper in a "cited by" list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitingPaper {
    pub title: String,
    pub href: Option<String>,
    /// Result id, only unique within one page
    pub id: Option<String>,
    pub authors: Vec<Author>,
}

/// A result block of a "cited by" page.
///
/// Blocks without a title link (citation-only entries) are kept as their raw
/// markup so the page still counts toward the page size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CitingEntry {
    Raw(String),
    Paper(CitingPaper),
}

impl CitingEntry {
    pub fn as_paper(&self) -> Option<&CitingPaper> {
        match self {
            CitingEntry::Paper(p) => Some(p),
            CitingEntry::Raw(_) => None,
        }
    }
}

/// A result of a title search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchedPaper {
    pub title: String,
    pub href: Option<String>,
    pub authors: Vec<Author>,
    /// Full text of the author/venue line
    pub authors_raw: String,
    pub metadata: Vec<String>,
    pub cited_count: String,
}

/// Author reference with its profile resolved where possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAuthor {
    pub name: String,
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub detail: Option<DetailedAuthor>,
}

impl From<Author> for ResolvedAuthor {
    fn from(a: Author) -> Self {
        Self {
            name: a.name,
            href: a.href,
            detail: None,
        }
    }
}

/// Search hit attached to a citing paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSearchedPaper {
    pub title: String,
    pub href: Option<String>,
    pub authors: Vec<ResolvedAuthor>,
    pub authors_raw: String,
    pub metadata: Vec<String>,
    pub cited_count: String,
}

impl From<SearchedPaper> for ResolvedSearchedPaper {
    fn from(p: SearchedPaper) -> Self {
        Self {
            title: p.title,
            href: p.href,
            authors: p.authors.into_iter().map(ResolvedAuthor::from).collect(),
            authors_raw: p.authors_raw,
            metadata: p.metadata,
            cited_count: p.cited_count,
        }
    }
}

/// Citing paper with its search hits and resolved authors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCitingPaper {
    pub title: String,
    pub href: Option<String>,
    pub id: Option<String>,
    pub authors: Vec<ResolvedAuthor>,
    #[serde(default)]
    pub searched: Vec<ResolvedSearchedPaper>,
}

impl From<CitingPaper> for ResolvedCitingPaper {
    fn from(p: CitingPaper) -> Self {
        Self {
            title: p.title,
            href: p.href,
            id: p.id,
            authors: p.authors.into_iter().map(ResolvedAuthor::from).collect(),
            searched: Vec::new(),
        }
    }
}

/// Entry of a report's citing list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CitingReportEntry {
    Raw(String),
    Paper(ResolvedCitingPaper),
}

/// A published paper and everything that cites it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperReport {
    #[serde(flatten)]
    pub paper: PublishedPaper,
    #[serde(default)]
    pub citing_papers: Vec<CitingReportEntry>,
}

/// Output of a crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitingReport {
    pub user_id: String,
    pub generated_at: String,
    pub papers: Vec<PaperReport>,
}

impl CitingReport {
    /// Number of parsed citing papers across all published papers.
    pub fn citing_count(&self) -> usize {
        self.papers
            .iter()
            .flat_map(|p| &p.citing_papers)
            .filter(|e| matches!(e, CitingReportEntry::Paper(_)))
            .count()
    }
}

/// Resolved authors keyed by their `user` id.
pub type AuthorIndex = BTreeMap<String, DetailedAuthor>;

/// Parse a displayed count ("1,234", "", "12*") into a number.
pub fn parse_count(text: &str) -> Option<usize> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        if text.trim().is_empty() {
            return Some(0);
        }
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("1,234"), Some(1234));
        assert_eq!(parse_count(""), Some(0));
        assert_eq!(parse_count(" 7 "), Some(7));
        assert_eq!(parse_count("n/a"), None);
    }

    #[test]
    fn test_citing_entry_untagged() {
        let raw: CitingEntry =
            serde_json::from_str(r#""<div>no link</div>""#).expect("raw entry");
        assert!(raw.as_paper().is_none());

        let paper: CitingEntry = serde_json::from_str(
            r#"{"title":"T","href":null,"id":"x1","authors":[{"name":"A","href":"/citations?user=a"}]}"#,
        )
        .expect("paper entry");
        assert_eq!(paper.as_paper().map(|p| p.authors.len()), Some(1));
    }

    #[test]
    fn test_detailed_author_field_names() {
        let author = DetailedAuthor {
            name: "Ada".into(),
            cited_cnt: "0".into(),
            affiliation: "Analytical Engines".into(),
            domain: "math".into(),
            profile: None,
            url: "https://scholar.google.com/citations?user=ada".into(),
        };
        let json = serde_json::to_value(&author).expect("serialize");
        assert_eq!(json["affliation"], "Analytical Engines");
        assert!(json["profile"].is_null());
    }

    #[test]
    fn test_paper_report_flattens_paper() {
        let report = PaperReport {
            paper: PublishedPaper {
                title: "P".into(),
                href: None,
                metadata: vec![],
                cited_count: "".into(),
                citing_href: None,
                year: "2020".into(),
            },
            citing_papers: vec![CitingReportEntry::Raw("<div/>".into())],
        };
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["title"], "P");
        assert_eq!(json["citing_papers"][0], "<div/>");
    }
}
