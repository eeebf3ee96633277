//! JSON and CSV output files.

use crate::error::Result;
use crate::models::{CitingReport, CitingReportEntry};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Write `value` as pretty-printed UTF-8 JSON.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    info!(path = ?path, "Saved JSON");
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// One citing paper per row.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CitingRow {
    pub published_title: String,
    pub published_year: String,
    pub cited_count: String,
    pub citing_title: String,
    pub citing_href: String,
    pub citing_id: String,
    pub authors: String,
    pub searched_hits: usize,
}

/// Flatten a report; citation-only blocks are left out.
pub fn citing_rows(report: &CitingReport) -> Vec<CitingRow> {
    let mut rows = Vec::new();
    for paper in &report.papers {
        for entry in &paper.citing_papers {
            let CitingReportEntry::Paper(citing) = entry else {
                continue;
            };
            rows.push(CitingRow {
                published_title: paper.paper.title.clone(),
                published_year: paper.paper.year.clone(),
                cited_count: paper.paper.cited_count.clone(),
                citing_title: citing.title.clone(),
                citing_href: citing.href.clone().unwrap_or_default(),
                citing_id: citing.id.clone().unwrap_or_default(),
                authors: citing
                    .authors
                    .iter()
                    .map(|a| a.name.as_str())
                    .collect::<Vec<_>>()
                    .join("; "),
                searched_hits: citing.searched.len(),
            });
        }
    }
    rows
}

/// Save data to CSV file
pub fn save_csv<T: Serialize>(path: &Path, data: &[T]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_path(path)?;
    for item in data {
        wtr.serialize(item)?;
    }
    wtr.flush()?;
    info!(path = ?path, rows = data.len(), "Saved CSV");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaperReport, PublishedPaper, ResolvedAuthor, ResolvedCitingPaper};
    use tempfile::TempDir;

    fn report() -> CitingReport {
        CitingReport {
            user_id: "ada".into(),
            generated_at: "2026-10-16T00:00:00+00:00".into(),
            papers: vec![PaperReport {
                paper: PublishedPaper {
                    title: "Notes".into(),
                    href: None,
                    metadata: vec!["A Lovelace".into()],
                    cited_count: "2".into(),
                    citing_href: Some("https://scholar.test/scholar?cites=1".into()),
                    year: "1843".into(),
                },
                citing_papers: vec![
                    CitingReportEntry::Paper(ResolvedCitingPaper {
                        title: "Über Maschinen".into(),
                        href: Some("https://example.org/1".into()),
                        id: Some("c1".into()),
                        authors: vec![
                            ResolvedAuthor { name: "A".into(), href: None, detail: None },
                            ResolvedAuthor { name: "B".into(), href: None, detail: None },
                        ],
                        searched: vec![],
                    }),
                    CitingReportEntry::Raw("<div>[CITATION]</div>".into()),
                ],
            }],
        }
    }

    #[test]
    fn test_citing_rows_skip_raw_blocks() {
        let rows = citing_rows(&report());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].authors, "A; B");
        assert_eq!(rows[0].published_title, "Notes");
        assert_eq!(rows[0].citing_id, "c1");
    }

    #[test]
    fn test_json_keeps_non_ascii() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("out").join("citing_papers.json");
        save_json(&path, &report())?;

        let text = std::fs::read_to_string(&path)?;
        assert!(text.contains("Über Maschinen"));
        let loaded: CitingReport = load_json(&path)?;
        assert_eq!(loaded, report());
        Ok(())
    }

    #[test]
    fn test_save_csv() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("citing.csv");
        save_csv(&path, &citing_rows(&report()))?;

        let text = std::fs::read_to_string(&path)?;
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("published_title,published_year,cited_count,citing_title,citing_href,citing_id,authors,searched_hits")
        );
        assert!(lines.next().is_some_and(|l| l.contains("Über Maschinen")));
        Ok(())
    }
}
