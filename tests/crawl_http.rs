//! Mock-server tests for the crawl pipeline over the HTTP driver.

use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gscholar_citing::driver::HttpDriver;
use gscholar_citing::models::{CitingReportEntry, PublishedPaper};
use gscholar_citing::pipeline::{collect_author_urls, crawl, resolve_authors, CrawlOptions};
use gscholar_citing::scholar::{Scholar, GET_PUBLISHED_PAPERS};
use gscholar_citing::session::NeverRetry;
use gscholar_citing::{ScholarConfig, ScholarError};

fn scholar(server: &MockServer, cache: &TempDir) -> Scholar<HttpDriver, NeverRetry> {
    let config = ScholarConfig::for_testing(&server.uri(), cache.path().to_path_buf());
    let driver = HttpDriver::new(None, None).expect("http client");
    Scholar::new(driver, NeverRetry, config).expect("valid config")
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8")
}

fn profile(cited: usize) -> String {
    format!(
        r#"<html><body><div id="gsc_prf_i"><div id="gsc_prf_in">Ada</div><div class="gsc_prf_il">Engines</div></div>
<table id="gsc_a_t"><tbody id="gsc_a_b"><tr class="gsc_a_tr">
<td class="gsc_a_t"><a href="/citations?view_op=view_citation&amp;citation_for_view=ada:1">Notes</a><div class="gs_gray">A Lovelace</div></td>
<td class="gsc_a_c"><a href="/scholar?oi=bibs&amp;hl=en&amp;cites=111">{cited}</a></td>
<td class="gsc_a_y"><span>1843</span></td>
</tr></tbody></table>
<button id="gsc_bpf_more" disabled>Show more</button></body></html>"#
    )
}

fn citing_page(first: usize, count: usize) -> String {
    let blocks: String = (first..first + count)
        .map(|i| {
            format!(
                r#"<div class="gs_r gs_or gs_scl"><div class="gs_ri"><h3 class="gs_rt"><a id="c{i}" href="https://example.org/p{i}">Citing Paper {i}</a></h3><div class="gs_a"><a href="/citations?user=U{i}&amp;hl=en&amp;oi=sra">Author {i}</a> - Venue, 2020</div></div></div>"#
            )
        })
        .collect();
    format!(r#"<html><body><div id="gs_res_ccl_mid">{}</div></body></html>"#, blocks)
}

fn author_page(name: &str) -> String {
    format!(
        r#"<html><body><div id="gsc_prf_i"><div id="gsc_prf_in">{name}</div><div class="gsc_prf_il">University</div><div class="gsc_prf_il" id="gsc_prf_ivh">Verified email</div></div></body></html>"#
    )
}

async fn mount_profile(server: &MockServer, cited: usize, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/citations"))
        .and(query_param("user", "ada"))
        .and(query_param("pagesize", "100"))
        .respond_with(html(profile(cited)))
        .expect(expected)
        .mount(server)
        .await;
}

// =============================================================================
// Crawl
// =============================================================================

#[tokio::test]
async fn test_crawl_walks_pages_and_resolves_authors() {
    let server = MockServer::start().await;
    let cache = TempDir::new().expect("temp dir");

    mount_profile(&server, 12, 1).await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .and(query_param("cites", "111"))
        .and(query_param_is_missing("start"))
        .respond_with(html(citing_page(0, 10)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .and(query_param("cites", "111"))
        .and(query_param("start", "10"))
        .respond_with(html(citing_page(10, 2)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/citations"))
        .and(query_param("oi", "sra"))
        .respond_with(html(author_page("Someone")))
        .expect(12)
        .mount(&server)
        .await;

    let options = CrawlOptions {
        search: false,
        ..CrawlOptions::default()
    };

    let mut first = scholar(&server, &cache);
    let report = crawl(&mut first, "ada", &options).await.expect("crawl");
    assert_eq!(report.papers.len(), 1);
    assert_eq!(report.citing_count(), 12);

    let CitingReportEntry::Paper(last) = &report.papers[0].citing_papers[11] else {
        panic!("expected a linked paper");
    };
    assert_eq!(last.title, "Citing Paper 11");
    assert_eq!(
        last.authors[0].detail.as_ref().map(|d| d.name.as_str()),
        Some("Someone")
    );

    // Same cache, fresh session: every call is a hit
    let mut second = scholar(&server, &cache);
    let again = crawl(&mut second, "ada", &options).await.expect("cached crawl");
    assert_eq!(again.papers, report.papers);
    assert_eq!(second.session().navigations(), 0);
}

#[tokio::test]
async fn test_count_mismatch_reads_list_again() {
    let server = MockServer::start().await;
    let cache = TempDir::new().expect("temp dir");

    mount_profile(&server, 3, 1).await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .and(query_param("cites", "111"))
        .respond_with(html(citing_page(0, 2)))
        .expect(2)
        .mount(&server)
        .await;

    let options = CrawlOptions {
        search: false,
        resolve_authors: false,
        verify_counts: true,
    };
    let mut scholar = scholar(&server, &cache);
    let report = crawl(&mut scholar, "ada", &options).await.expect("crawl");
    assert_eq!(report.citing_count(), 2);
}

#[tokio::test]
async fn test_publication_list_paged_with_cstart() {
    let server = MockServer::start().await;
    let cache = TempDir::new().expect("temp dir");

    Mock::given(method("GET"))
        .and(path("/citations"))
        .and(query_param("user", "ada"))
        .and(query_param_is_missing("cstart"))
        .respond_with(html(profile(4).replace(" disabled>", ">")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/citations"))
        .and(query_param("user", "ada"))
        .and(query_param("cstart", "1"))
        .respond_with(html(profile(7)))
        .expect(1)
        .mount(&server)
        .await;

    let mut scholar = scholar(&server, &cache);
    let papers = scholar.get_published_papers("ada").await.expect("papers");
    assert_eq!(papers.len(), 2);
    assert_eq!(papers[1].cited_count, "7");
}

#[tokio::test]
async fn test_list_past_result_limit_is_not_read_again() {
    let server = MockServer::start().await;
    let cache = TempDir::new().expect("temp dir");

    mount_profile(&server, 1500, 1).await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .and(query_param("cites", "111"))
        .respond_with(html(citing_page(0, 10)))
        .expect(100)
        .mount(&server)
        .await;

    let options = CrawlOptions {
        search: false,
        resolve_authors: false,
        verify_counts: true,
    };
    let mut first = scholar(&server, &cache);
    let report = crawl(&mut first, "ada", &options).await.expect("crawl");
    assert_eq!(report.citing_count(), 1000);
    assert_eq!(first.session().navigations(), 101);

    let mut second = scholar(&server, &cache);
    crawl(&mut second, "ada", &options).await.expect("cached crawl");
    assert_eq!(second.session().navigations(), 0);
}

#[tokio::test]
async fn test_search_hits_attached_to_citing_paper() {
    let server = MockServer::start().await;
    let cache = TempDir::new().expect("temp dir");

    mount_profile(&server, 1, 1).await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .and(query_param("cites", "111"))
        .respond_with(html(citing_page(0, 1)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .and(query_param("q", "Citing Paper 0"))
        .and(query_param("hl", "zh-CN"))
        .respond_with(html(
            r##"<html><body><div id="gs_res_ccl_mid"><div class="gs_r"><div class="gs_ri">
<h3 class="gs_rt"><a href="https://example.org/p0">Citing Paper 0</a></h3>
<div class="gs_a"><a href="/citations?user=U0&amp;hl=en&amp;oi=sra">Author 0</a> - Venue, 2020 - example.org</div>
<div class="gs_fl gs_flb"><a href="#">Save</a><a href="#">Cite</a><a href="/scholar?cites=5">Cited by 5</a></div>
</div></div></div></body></html>"##
                .to_string(),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let options = CrawlOptions {
        resolve_authors: false,
        ..CrawlOptions::default()
    };
    let mut scholar = scholar(&server, &cache);
    let report = crawl(&mut scholar, "ada", &options).await.expect("crawl");

    let CitingReportEntry::Paper(citing) = &report.papers[0].citing_papers[0] else {
        panic!("expected a linked paper");
    };
    assert_eq!(citing.searched.len(), 1);
    assert_eq!(citing.searched[0].cited_count, "5");
    assert_eq!(citing.searched[0].authors[0].name, "Author 0");
}

#[tokio::test]
async fn test_unready_page_cancels_and_is_not_cached() {
    let server = MockServer::start().await;
    let cache = TempDir::new().expect("temp dir");

    Mock::given(method("GET"))
        .and(path("/citations"))
        .respond_with(html("<html><body>Please wait</body></html>".to_string()))
        .mount(&server)
        .await;

    let mut scholar = scholar(&server, &cache);
    let err = crawl(&mut scholar, "ada", &CrawlOptions::default())
        .await
        .expect_err("operator cannot retry");
    assert!(matches!(err, ScholarError::Cancelled(_)));

    let cached: Option<Vec<PublishedPaper>> = scholar
        .cache()
        .get(GET_PUBLISHED_PAPERS, "ada")
        .expect("cache readable");
    assert!(cached.is_none());
}

// =============================================================================
// Author index
// =============================================================================

#[tokio::test]
async fn test_resolve_authors_skips_missing_profiles() {
    let server = MockServer::start().await;
    let cache = TempDir::new().expect("temp dir");

    mount_profile(&server, 2, 1).await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .and(query_param("cites", "111"))
        .respond_with(html(citing_page(0, 2)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/citations"))
        .and(query_param("user", "U0"))
        .respond_with(html(author_page("Zero")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/citations"))
        .and(query_param("user", "U1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let options = CrawlOptions {
        search: false,
        resolve_authors: false,
        verify_counts: true,
    };
    let mut scholar = scholar(&server, &cache);
    let report = crawl(&mut scholar, "ada", &options).await.expect("crawl");

    let urls = collect_author_urls(&report, &server.uri()).expect("author urls");
    assert_eq!(urls.len(), 2);

    let index = resolve_authors(&mut scholar, &urls).await.expect("index");
    assert_eq!(index.len(), 1);
    assert_eq!(index.get("U0").map(|a| a.name.as_str()), Some("Zero"));
}
