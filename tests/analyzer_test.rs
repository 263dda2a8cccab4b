//! Analyzer tests: URL admission rules and a full analysis against a mock
//! HTTP server.

use std::time::Duration;

use crawlq::analyzer::{Analyzer, AnalyzerConfig, HttpAnalyzer, validate_url};
use crawlq::error::Error;
use tokio::net::TcpListener;

const PAGE: &str = r##"<!DOCTYPE html>
<html>
<head><title>  Fixture
  Page </title></head>
<body>
  <h1>Main</h1>
  <h2>One</h2><h2 class="x">Two</h2>
  <a href="/about">About</a>
  <a href="/missing">Gone</a>
  <a href="#top">Top</a>
  <a href="https://external.example.org/page">Elsewhere</a>
  <form><input type="password" name="pw"></form>
</body>
</html>"##;

/// Mock site: the fixture page, one healthy and one missing link, and a
/// page that fails with a server error.
async fn site() -> (mockito::ServerGuard, Vec<mockito::Mock>) {
    let mut server = mockito::Server::new_async().await;
    let mocks = vec![
        server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(PAGE)
            .create_async()
            .await,
        server
            .mock("HEAD", "/about")
            .with_status(200)
            .expect(1)
            .create_async()
            .await,
        server
            .mock("HEAD", "/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await,
        server
            .mock("GET", "/broken")
            .with_status(500)
            .with_body("oops")
            .create_async()
            .await,
    ];
    (server, mocks)
}

fn analyzer(max_links_to_check: usize) -> HttpAnalyzer {
    HttpAnalyzer::new(AnalyzerConfig {
        timeout: Duration::from_secs(5),
        user_agent: "crawlq-test".to_string(),
        max_links_to_check,
    })
    .unwrap()
}

#[test]
fn validate_accepts_http_and_https() {
    assert!(validate_url("http://example.com").is_ok());
    assert!(validate_url("https://example.com/path?q=1").is_ok());
}

#[test]
fn validate_rejects_bad_targets() {
    for url in [
        "",
        "example.com",
        "mailto:someone@example.com",
        "javascript:alert(1)",
        "https://example.com/?next=JavaScript:alert(1)",
        "https://example.com/?img=DATA:text/html,hi",
        "https://example.com/file:///etc/passwd",
        "http://example.com/?mirror=FTP://example.org",
    ] {
        let err = validate_url(url).unwrap_err();
        assert!(matches!(err, Error::InvalidTarget(_)), "{url:?} gave {err}");
    }
}

#[test]
fn validation_errors_name_the_problem() {
    assert_eq!(
        validate_url("").unwrap_err().to_string(),
        "invalid URL: URL cannot be empty"
    );
    assert!(
        validate_url("ws://example.com")
            .unwrap_err()
            .to_string()
            .contains("http:// or https://")
    );
}

#[tokio::test]
async fn analyzes_page_and_probes_links() {
    let (server, mocks) = site().await;
    let url = format!("{}/", server.url());

    let result = analyzer(2).analyze(&url).await.unwrap();

    assert_eq!(result.url, url);
    assert_eq!(result.title, "Fixture Page");
    assert_eq!(result.html_version, "HTML5");
    assert_eq!(result.heading_counts.h1, 1);
    assert_eq!(result.heading_counts.h2, 2);
    assert!(result.has_login_form);
    assert_eq!(result.internal_links_count, 3);
    assert_eq!(result.external_links_count, 1);
    assert_eq!(
        result.external_links,
        vec!["https://external.example.org/page".to_string()]
    );

    // Only the two internal links fit the probe budget.
    assert_eq!(result.inaccessible_links_count, 1);
    assert_eq!(result.broken_links.len(), 1);
    assert!(result.broken_links[0].url.ends_with("/missing"));
    assert_eq!(result.broken_links[0].status_code, 404);
    assert_eq!(result.broken_links[0].status_text, "Not Found");

    for mock in &mocks[1..3] {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn http_error_status_fails_analysis() {
    let (server, _mocks) = site().await;

    let err = analyzer(0)
        .analyze(&format!("{}/broken", server.url()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Analysis(_)));
    assert_eq!(err.to_string(), "page returned HTTP 500");
}

#[tokio::test]
async fn unreachable_host_fails_analysis() {
    // Bind then drop to get a port nothing listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let err = analyzer(0)
        .analyze(&format!("http://{addr}/"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Http(_)));
}
