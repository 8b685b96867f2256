// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crawlmesh::domain::models::result_document::ExtractionMode;
use crawlmesh::engines::extraction::PageExtractor;
use crawlmesh::engines::reqwest_engine::StaticFetcher;
use crawlmesh::engines::router::FetchRouter;
use crawlmesh::engines::traits::{FetchError, Fetcher, NavigationConfig};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE: &str = r#"<html>
  <head><title>Example Domain</title></head>
  <body>
    <h1>Example</h1>
    <p>This domain is for use in examples.</p>
    <a href="/more">More</a>
    <a href="https://other.test/">Elsewhere</a>
  </body>
</html>"#;

fn fetcher(selectors: &[String]) -> StaticFetcher {
    let config = NavigationConfig {
        timeout: Duration::from_secs(5),
        max_retries: 2,
        backoff_base: Duration::from_millis(10),
        ..NavigationConfig::default()
    };
    StaticFetcher::new(&config, Arc::new(PageExtractor::new(selectors).unwrap())).unwrap()
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html; charset=utf-8")
}

#[tokio::test]
async fn test_fetches_and_extracts_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html(PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let page = fetcher(&[])
        .fetch(&format!("{}/page", server.uri()))
        .await
        .unwrap();

    assert_eq!(page.status_code, 200);
    assert_eq!(page.title.as_deref(), Some("Example Domain"));
    assert!(page.text.contains("Example This domain is for use in examples."));
    assert_eq!(page.links, vec!["/more", "https://other.test/"]);
    assert_eq!(page.mode, ExtractionMode::Static);
    assert!(page.html.contains("<h1>Example</h1>"));
}

#[tokio::test]
async fn test_selective_extraction_keeps_all_links() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html(PAGE))
        .mount(&server)
        .await;

    let page = fetcher(&["p".to_string()])
        .fetch(&format!("{}/page", server.uri()))
        .await
        .unwrap();

    assert_eq!(page.text, "This domain is for use in examples.");
    assert_eq!(page.links.len(), 2);
}

#[tokio::test]
async fn test_not_found_is_permanent_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let error = fetcher(&[])
        .fetch(&format!("{}/gone", server.uri()))
        .await
        .unwrap_err();

    assert_eq!(error, FetchError::Status(404));
    assert!(error.is_permanent());
}

#[tokio::test]
async fn test_server_errors_are_retried_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(html(PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let page = fetcher(&[])
        .fetch(&format!("{}/flaky", server.uri()))
        .await
        .unwrap();
    assert_eq!(page.title.as_deref(), Some("Example Domain"));
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let error = fetcher(&[])
        .fetch(&format!("{}/down", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(error, FetchError::Status(500));
    assert!(error.is_retryable());
}

#[tokio::test]
async fn test_non_html_content_is_unsupported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"),
        )
        .mount(&server)
        .await;

    let error = fetcher(&[])
        .fetch(&format!("{}/report.pdf", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(error, FetchError::UnsupportedContent(ref ct) if ct == "application/pdf"));
}

#[tokio::test]
async fn test_router_returns_static_page_when_available() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html(PAGE))
        .mount(&server)
        .await;

    let router = FetchRouter::new(vec![Arc::new(fetcher(&[]))]);
    let page = router
        .fetch(&format!("{}/page", server.uri()))
        .await
        .unwrap();
    assert_eq!(page.mode, ExtractionMode::Static);
}
