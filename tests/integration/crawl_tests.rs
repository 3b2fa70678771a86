//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the listing site and run the
//! full crawl cycle end-to-end over HTTP into a SQLite store.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use vehicle_crawl::browser::HttpBrowser;
use vehicle_crawl::config::{Config, CrawlerConfig, SiteConfig, StoreConfig};
use vehicle_crawl::crawler::run_crawl;
use vehicle_crawl::output::RunSummary;
use vehicle_crawl::state::StopReason;
use vehicle_crawl::storage::{open_store, SnapshotStore, SqliteStore};
use vehicle_crawl::{canonical_id, CrawlError, FetchError};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const CAMRY_PATH: &str = "/new-cars/toyota-camry-2024";
const CIVIC_PATH: &str = "/new-cars/honda-civic-2024";

/// Creates a test configuration pointed at a mock site
fn create_test_config(base_url: &str, store_uri: &str) -> Config {
    Config {
        site: SiteConfig {
            base_url: base_url.to_string(),
            user_agent: "TestBot/1.0".to_string(),
        },
        crawler: CrawlerConfig {
            max_pages: None,
            concurrency: 2,
            skip_existing: false,
            request_timeout_ms: 5_000,
            settle_ms: 0,
            max_retries: 1,
            retry_backoff_ms: 1, // Very short for testing
            repeat_interval_hours: None,
        },
        store: StoreConfig {
            connection_uri: store_uri.to_string(),
            database_name: "vehicles".to_string(),
            collection: "new_cars".to_string(),
        },
    }
}

fn html(status: u16, body: &str) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .set_body_string(body.to_string())
        .insert_header("content-type", "text/html; charset=utf-8")
}

async fn mount_listing(server: &MockServer, page: u32, body: &str) {
    Mock::given(method("GET"))
        .and(path("/new-cars/search"))
        .and(query_param("page", page.to_string()))
        .respond_with(html(200, body))
        .mount(server)
        .await;
}

async fn mount_detail(server: &MockServer, detail_path: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(detail_path))
        .respond_with(html(200, body))
        .mount(server)
        .await;
}

/// Mounts the two-car site: page 1 lists Camry and Civic, page 2 is empty
async fn mount_two_car_site(server: &MockServer) {
    mount_listing(
        server,
        1,
        &format!(
            r#"<html><body>
                <nav><a href="/new-cars/search?page=2">Next</a></nav>
                <div class="mt-4 flex w-full flex-col flex-wrap">
                    <div class="card"><a href="{}">Toyota Camry</a></div>
                    <div class="card"><a href="{}?utm_source=grid">Honda Civic</a></div>
                </div>
            </body></html>"#,
            CAMRY_PATH, CIVIC_PATH
        ),
    )
    .await;
    mount_listing(
        server,
        2,
        "<html><body><p>No cars match your search</p></body></html>",
    )
    .await;
    mount_detail(
        server,
        CAMRY_PATH,
        r#"<html><body>
            <div id="overview-panel"><h1>Toyota Camry 2024</h1></div>
            <div><p>Starting from SAR 125,000</p></div>
        </body></html>"#,
    )
    .await;
    mount_detail(
        server,
        CIVIC_PATH,
        "<html><body><h1>Honda Civic 2024</h1><span>SAR 99,900</span></body></html>",
    )
    .await;
}

async fn crawl(config: &Config, store: &SqliteStore) -> Result<RunSummary, CrawlError> {
    let browser = HttpBrowser::new(
        config.site.user_agent.clone(),
        Duration::from_millis(config.crawler.request_timeout_ms),
    );
    run_crawl(config, Arc::new(browser), Arc::new(store.clone())).await
}

fn detail_id(server: &MockServer, detail_path: &str) -> String {
    canonical_id(&Url::parse(&format!("{}{}", server.uri(), detail_path)).unwrap())
}

/// Number of requests the server received for `request_path`
async fn requests_for(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r: &&Request| r.url.path() == request_path)
        .count()
}

#[tokio::test]
async fn test_two_car_crawl() {
    let server = MockServer::start().await;
    mount_two_car_site(&server).await;

    let config = create_test_config(&server.uri(), "sqlite::memory:");
    let store = open_store(&config.store).unwrap();

    let summary = crawl(&config, &store).await.expect("crawl should complete");

    assert_eq!(summary.stop_reason, Some(StopReason::EmptyPage(2)));
    assert_eq!(summary.pages_processed, 1);
    assert_eq!(summary.links_discovered, 2);
    assert_eq!(summary.records_stored, 2);
    assert_eq!(summary.records_failed(), 0);
    assert_eq!(store.count().await.unwrap(), 2);

    let camry = store
        .get(&detail_id(&server, CAMRY_PATH))
        .await
        .unwrap()
        .expect("camry should be stored");
    assert_eq!(camry.record.snapshot.url, format!("{}{}", server.uri(), CAMRY_PATH));
    assert_eq!(camry.record.snapshot.http_status, 200);
    assert!(camry.record.snapshot.raw_html.contains("Toyota Camry 2024"));
    assert_eq!(camry.record.summary.title.as_deref(), Some("Toyota Camry 2024"));
    assert_eq!(camry.record.summary.price.as_deref(), Some("SAR 125,000"));
    assert_eq!(camry.record.summary.price_amount, Some(125_000));
    assert_eq!(camry.record.source_page, 1);

    // The tracking parameter was dropped before the id was derived
    let civic = store
        .get(&detail_id(&server, CIVIC_PATH))
        .await
        .unwrap()
        .expect("civic should be stored");
    assert_eq!(civic.record.summary.price.as_deref(), Some("SAR 99,900"));
}

#[tokio::test]
async fn test_rerun_updates_in_place() {
    let server = MockServer::start().await;
    mount_two_car_site(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &format!("sqlite://{}", dir.path().display()));

    let store = open_store(&config.store).unwrap();
    crawl(&config, &store).await.unwrap();
    let first = store
        .get(&detail_id(&server, CAMRY_PATH))
        .await
        .unwrap()
        .unwrap();

    // Reopen to prove the records survived on disk
    let store = open_store(&config.store).unwrap();
    let summary = crawl(&config, &store).await.unwrap();
    let second = store
        .get(&detail_id(&server, CAMRY_PATH))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(summary.records_stored, 2);
    assert_eq!(store.count().await.unwrap(), 2);
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at >= first.updated_at);
}

#[tokio::test]
async fn test_skip_existing_resumes_without_refetching() {
    let server = MockServer::start().await;
    mount_two_car_site(&server).await;

    let dir = TempDir::new().unwrap();
    let mut config =
        create_test_config(&server.uri(), &format!("sqlite://{}", dir.path().display()));
    let store = open_store(&config.store).unwrap();

    crawl(&config, &store).await.unwrap();
    assert_eq!(requests_for(&server, CAMRY_PATH).await, 1);
    assert_eq!(requests_for(&server, CIVIC_PATH).await, 1);

    config.crawler.skip_existing = true;
    let summary = crawl(&config, &store).await.unwrap();

    assert_eq!(summary.records_skipped, 2);
    assert_eq!(summary.records_stored, 0);
    assert_eq!(requests_for(&server, CAMRY_PATH).await, 1);
    assert_eq!(requests_for(&server, CIVIC_PATH).await, 1);
}

#[tokio::test]
async fn test_first_listing_page_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/new-cars/search"))
        .respond_with(html(503, "maintenance"))
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), "sqlite::memory:");
    let store = open_store(&config.store).unwrap();

    let err = crawl(&config, &store).await.unwrap_err();

    assert!(matches!(
        err,
        CrawlError::Navigation(FetchError::Status { status: 503, .. })
    ));
    // One attempt plus one retry
    assert_eq!(requests_for(&server, "/new-cars/search").await, 2);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_page_limit_stops_pagination() {
    let server = MockServer::start().await;
    mount_two_car_site(&server).await;
    Mock::given(method("GET"))
        .and(path("/new-cars/search"))
        .and(query_param("page", "2"))
        .respond_with(html(200, "<html></html>"))
        .expect(0)
        .with_priority(1)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server.uri(), "sqlite::memory:");
    config.crawler.max_pages = Some(1);
    let store = open_store(&config.store).unwrap();

    let summary = crawl(&config, &store).await.unwrap();

    assert_eq!(summary.stop_reason, Some(StopReason::PageLimit(1)));
    assert_eq!(summary.records_stored, 2);
}

#[tokio::test]
async fn test_missing_detail_page_recorded_as_failure() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        1,
        &format!(
            r#"<a href="{}">Camry</a><a href="/new-cars/discontinued-model">Gone</a>"#,
            CAMRY_PATH
        ),
    )
    .await;
    mount_listing(&server, 2, "<html><body></body></html>").await;
    mount_detail(&server, CAMRY_PATH, "<h1>Toyota Camry 2024</h1>").await;
    Mock::given(method("GET"))
        .and(path("/new-cars/discontinued-model"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), "sqlite::memory:");
    let store = open_store(&config.store).unwrap();

    let summary = crawl(&config, &store).await.unwrap();

    assert_eq!(summary.records_stored, 1);
    assert_eq!(summary.records_failed(), 1);
    assert!(summary.failures[0].url.ends_with("/new-cars/discontinued-model"));
    assert_eq!(summary.stop_reason, Some(StopReason::EmptyPage(2)));
    // 404 is permanent, so there is no retry
    assert_eq!(requests_for(&server, "/new-cars/discontinued-model").await, 1);
}

#[tokio::test]
async fn test_redirected_detail_records_final_url() {
    let server = MockServer::start().await;
    mount_listing(&server, 1, r#"<a href="/new-cars/camry-2024">Camry</a>"#).await;
    mount_listing(&server, 2, "").await;
    Mock::given(method("GET"))
        .and(path("/new-cars/camry-2024"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("location", CAMRY_PATH),
        )
        .mount(&server)
        .await;
    mount_detail(&server, CAMRY_PATH, "<h1>Toyota Camry 2024</h1>").await;

    let config = create_test_config(&server.uri(), "sqlite::memory:");
    let store = open_store(&config.store).unwrap();

    crawl(&config, &store).await.unwrap();

    let stored = store
        .get(&detail_id(&server, "/new-cars/camry-2024"))
        .await
        .unwrap()
        .expect("record is keyed by the requested URL");
    assert_eq!(
        stored.record.snapshot.final_url,
        format!("{}{}", server.uri(), CAMRY_PATH)
    );
    assert_eq!(stored.record.summary.title.as_deref(), Some("Toyota Camry 2024"));
}
