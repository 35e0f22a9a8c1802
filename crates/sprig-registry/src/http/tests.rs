//! Unit tests for the HTTP feed

use super::*;

use sprig_core::types::{Version, VersionReq};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
    }
}

fn feed_for(server: &MockServer) -> HttpFeed {
    let url = Url::parse(&server.uri()).unwrap();
    HttpFeed::with_config("remote", url, None, fast_retry()).unwrap()
}

fn json_index() -> serde_json::Value {
    serde_json::json!({
        "versions": [
            { "id": "Json", "version": "1.0.0" },
            { "id": "Json", "version": "1.5.0", "dependencies": { "Text": "[1.0,2.0)" } },
            { "id": "Json", "version": "2.0.0" }
        ]
    })
}

#[test]
fn test_retry_config_default() {
    let config = RetryConfig::default();
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.initial_delay, Duration::from_millis(100));
    assert_eq!(config.max_delay, Duration::from_secs(10));
    assert_eq!(config.multiplier, 2.0);
}

#[test]
fn test_urls_use_lowercase_names() {
    let feed = HttpFeed::new("remote", Url::parse("https://feed.example/packages/").unwrap()).unwrap();
    assert_eq!(
        feed.index_url("Json"),
        "https://feed.example/packages/json/index.json"
    );
    assert_eq!(
        feed.archive_url(&PackageId::new("Json", Version::new(1, 5, 0))),
        "https://feed.example/packages/json/1.5.0/json.1.5.0.pkg"
    );
    assert!(feed.is_http());
}

#[tokio::test]
async fn test_find_library_selects_from_index() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json_index()))
        .mount(&server)
        .await;

    let feed = feed_for(&server);
    let library = Library::new("JSON", Some(VersionReq::parse("[1.0,2.0)").unwrap()));
    let description = feed
        .find_library(&library, &Platform::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(description.id, PackageId::new("Json", Version::new(1, 5, 0)));
    assert_eq!(description.dependencies[0].name, "Text");
}

#[tokio::test]
async fn test_missing_package_is_no_match() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nope/index.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let feed = feed_for(&server);
    let result = feed
        .find_library(&Library::any("Nope"), &Platform::default())
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_index_is_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json_index()))
        .expect(1)
        .mount(&server)
        .await;

    let feed = feed_for(&server);
    for _ in 0..3 {
        feed.fetch_index("Json").await.unwrap();
    }
}

#[tokio::test]
async fn test_no_cache_always_asks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json_index()))
        .expect(2)
        .mount(&server)
        .await;

    let feed = feed_for(&server).no_cache();
    assert_eq!(feed.fetch_index("Json").await.unwrap().len(), 3);
    assert_eq!(feed.fetch_index("json").await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_server_error_is_retried_then_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/index.json"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let feed = feed_for(&server);
    let result = feed.find_library(&Library::any("Json"), &Platform::default()).await;
    assert!(matches!(result, Err(SprigError::Network { .. })));
}

#[tokio::test]
async fn test_ignored_failure_is_no_match() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/index.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let feed = feed_for(&server).ignore_failure(true);
    let result = feed
        .find_library(&Library::any("Json"), &Platform::default())
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_malformed_index_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .expect(1)
        .mount(&server)
        .await;

    let feed = feed_for(&server);
    assert!(matches!(
        feed.fetch_index("Json").await,
        Err(SprigError::ManifestParse { .. })
    ));
}

#[tokio::test]
async fn test_download_archive() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/1.5.0/json.1.5.0.pkg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"archive bytes".to_vec()))
        .mount(&server)
        .await;

    let feed = feed_for(&server);
    let content = feed
        .fetch_content(&PackageId::new("Json", Version::new(1, 5, 0)))
        .await
        .unwrap();
    assert_eq!(content, b"archive bytes");

    let missing = feed
        .fetch_content(&PackageId::new("Json", Version::new(9, 0, 0)))
        .await;
    assert!(matches!(missing, Err(SprigError::PackageNotFound { .. })));
}

#[tokio::test]
async fn test_basic_auth_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/index.json"))
        .and(header("Authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json_index()))
        .expect(1)
        .mount(&server)
        .await;

    let auth = AuthConfig {
        username: "user".to_string(),
        password: "pass".to_string(),
    };
    let url = Url::parse(&server.uri()).unwrap();
    let feed = HttpFeed::with_config("private", url, Some(auth), fast_retry()).unwrap();
    assert_eq!(feed.fetch_index("Json").await.unwrap().len(), 3);
}
