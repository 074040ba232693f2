//! Service-account provider behavior, including rate-limit degradation and
//! recovery, against a mocked hosted API.

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use herald::provider::{SecretProvider, ServiceAccountProvider};

#[tokio::test]
async fn resolve_posts_compound_reference() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/resolve"))
        .and(body_json(json!({"secret_ref": "op://HomeLab/postgres/password"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": "hunter2"})))
        .expect(1)
        .mount(&server)
        .await;

    let p = ServiceAccountProvider::new("sdk", &server.uri(), "sa-token", 1).unwrap();
    let value = p.resolve("HomeLab", "postgres", "password").await.unwrap();
    assert_eq!(value, "hunter2");
}

#[tokio::test]
async fn rate_limited_probe_degrades_and_recovers() {
    let server = MockServer::start().await;
    // First probe: rate limited
    Mock::given(method("GET"))
        .and(path("/v1/vaults"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let p = ServiceAccountProvider::new("sdk", &server.uri(), "sa-token", 1).unwrap();

    let probe = p.healthy().await;
    assert!(!probe.ok);
    assert!(probe.error.unwrap().contains("rate limited since"));
    let since = p.rate_limited_since().expect("flag set on rate limit");

    // Second rate-limited probe keeps the original transition instant
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/v1/vaults"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    let probe = p.healthy().await;
    assert!(!probe.ok);
    assert_eq!(p.rate_limited_since(), Some(since));

    // Successful probe clears the flag
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/v1/vaults"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "v-1"}])))
        .mount(&server)
        .await;
    let probe = p.healthy().await;
    assert!(probe.ok);
    assert_eq!(p.rate_limited_since(), None);
}

#[tokio::test]
async fn resolve_error_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/resolve"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let p = ServiceAccountProvider::new("sdk", &server.uri(), "sa-token", 1).unwrap();
    let err = p.resolve("V", "missing", "f").await.unwrap_err();
    assert!(err.to_string().contains("op://V/missing/f"));
    assert!(err.to_string().contains("404"));
}
