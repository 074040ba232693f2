//! Connect provider behavior against a mocked vault server.

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use herald::provider::{ConnectProvider, SecretProvider};

async fn mount_vault(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/vaults"))
        .and(header("Authorization", "Bearer connect-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "vault-1", "name": "HomeLab"},
            {"id": "vault-2", "name": "Production"}
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn resolve_walks_vault_item_field() {
    let server = MockServer::start().await;
    mount_vault(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/vaults/vault-2/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "item-7", "title": "postgres"},
            {"id": "item-8", "title": "redis"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/vaults/vault-2/items/item-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "item-7",
            "fields": [
                {"label": "username", "value": "admin"},
                {"label": "password", "value": "hunter2"}
            ]
        })))
        .mount(&server)
        .await;

    let p = ConnectProvider::new("connect", &server.uri(), "connect-token", 1);
    let value = p.resolve("Production", "postgres", "password").await.unwrap();
    assert_eq!(value, "hunter2");
}

#[tokio::test]
async fn vault_match_is_case_sensitive() {
    let server = MockServer::start().await;
    mount_vault(&server).await;

    let p = ConnectProvider::new("connect", &server.uri(), "connect-token", 1);
    let err = p.resolve("homelab", "postgres", "password").await.unwrap_err();
    assert!(err.to_string().contains("vault \"homelab\" not found"));
}

#[tokio::test]
async fn missing_item_and_field_are_reported() {
    let server = MockServer::start().await;
    mount_vault(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/vaults/vault-1/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "item-1", "title": "postgres"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/vaults/vault-1/items/item-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "item-1",
            "fields": [{"label": "username", "value": "admin"}]
        })))
        .mount(&server)
        .await;

    let p = ConnectProvider::new("connect", &server.uri(), "connect-token", 1);

    let err = p.resolve("HomeLab", "nope", "password").await.unwrap_err();
    assert!(err.to_string().contains("item \"nope\" not found"));

    let err = p.resolve("HomeLab", "postgres", "api_key").await.unwrap_err();
    assert!(err.to_string().contains("field \"api_key\" not found"));
}

#[tokio::test]
async fn health_probe_measures_vault_listing() {
    let server = MockServer::start().await;
    mount_vault(&server).await;

    let p = ConnectProvider::new("connect", &server.uri(), "connect-token", 1);
    let probe = p.healthy().await;
    assert!(probe.ok);
    assert!(probe.error.is_none());
}

#[tokio::test]
async fn health_probe_fails_on_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/vaults"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let p = ConnectProvider::new("connect", &server.uri(), "bad-token", 1);
    let probe = p.healthy().await;
    assert!(!probe.ok);
    assert!(probe.error.unwrap().contains("401"));
}

#[tokio::test]
async fn upstream_errors_surface_as_provider_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/vaults"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let p = ConnectProvider::new("connect", &server.uri(), "connect-token", 1);
    let err = p.resolve("V", "i", "f").await.unwrap_err();
    assert!(matches!(err, herald::errors::Error::Provider { .. }));
}
