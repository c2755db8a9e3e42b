//! Mock server helpers for the GitHub and Key Vault APIs
//!
//! Provides utilities for building repositories against a wiremock server and
//! mounting the common response patterns.

use super::constants::*;
use serde_json::json;
use std::path::Path;
use vs_secrets_core::{GitHubSettings, JsonFileStore, NetworkSettings};
use vs_secrets_sync::repository::{
    AzureTokenProvider, DeviceCode, GistRepository, KeyVaultRepository,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Network settings with a short timeout for tests
pub fn test_network() -> NetworkSettings {
    NetworkSettings {
        http_timeout_secs: 5,
        ..NetworkSettings::default()
    }
}

/// GitHub settings pointing both API and OAuth endpoints at `server`
pub fn github_settings(server: &MockServer) -> GitHubSettings {
    GitHubSettings {
        api_url: server.uri(),
        oauth_url: server.uri(),
        client_id: Some(GITHUB_CLIENT_ID.to_string()),
    }
}

/// Token store in `dir`, optionally holding a GitHub token
pub fn token_store(dir: &Path, token: Option<&str>) -> JsonFileStore {
    let store = JsonFileStore::new(dir.join("tokens.json"));
    if let Some(token) = token {
        store.set("github", token).unwrap();
    }
    store
}

/// Gist repository against `server` that never opens a browser
pub fn gist_repository(server: &MockServer, tokens: JsonFileStore) -> GistRepository {
    GistRepository::new(&github_settings(server), &test_network(), tokens)
        .unwrap()
        .with_device_code_handler(std::sync::Arc::new(|_: &DeviceCode| {}))
}

/// Key Vault repository against `server` with a fixed access token
pub fn keyvault_repository(server: &MockServer) -> KeyVaultRepository {
    let auth = AzureTokenProvider::with_token(KEY_VAULT_TOKEN, &test_network()).unwrap();
    KeyVaultRepository::new(&server.uri(), auth, &test_network()).unwrap()
}

/// The absent-gist lookup answers 404, so the stored token is valid
pub async fn mock_valid_token_check(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/gists/00000000000000000000000000000000"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
        .mount(server)
        .await;
}

/// Gist listing with one page of `gists`
pub async fn mock_gist_list(server: &MockServer, gists: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/gists"))
        .and(header("authorization", format!("Bearer {}", GITHUB_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(gists))
        .mount(server)
        .await;
}

/// Listing entry for a gist holding a bundle
pub fn gist_summary(id: &str, description: &str) -> serde_json::Value {
    json!({
        "id": id,
        "description": description,
        "public": false,
        "files": {
            "secrets": { "filename": "secrets", "raw_url": format!("https://gist.example/{}/secrets", id) }
        }
    })
}

/// Full gist document with inline `files`
pub async fn mock_gist(server: &MockServer, id: &str, description: &str, files: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/gists/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "description": description,
            "public": false,
            "files": files,
        })))
        .mount(server)
        .await;
}

/// Secret value endpoint of the vault
pub async fn mock_secret_value(server: &MockServer, name: &str, value: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/secrets/{}", name)))
        .and(header("authorization", format!("Bearer {}", KEY_VAULT_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": value,
            "id": format!("https://contoso.vault.azure.net/secrets/{}/0f3c", name),
            "attributes": { "enabled": true }
        })))
        .mount(server)
        .await;
}

/// Secret that does not exist (or is soft-deleted)
pub async fn mock_secret_missing(server: &MockServer, name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/secrets/{}", name)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "SecretNotFound", "message": "Secret not found" }
        })))
        .mount(server)
        .await;
}

/// Listing entry for a vault secret
pub fn secret_item(server: &MockServer, name: &str, enabled: bool) -> serde_json::Value {
    json!({
        "id": format!("{}/secrets/{}", server.uri(), name),
        "attributes": { "enabled": enabled }
    })
}
