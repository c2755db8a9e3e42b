//! Azure Key Vault repository tests against a mock vault

mod common;

use common::*;
use serde_json::json;
use vs_secrets_sync::repository::{ConflictRetryPolicy, RemoteRecord, RepositoryError};
use vs_secrets_sync::{SecretRepository, Solution};
use wiremock::matchers::{body_partial_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HEADER_SECRET: &str = "vs-secrets--6f1a2b3c-4d5e-4f60-8172-93a4b5c6d7e8--secrets";
const API_SECRET: &str = "vs-secrets--6f1a2b3c-4d5e-4f60-8172-93a4b5c6d7e8--api-7d2c";
const API_RECORD: &str = "secrets\\api-7d2c.json";
const API_VALUE: &str = r#"{"secrets.json":"{ \"Stripe:ApiKey\": \"sk_test_51H8\" }"}"#;

fn solution() -> Solution {
    Solution::remote(SOLUTION_NAME, Some(SOLUTION_GUID.to_string()))
}

fn api_record() -> Vec<RemoteRecord> {
    vec![RemoteRecord::new(API_RECORD, Some(API_VALUE.to_string()))]
}

async fn mock_put(server: &MockServer, name: &str, status: u16, times: u64) {
    Mock::given(method("PUT"))
        .and(path(format!("/secrets/{}", name)))
        .and(query_param("api-version", "7.4"))
        .and(header("authorization", format!("Bearer {}", KEY_VAULT_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({})))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_unchanged_value_is_not_written() {
    let server = MockServer::start().await;
    mock_secret_value(&server, API_SECRET, API_VALUE).await;
    mock_put(&server, API_SECRET, 200, 0).await;

    let repo = keyvault_repository(&server);
    repo.push_files(&solution(), &api_record()).await.unwrap();
}

#[tokio::test]
async fn test_changed_value_is_written() {
    let server = MockServer::start().await;
    mock_secret_value(&server, API_SECRET, r#"{"secrets.json":"{}"}"#).await;
    Mock::given(method("PUT"))
        .and(path(format!("/secrets/{}", API_SECRET)))
        .and(body_partial_json(json!({ "value": API_VALUE })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": API_VALUE })))
        .expect(1)
        .mount(&server)
        .await;

    let repo = keyvault_repository(&server);
    repo.push_files(&solution(), &api_record()).await.unwrap();
}

#[tokio::test]
async fn test_new_secret_is_written() {
    let server = MockServer::start().await;
    mock_secret_missing(&server, HEADER_SECRET).await;
    mock_put(&server, HEADER_SECRET, 200, 1).await;

    let repo = keyvault_repository(&server);
    let records = vec![RemoteRecord::new("secrets", Some(CURRENT_HEADER.to_string()))];
    repo.push_files(&solution(), &records).await.unwrap();
}

#[tokio::test]
async fn test_conflict_purges_and_retries_once_without_compare() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/secrets/{}", API_SECRET)))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path(format!("/secrets/{}", API_SECRET)))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": { "code": "Conflict", "message": "Secret is currently in a deleted but recoverable state" }
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mock_put(&server, API_SECRET, 200, 1).await;

    Mock::given(method("DELETE"))
        .and(path(format!("/deletedsecrets/{}", API_SECRET)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let repo = keyvault_repository(&server);
    repo.push_files(&solution(), &api_record()).await.unwrap();
}

#[tokio::test]
async fn test_second_conflict_aborts_push() {
    let server = MockServer::start().await;
    mock_secret_missing(&server, API_SECRET).await;
    mock_put(&server, API_SECRET, 409, 2).await;
    Mock::given(method("DELETE"))
        .and(path(format!("/deletedsecrets/{}", API_SECRET)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let repo = keyvault_repository(&server);
    let err = repo.push_files(&solution(), &api_record()).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict { .. }));
}

#[tokio::test]
async fn test_single_attempt_policy_never_purges() {
    let server = MockServer::start().await;
    mock_secret_missing(&server, API_SECRET).await;
    mock_put(&server, API_SECRET, 409, 1).await;
    Mock::given(method("DELETE"))
        .and(path(format!("/deletedsecrets/{}", API_SECRET)))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let repo = keyvault_repository(&server)
        .with_retry_policy(ConflictRetryPolicy { max_attempts: 1 });
    let err = repo.push_files(&solution(), &api_record()).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict { .. }));
}

#[tokio::test]
async fn test_three_attempt_policy_purges_twice() {
    let server = MockServer::start().await;
    mock_secret_missing(&server, API_SECRET).await;
    Mock::given(method("PUT"))
        .and(path(format!("/secrets/{}", API_SECRET)))
        .respond_with(ResponseTemplate::new(409))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mock_put(&server, API_SECRET, 200, 1).await;
    Mock::given(method("DELETE"))
        .and(path(format!("/deletedsecrets/{}", API_SECRET)))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let repo = keyvault_repository(&server)
        .with_retry_policy(ConflictRetryPolicy { max_attempts: 3 });
    repo.push_files(&solution(), &api_record()).await.unwrap();
}

#[tokio::test]
async fn test_forbidden_purge_aborts_remaining_records() {
    let server = MockServer::start().await;
    mock_secret_missing(&server, API_SECRET).await;
    mock_put(&server, API_SECRET, 409, 1).await;
    Mock::given(method("DELETE"))
        .and(path(format!("/deletedsecrets/{}", API_SECRET)))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": "Forbidden", "message": "purge permission missing" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    mock_put(&server, HEADER_SECRET, 200, 0).await;

    let repo = keyvault_repository(&server);
    let mut records = api_record();
    records.push(RemoteRecord::new("secrets", Some(CURRENT_HEADER.to_string())));

    let err = repo.push_files(&solution(), &records).await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_unauthenticated_write_is_authentication_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/secrets/{}", API_SECRET)))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let repo = keyvault_repository(&server);
    let err = repo.push_files(&solution(), &api_record()).await.unwrap_err();
    assert!(err.is_authentication());
}

#[tokio::test]
async fn test_pull_follows_next_link_and_filters_names() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/secrets"))
        .and(query_param_is_missing("$skiptoken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                secret_item(&server, HEADER_SECRET, true),
                secret_item(&server, "vs-secrets--11111111-2222-3333-4444-555555555555--secrets", true),
                secret_item(&server, "unrelated-connection-string", true)
            ],
            "nextLink": format!("{}/secrets?api-version=7.4&$skiptoken=page2", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/secrets"))
        .and(query_param("$skiptoken", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                secret_item(&server, API_SECRET, true),
                secret_item(&server, "vs-secrets--6f1a2b3c-4d5e-4f60-8172-93a4b5c6d7e8--disabled", false),
                secret_item(&server, "vs-secrets--6f1a2b3c-4d5e-4f60-8172-93a4b5c6d7e8--a--b", true)
            ],
            "nextLink": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    mock_secret_value(&server, HEADER_SECRET, CURRENT_HEADER).await;
    mock_secret_value(&server, API_SECRET, API_VALUE).await;

    let repo = keyvault_repository(&server);
    let mut records = repo.pull_files(&solution()).await.unwrap();
    records.sort_by(|a, b| a.name.cmp(&b.name));

    assert_eq!(
        records,
        vec![
            RemoteRecord::new("secrets", Some(CURRENT_HEADER.to_string())),
            RemoteRecord::new(API_RECORD, Some(API_VALUE.to_string())),
        ]
    );
}

#[tokio::test]
async fn test_pull_all_groups_by_solution() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/secrets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                secret_item(&server, HEADER_SECRET, true),
                secret_item(&server, API_SECRET, true)
            ]
        })))
        .mount(&server)
        .await;
    mock_secret_value(&server, HEADER_SECRET, CURRENT_HEADER).await;
    mock_secret_value(&server, API_SECRET, API_VALUE).await;

    let repo = keyvault_repository(&server);
    let bundles = repo.pull_all_secrets().await.unwrap();

    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].solution.name, SOLUTION_NAME);
    assert_eq!(bundles[0].solution.uid.as_deref(), Some(SOLUTION_GUID));
    assert_eq!(bundles[0].records.len(), 2);
}

#[tokio::test]
async fn test_forbidden_listing_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secrets"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let repo = keyvault_repository(&server);
    assert!(!repo.encrypt_on_client());
    let err = repo.pull_files(&solution()).await.unwrap_err();
    assert!(err.is_unauthorized());
}
