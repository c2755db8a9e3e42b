//! Azure Key Vault repository
//!
//! Every record is stored as its own secret named
//! `vs-secrets--{solution guid or name}--{file key}`. The vault encrypts at
//! rest, so nothing is encrypted on the client.

use super::azure_auth::AzureTokenProvider;
use super::{
    error_body, http_client, RemoteBundle, RemoteRecord, RepositoryError, RepositoryResult,
    SecretRepository,
};
use crate::header::{HeaderMetadata, HEADER_RECORD_NAME};
use crate::solution::Solution;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use vs_secrets_core::{NetworkSettings, RepositoryType};

/// Leading segment of every secret name
pub const SECRET_NAME_PREFIX: &str = "vs-secrets";

const NAME_SEPARATOR: &str = "--";

const API_VERSION: &str = "7.4";

/// How a write answered with 409 Conflict is retried.
///
/// A conflict means the secret is soft-deleted. It is purged and the write is
/// retried; only the first attempt compares against the stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictRetryPolicy {
    pub max_attempts: u32,
}

impl Default for ConflictRetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

impl ConflictRetryPolicy {
    /// Whether `attempt` (zero-based) skips writes of unchanged values
    pub fn compares_on(&self, attempt: u32) -> bool {
        attempt == 0
    }

    pub fn can_retry_after(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

#[derive(Debug, Deserialize)]
struct SecretBundle {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SecretListPage {
    #[serde(default)]
    value: Vec<SecretItem>,
    #[serde(default, rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SecretItem {
    id: String,
    #[serde(default)]
    attributes: Option<SecretAttributes>,
}

#[derive(Debug, Deserialize)]
struct SecretAttributes {
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl SecretItem {
    fn is_enabled(&self) -> bool {
        self.attributes.as_ref().map(|a| a.enabled).unwrap_or(true)
    }

    fn name(&self) -> Option<&str> {
        self.id
            .trim_end_matches('/')
            .split("/secrets/")
            .nth(1)
            .map(|rest| rest.split('/').next().unwrap_or(rest))
    }
}

/// Key Vault backed repository
pub struct KeyVaultRepository {
    client: reqwest::Client,
    vault_url: String,
    auth: AzureTokenProvider,
    retry: ConflictRetryPolicy,
}

impl KeyVaultRepository {
    pub fn new(
        vault_url: &str,
        auth: AzureTokenProvider,
        network: &NetworkSettings,
    ) -> RepositoryResult<Self> {
        let parsed = url::Url::parse(vault_url).map_err(|e| {
            RepositoryError::not_configured(format!("invalid Key Vault URL {}: {}", vault_url, e))
        })?;

        Ok(Self {
            client: http_client(network)?,
            vault_url: parsed.as_str().trim_end_matches('/').to_string(),
            auth,
            retry: ConflictRetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: ConflictRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn vault_url(&self) -> &str {
        &self.vault_url
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> RepositoryResult<reqwest::Response> {
        let token = self.auth.token().await?;
        let response = request.bearer_auth(token.as_str()).send().await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            self.auth.invalidate().await;
        }
        Ok(response)
    }

    fn secret_url(&self, name: &str) -> String {
        format!(
            "{}/secrets/{}?api-version={}",
            self.vault_url, name, API_VERSION
        )
    }

    async fn get_secret(&self, name: &str) -> RepositoryResult<Option<String>> {
        let response = self.send(self.client.get(self.secret_url(name))).await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RepositoryError::from_status(
                status,
                error_body(response).await,
            ));
        }

        let bundle: SecretBundle = response
            .json()
            .await
            .map_err(|e| RepositoryError::invalid_response(format!("secret {}: {}", name, e)))?;
        Ok(bundle.value)
    }

    async fn set_secret(&self, name: &str, value: &str) -> RepositoryResult<()> {
        let request = self
            .client
            .put(self.secret_url(name))
            .json(&serde_json::json!({ "value": value }));
        let response = self.send(request).await?;
        let status = response.status();

        if status == reqwest::StatusCode::CONFLICT {
            return Err(RepositoryError::Conflict {
                name: name.to_string(),
            });
        }
        if !status.is_success() {
            return Err(RepositoryError::from_status(
                status,
                error_body(response).await,
            ));
        }
        Ok(())
    }

    async fn purge_deleted_secret(&self, name: &str) -> RepositoryResult<()> {
        let url = format!(
            "{}/deletedsecrets/{}?api-version={}",
            self.vault_url, name, API_VERSION
        );
        let response = self.send(self.client.delete(url)).await?;
        let status = response.status();

        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            info!("Purged soft-deleted secret {}", name);
            return Ok(());
        }
        Err(RepositoryError::from_status(
            status,
            error_body(response).await,
        ))
    }

    /// Read-compare-write one secret under the conflict retry policy
    async fn write_secret(&self, name: &str, value: &str) -> RepositoryResult<()> {
        for attempt in 0..self.retry.max_attempts {
            if self.retry.compares_on(attempt)
                && self.get_secret(name).await?.as_deref() == Some(value)
            {
                debug!("Secret {} is unchanged", name);
                return Ok(());
            }

            match self.set_secret(name, value).await {
                Ok(()) => {
                    debug!("Wrote secret {}", name);
                    return Ok(());
                }
                Err(RepositoryError::Conflict { .. }) if self.retry.can_retry_after(attempt) => {
                    warn!("Secret {} is soft-deleted, purging before retry", name);
                    self.purge_deleted_secret(name).await?;
                }
                Err(e) => return Err(e),
            }
        }

        Err(RepositoryError::Conflict {
            name: name.to_string(),
        })
    }

    /// Names of enabled secrets starting with `prefix`, across all pages
    async fn list_secret_names(&self, prefix: &str) -> RepositoryResult<Vec<String>> {
        let mut names = Vec::new();
        let mut next = Some(format!(
            "{}/secrets?api-version={}",
            self.vault_url, API_VERSION
        ));

        while let Some(url) = next.take() {
            let response = self.send(self.client.get(&url)).await?;
            if !response.status().is_success() {
                let status = response.status();
                return Err(RepositoryError::from_status(
                    status,
                    error_body(response).await,
                ));
            }

            let page: SecretListPage = response
                .json()
                .await
                .map_err(|e| RepositoryError::invalid_response(format!("secret list: {}", e)))?;

            names.extend(
                page.value
                    .iter()
                    .filter(|item| item.is_enabled())
                    .filter_map(|item| item.name())
                    .filter(|name| name.starts_with(prefix))
                    .map(str::to_string),
            );
            next = page.next_link.filter(|link| !link.is_empty());
        }

        debug!("Found {} secret(s) with prefix {}", names.len(), prefix);
        Ok(names)
    }

    async fn read_records(&self, names: &[String]) -> RepositoryResult<Vec<RemoteRecord>> {
        let mut records = Vec::with_capacity(names.len());
        for name in names {
            let Some((_, file_key)) = split_secret_name(name) else {
                continue;
            };
            let value = self.get_secret(name).await?;
            records.push(RemoteRecord::new(record_name(file_key), value));
        }
        Ok(records)
    }
}

#[async_trait]
impl SecretRepository for KeyVaultRepository {
    fn repository_type(&self) -> RepositoryType {
        RepositoryType::AzureKeyVault
    }

    fn encrypt_on_client(&self) -> bool {
        false
    }

    async fn is_ready(&self) -> bool {
        self.auth.has_token().await
    }

    async fn authorize(&self, _batch_mode: bool) -> RepositoryResult<()> {
        self.auth.token().await?;
        debug!("Acquired Key Vault access token");
        Ok(())
    }

    async fn push_files(
        &self,
        solution: &Solution,
        records: &[RemoteRecord],
    ) -> RepositoryResult<()> {
        for record in records {
            let Some(content) = record.content.as_deref() else {
                continue;
            };
            let Some(file_key) = file_key(&record.name) else {
                warn!("Skipping record with unsupported name {}", record.name);
                continue;
            };

            let name = secret_name(solution.storage_key(), file_key);
            self.write_secret(&name, content).await?;
        }

        info!("Pushed {} record(s) for {}", records.len(), solution.name);
        Ok(())
    }

    async fn pull_files(&self, solution: &Solution) -> RepositoryResult<Vec<RemoteRecord>> {
        let prefix = format!(
            "{}{sep}{}{sep}",
            SECRET_NAME_PREFIX,
            solution.storage_key(),
            sep = NAME_SEPARATOR
        );
        let names = self.list_secret_names(&prefix).await?;
        self.read_records(&names).await
    }

    async fn pull_all_secrets(&self) -> RepositoryResult<Vec<RemoteBundle>> {
        let prefix = format!("{}{}", SECRET_NAME_PREFIX, NAME_SEPARATOR);
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for name in self.list_secret_names(&prefix).await? {
            if let Some((key, _)) = split_secret_name(&name) {
                grouped.entry(key.to_string()).or_default().push(name);
            }
        }

        let mut bundles = Vec::with_capacity(grouped.len());
        for (key, names) in grouped {
            let records = self.read_records(&names).await?;
            let solution = solution_from_records(&key, &records);
            bundles.push(RemoteBundle { solution, records });
        }

        Ok(bundles)
    }
}

/// Secret name for `file_key` of the solution stored under `solution_key`
pub fn secret_name(solution_key: &str, file_key: &str) -> String {
    [SECRET_NAME_PREFIX, solution_key, file_key].join(NAME_SEPARATOR)
}

/// `(solution key, file key)` of a well-formed secret name
fn split_secret_name(name: &str) -> Option<(&str, &str)> {
    let parts: Vec<&str> = name.split(NAME_SEPARATOR).collect();
    match parts.as_slice() {
        [SECRET_NAME_PREFIX, solution_key, file_key]
            if !solution_key.is_empty() && !file_key.is_empty() =>
        {
            Some((*solution_key, *file_key))
        }
        _ => None,
    }
}

/// File key of a record: `secrets` for the header, the stem of
/// `secrets\{stem}.json` for a container
fn file_key(record_name: &str) -> Option<&str> {
    if record_name == HEADER_RECORD_NAME {
        return Some(HEADER_RECORD_NAME);
    }
    record_name
        .strip_prefix("secrets\\")
        .and_then(|rest| rest.strip_suffix(".json"))
        .filter(|stem| !stem.is_empty())
}

fn record_name(file_key: &str) -> String {
    if file_key == HEADER_RECORD_NAME {
        HEADER_RECORD_NAME.to_string()
    } else {
        crate::container::container_name_for(file_key)
    }
}

fn solution_from_records(key: &str, records: &[RemoteRecord]) -> Solution {
    let header = records
        .iter()
        .find(|r| r.name == HEADER_RECORD_NAME)
        .and_then(|r| r.content.as_deref())
        .and_then(|content| serde_json::from_str::<HeaderMetadata>(content).ok());

    match header {
        Some(header) => Solution::remote(
            header.solution_file,
            header.solution_guid.or_else(|| guid_key(key)),
        ),
        None => Solution::remote(key, guid_key(key)),
    }
}

fn guid_key(key: &str) -> Option<String> {
    uuid::Uuid::parse_str(key)
        .ok()
        .map(|guid| guid.hyphenated().to_string())
}
