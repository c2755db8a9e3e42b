//! GitHub gist repository
//!
//! Each solution is stored as one secret gist described as
//! `"{solution name} ({solution guid})"`. The gist holds the header file
//! `secrets` plus one file per container. Content is encrypted on the client.

use super::device_flow::{open_browser, DeviceCode, DeviceFlow};
use super::{
    error_body, http_client, RemoteBundle, RemoteRecord, RepositoryError, RepositoryResult,
    SecretRepository,
};
use crate::header::HEADER_RECORD_NAME;
use crate::solution::Solution;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use vs_secrets_core::{GitHubSettings, JsonFileStore, NetworkSettings, RepositoryType};

/// Entry name of the GitHub token inside the token store
pub const TOKEN_ENTRY: &str = "github";

/// Gist id that never exists; probing it answers 404 for a valid token
const ABSENT_GIST_ID: &str = "00000000000000000000000000000000";

const PAGE_SIZE: usize = 100;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";

static DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*) \(([0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12})\)$")
        .expect("gist description regex is valid")
});

/// Callback shown the user code while the device flow waits for approval
pub type DeviceCodeHandler = Arc<dyn Fn(&DeviceCode) + Send + Sync>;

#[derive(Debug, Deserialize)]
struct Gist {
    id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    files: BTreeMap<String, GistFile>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    #[serde(default)]
    raw_url: Option<String>,
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedGist {
    id: String,
}

/// Secret-gist backed repository
pub struct GistRepository {
    client: reqwest::Client,
    api_url: String,
    device_flow: Option<DeviceFlow>,
    tokens: JsonFileStore,
    token: RwLock<Option<String>>,
    on_device_code: DeviceCodeHandler,
}

impl GistRepository {
    /// Create a repository; the stored token (if any) is loaded immediately
    pub fn new(
        github: &GitHubSettings,
        network: &NetworkSettings,
        tokens: JsonFileStore,
    ) -> RepositoryResult<Self> {
        let client = http_client(network)?;
        let device_flow = github
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(|id| DeviceFlow::new(client.clone(), &github.oauth_url, id));

        let token = match tokens.get(TOKEN_ENTRY) {
            Ok(token) => token,
            Err(e) => {
                warn!("Failed to read token store: {}", e);
                None
            }
        };

        Ok(Self {
            client,
            api_url: github.api_url.trim_end_matches('/').to_string(),
            device_flow,
            tokens,
            token: RwLock::new(token),
            on_device_code: Arc::new(default_device_code_handler),
        })
    }

    /// Replace how the user code is presented during the device flow
    pub fn with_device_code_handler(mut self, handler: DeviceCodeHandler) -> Self {
        self.on_device_code = handler;
        self
    }

    async fn bearer(&self) -> RepositoryResult<String> {
        self.token
            .read()
            .await
            .clone()
            .ok_or_else(|| RepositoryError::authentication("not authorized with GitHub"))
    }

    async fn get(&self, url: &str) -> RepositoryResult<reqwest::Response> {
        let token = self.bearer().await?;
        Ok(self
            .client
            .get(url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, GITHUB_ACCEPT)
            .send()
            .await?)
    }

    /// Whether the stored token is accepted. Any answer other than 404 for
    /// the absent gist means the token is not usable.
    async fn validate_token(&self, token: &str) -> bool {
        let url = format!("{}/gists/{}", self.api_url, ABSENT_GIST_ID);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, GITHUB_ACCEPT)
            .send()
            .await;

        match response {
            Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => true,
            Ok(response) => {
                debug!("Token check answered {}", response.status());
                false
            }
            Err(e) => {
                debug!("Token check failed: {}", e);
                false
            }
        }
    }

    async fn clear_token(&self) {
        *self.token.write().await = None;
        if let Err(e) = self.tokens.remove(TOKEN_ENTRY) {
            warn!("Failed to clear stored GitHub token: {}", e);
        }
    }

    async fn list_gists(&self) -> RepositoryResult<Vec<Gist>> {
        let mut gists = Vec::new();
        let mut page = 1;

        loop {
            let url = format!(
                "{}/gists?per_page={}&page={}",
                self.api_url, PAGE_SIZE, page
            );
            let response = self.get(&url).await?;
            if !response.status().is_success() {
                let status = response.status();
                return Err(RepositoryError::from_status(
                    status,
                    error_body(response).await,
                ));
            }

            let batch: Vec<Gist> = response
                .json()
                .await
                .map_err(|e| RepositoryError::invalid_response(format!("gist list: {}", e)))?;
            let count = batch.len();
            gists.extend(batch);

            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        debug!("Listed {} gist(s)", gists.len());
        Ok(gists)
    }

    /// Gists holding the bundle of `solution`, exact description first
    async fn find_bundles(&self, solution: &Solution) -> RepositoryResult<Vec<Gist>> {
        let description = solution.description();
        let mut exact = Vec::new();
        let mut legacy = Vec::new();

        for gist in self.list_gists().await? {
            match gist.description.as_deref() {
                Some(d) if d == description => exact.push(gist),
                Some(d) if d == solution.name => legacy.push(gist),
                _ => {}
            }
        }

        exact.extend(legacy);
        Ok(exact)
    }

    async fn fetch_gist(&self, id: &str) -> RepositoryResult<Gist> {
        let url = format!("{}/gists/{}", self.api_url, id);
        let response = self.get(&url).await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(RepositoryError::from_status(
                status,
                error_body(response).await,
            ));
        }

        response
            .json()
            .await
            .map_err(|e| RepositoryError::invalid_response(format!("gist {}: {}", id, e)))
    }

    async fn fetch_raw(&self, raw_url: &str) -> RepositoryResult<String> {
        let response = self.get(raw_url).await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(RepositoryError::from_status(
                status,
                error_body(response).await,
            ));
        }
        Ok(response.text().await?)
    }

    async fn read_records(&self, id: &str) -> RepositoryResult<Vec<RemoteRecord>> {
        let gist = self.fetch_gist(id).await?;
        let mut records = Vec::with_capacity(gist.files.len());

        for (name, file) in gist.files {
            let content = match (file.content, file.truncated, file.raw_url) {
                (Some(content), false, _) => Some(content),
                (_, _, Some(raw_url)) => {
                    debug!("Fetching raw content of {}", name);
                    Some(self.fetch_raw(&raw_url).await?)
                }
                (content, _, None) => content,
            };
            records.push(RemoteRecord::new(name, content));
        }

        Ok(records)
    }

    async fn delete_gist(&self, id: &str) -> RepositoryResult<()> {
        let token = self.bearer().await?;
        let url = format!("{}/gists/{}", self.api_url, id);
        let response = self
            .client
            .delete(&url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, GITHUB_ACCEPT)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(RepositoryError::from_status(
                status,
                error_body(response).await,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SecretRepository for GistRepository {
    fn repository_type(&self) -> RepositoryType {
        RepositoryType::GitHub
    }

    fn encrypt_on_client(&self) -> bool {
        true
    }

    async fn is_ready(&self) -> bool {
        self.token.read().await.is_some()
    }

    async fn authorize(&self, batch_mode: bool) -> RepositoryResult<()> {
        let stored = self.token.read().await.clone();
        if let Some(token) = stored {
            if self.validate_token(&token).await {
                debug!("Stored GitHub token is valid");
                return Ok(());
            }
            warn!("Stored GitHub token was rejected, clearing it");
            self.clear_token().await;
        }

        if batch_mode {
            return Err(RepositoryError::authentication(
                "no valid GitHub token; authorize interactively first",
            ));
        }

        let Some(device_flow) = &self.device_flow else {
            return Err(RepositoryError::authentication(
                "GitHub OAuth client id is not configured (github.client-id)",
            ));
        };

        let code = device_flow.request_code().await?;
        (self.on_device_code)(&code);
        let token = device_flow.wait_for_token(&code).await?;

        if let Err(e) = self.tokens.set(TOKEN_ENTRY, &token) {
            warn!("Failed to persist GitHub token: {}", e);
        }
        *self.token.write().await = Some(token);

        info!("Authorized with GitHub");
        Ok(())
    }

    async fn push_files(
        &self,
        solution: &Solution,
        records: &[RemoteRecord],
    ) -> RepositoryResult<()> {
        // Not atomic: the previous bundle is gone before the new one exists
        for gist in self.find_bundles(solution).await? {
            match self.delete_gist(&gist.id).await {
                Ok(()) => debug!("Deleted previous gist {}", gist.id),
                Err(e) => warn!("Failed to delete previous gist {}: {}", gist.id, e),
            }
        }

        let files: serde_json::Map<String, serde_json::Value> = records
            .iter()
            .filter_map(|record| {
                record.content.as_ref().map(|content| {
                    (
                        record.name.clone(),
                        serde_json::json!({ "content": content }),
                    )
                })
            })
            .collect();

        let token = self.bearer().await?;
        let url = format!("{}/gists", self.api_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, GITHUB_ACCEPT)
            .json(&serde_json::json!({
                "description": solution.description(),
                "public": false,
                "files": files,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(RepositoryError::from_status(
                status,
                error_body(response).await,
            ));
        }

        let created: CreatedGist = response
            .json()
            .await
            .map_err(|e| RepositoryError::invalid_response(format!("created gist: {}", e)))?;
        info!("Created gist {} for {}", created.id, solution.name);

        Ok(())
    }

    async fn pull_files(&self, solution: &Solution) -> RepositoryResult<Vec<RemoteRecord>> {
        let bundles = self.find_bundles(solution).await?;
        let Some(gist) = bundles.first() else {
            debug!("No gist found for {}", solution.description());
            return Ok(Vec::new());
        };

        self.read_records(&gist.id).await
    }

    async fn pull_all_secrets(&self) -> RepositoryResult<Vec<RemoteBundle>> {
        let mut bundles = Vec::new();

        for gist in self.list_gists().await? {
            if !gist.files.contains_key(HEADER_RECORD_NAME) {
                continue;
            }
            let Some(description) = gist.description.as_deref() else {
                continue;
            };

            let solution = parse_description(description);
            let records = self.read_records(&gist.id).await?;
            bundles.push(RemoteBundle { solution, records });
        }

        Ok(bundles)
    }
}

/// Recover the solution identity from a gist description
fn parse_description(description: &str) -> Solution {
    match DESCRIPTION_RE.captures(description) {
        Some(caps) => Solution::remote(&caps[1], Some(caps[2].to_ascii_lowercase())),
        None => Solution::remote(description, None),
    }
}

fn default_device_code_handler(code: &DeviceCode) {
    info!(
        "Open {} and enter the code {} to authorize access to your gists",
        code.verification_uri, code.user_code
    );
    open_browser(&code.verification_uri);
}
