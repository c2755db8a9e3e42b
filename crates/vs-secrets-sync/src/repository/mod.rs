//! Remote secret repositories
//!
//! Two backends implement [`SecretRepository`]:
//! - [`GistRepository`]: one secret gist per solution, content encrypted on the client
//! - [`KeyVaultRepository`]: one Azure Key Vault secret per container, encrypted by the service

mod azure_auth;
mod device_flow;
mod gist;
mod keyvault;

pub use azure_auth::{AzureTokenProvider, KEY_VAULT_RESOURCE};
pub use device_flow::{open_browser, DeviceCode, DeviceFlow, DeviceFlowPoll};
pub use gist::{DeviceCodeHandler, GistRepository, TOKEN_ENTRY};
pub use keyvault::{ConflictRetryPolicy, KeyVaultRepository, SECRET_NAME_PREFIX};

use crate::solution::Solution;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use vs_secrets_core::{JsonFileStore, NetworkSettings, RepositoryType, Settings};

/// One named record of a remote bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    /// `secrets` for the header, otherwise a container name
    pub name: String,
    pub content: Option<String>,
}

impl RemoteRecord {
    pub fn new(name: impl Into<String>, content: Option<String>) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }
}

/// Every record stored for one solution, as returned by a bulk pull
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteBundle {
    pub solution: Solution,
    pub records: Vec<RemoteRecord>,
}

/// Errors raised by repository backends
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Conflict writing {name}")]
    Conflict { name: String },

    #[error("Repository not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RepositoryError {
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::NotConfigured(message.into())
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Map a non-success HTTP status: 401 is an authentication failure,
    /// 403 an authorization failure
    pub fn from_status(status: reqwest::StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        match status.as_u16() {
            401 => Self::Authentication(message),
            403 => Self::Unauthorized(message),
            code => Self::Status {
                status: code,
                message,
            },
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// A remote store holding secret bundles keyed by solution
#[async_trait]
pub trait SecretRepository: Send + Sync {
    /// Backend tag
    fn repository_type(&self) -> RepositoryType;

    /// Whether content must be encrypted before it leaves the machine
    fn encrypt_on_client(&self) -> bool;

    /// Whether credentials are available for the next call
    async fn is_ready(&self) -> bool;

    /// Acquire or validate credentials. In batch mode nothing interactive
    /// happens and missing credentials are an authentication failure.
    async fn authorize(&self, batch_mode: bool) -> RepositoryResult<()>;

    /// Replace the remote bundle of `solution` with `records`
    async fn push_files(&self, solution: &Solution, records: &[RemoteRecord])
        -> RepositoryResult<()>;

    /// Records of the bundle for `solution`; empty when there is none
    async fn pull_files(&self, solution: &Solution) -> RepositoryResult<Vec<RemoteRecord>>;

    /// Every bundle stored in the repository
    async fn pull_all_secrets(&self) -> RepositoryResult<Vec<RemoteBundle>>;
}

/// Build the repository selected by `settings.repository`
pub fn create_repository(
    settings: &Settings,
    tokens: JsonFileStore,
) -> RepositoryResult<Box<dyn SecretRepository>> {
    match settings.repository {
        RepositoryType::GitHub => Ok(Box::new(GistRepository::new(
            &settings.github,
            &settings.network,
            tokens,
        )?)),
        RepositoryType::AzureKeyVault => {
            let vault_url = settings.azure_key_vault_url.as_deref().ok_or_else(|| {
                RepositoryError::not_configured(
                    "azure-key-vault-url is required for the azurekv repository",
                )
            })?;
            Ok(Box::new(KeyVaultRepository::new(
                vault_url,
                AzureTokenProvider::from_env(&settings.network)?,
                &settings.network,
            )?))
        }
    }
}

/// HTTP client shared by the backends
pub(crate) fn http_client(network: &NetworkSettings) -> RepositoryResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(&network.user_agent)
        .timeout(Duration::from_secs(network.http_timeout_secs))
        .build()?)
}

/// Read a response body for an error message, bounded to keep logs short
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) if !body.trim().is_empty() => body.chars().take(512).collect(),
        _ => status.to_string(),
    }
}
