//! Configuration types
//!
//! These types define the user-level defaults: which remote repository to
//! sync with, where it lives, and network parameters for the HTTP clients.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Complete vs-secrets configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    /// Remote repository used by push/pull/status
    #[serde(default)]
    pub repository: RepositoryType,

    /// Azure Key Vault URL (required when `repository` is `azurekv`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_key_vault_url: Option<String>,

    /// Override for the user secrets root directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets_root: Option<PathBuf>,

    /// GitHub endpoints and OAuth application
    #[serde(default)]
    pub github: GitHubSettings,

    /// Network and HTTP configuration
    #[serde(default)]
    pub network: NetworkSettings,
}

/// Remote repository kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    /// Secret GitHub gists, one per solution, encrypted on the client
    #[default]
    #[serde(rename = "github")]
    GitHub,
    /// Azure Key Vault, one secret per container, encrypted by the service
    #[serde(rename = "azurekv")]
    AzureKeyVault,
}

impl RepositoryType {
    /// Stable identifier used in configuration and display
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryType::GitHub => "github",
            RepositoryType::AzureKeyVault => "azurekv",
        }
    }
}

impl std::fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RepositoryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" | "gist" => Ok(RepositoryType::GitHub),
            "azurekv" | "azure" | "keyvault" => Ok(RepositoryType::AzureKeyVault),
            other => Err(Error::invalid_repository(other)),
        }
    }
}

/// GitHub endpoints and OAuth application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitHubSettings {
    /// REST API base URL
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// OAuth base URL (device code and token exchange)
    #[serde(default = "default_github_oauth_url")]
    pub oauth_url: String,

    /// OAuth application client id used for the device flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            oauth_url: default_github_oauth_url(),
            client_id: None,
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_oauth_url() -> String {
    "https://github.com".to_string()
}

/// Network and HTTP configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkSettings {
    /// HTTP timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// User agent string for HTTP requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_http_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("vs-secrets/{}", env!("CARGO_PKG_VERSION"))
}
