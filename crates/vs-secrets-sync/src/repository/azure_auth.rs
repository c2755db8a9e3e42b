//! Access tokens for Azure Key Vault
//!
//! Credentials are resolved from the environment the way Azure tooling does:
//! a service principal from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
//! `AZURE_CLIENT_SECRET`, otherwise the signed-in Azure CLI account.

use super::{error_body, http_client, RepositoryError, RepositoryResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::env;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::debug;
use vs_secrets_core::NetworkSettings;
use zeroize::Zeroizing;

/// Resource identifier of Azure Key Vault
pub const KEY_VAULT_RESOURCE: &str = "https://vault.azure.net";

const KEY_VAULT_SCOPE: &str = "https://vault.azure.net/.default";

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Tokens this close to expiry are refreshed
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Lifetime assumed when the CLI does not report one
const DEFAULT_CLI_TOKEN_SECS: i64 = 300;

/// Source of Key Vault access tokens
#[derive(Clone)]
pub enum AzureCredential {
    /// Service principal with a client secret
    ClientSecret {
        authority_host: String,
        tenant_id: String,
        client_id: String,
        client_secret: Zeroizing<String>,
    },
    /// `az account get-access-token`
    AzureCli,
    /// A pre-acquired token
    Static(Zeroizing<String>),
}

impl std::fmt::Debug for AzureCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AzureCredential::ClientSecret {
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            AzureCredential::AzureCli => write!(f, "AzureCli"),
            AzureCredential::Static(_) => write!(f, "Static"),
        }
    }
}

struct CachedToken {
    value: Zeroizing<String>,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ClientCredentialsResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    #[serde(default, rename = "expires_on")]
    expires_on: Option<i64>,
}

/// Acquires and caches Key Vault access tokens
pub struct AzureTokenProvider {
    client: reqwest::Client,
    credential: AzureCredential,
    cached: RwLock<Option<CachedToken>>,
}

impl AzureTokenProvider {
    pub fn new(credential: AzureCredential, network: &NetworkSettings) -> RepositoryResult<Self> {
        Ok(Self {
            client: http_client(network)?,
            credential,
            cached: RwLock::new(None),
        })
    }

    /// Service principal from the environment when fully configured,
    /// otherwise the Azure CLI
    pub fn from_env(network: &NetworkSettings) -> RepositoryResult<Self> {
        let tenant_id = env::var("AZURE_TENANT_ID").ok().filter(|v| !v.is_empty());
        let client_id = env::var("AZURE_CLIENT_ID").ok().filter(|v| !v.is_empty());
        let client_secret = env::var("AZURE_CLIENT_SECRET").ok().filter(|v| !v.is_empty());

        let credential = match (tenant_id, client_id, client_secret) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => {
                debug!("Using Azure service principal {}", client_id);
                AzureCredential::ClientSecret {
                    authority_host: env::var("AZURE_AUTHORITY_HOST")
                        .unwrap_or_else(|_| DEFAULT_AUTHORITY_HOST.to_string()),
                    tenant_id,
                    client_id,
                    client_secret: Zeroizing::new(client_secret),
                }
            }
            _ => {
                debug!("Using Azure CLI credentials");
                AzureCredential::AzureCli
            }
        };

        Self::new(credential, network)
    }

    /// A provider that always hands out `token`
    pub fn with_token(token: impl Into<String>, network: &NetworkSettings) -> RepositoryResult<Self> {
        Self::new(AzureCredential::Static(Zeroizing::new(token.into())), network)
    }

    pub fn credential(&self) -> &AzureCredential {
        &self.credential
    }

    /// Whether a token is cached and still fresh
    pub async fn has_token(&self) -> bool {
        if matches!(self.credential, AzureCredential::Static(_)) {
            return true;
        }
        self.cached
            .read()
            .await
            .as_ref()
            .map(is_fresh)
            .unwrap_or(false)
    }

    /// A valid access token, acquiring a new one when the cache is stale
    pub async fn token(&self) -> RepositoryResult<Zeroizing<String>> {
        if let Some(cached) = self.cached.read().await.as_ref().filter(|c| is_fresh(c)) {
            return Ok(cached.value.clone());
        }

        let fresh = match &self.credential {
            AzureCredential::Static(token) => return Ok(token.clone()),
            AzureCredential::ClientSecret {
                authority_host,
                tenant_id,
                client_id,
                client_secret,
            } => {
                self.client_credentials(authority_host, tenant_id, client_id, client_secret)
                    .await?
            }
            AzureCredential::AzureCli => azure_cli_token().await?,
        };

        let value = fresh.value.clone();
        *self.cached.write().await = Some(fresh);
        Ok(value)
    }

    /// Drop the cached token so the next call acquires a new one
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    async fn client_credentials(
        &self,
        authority_host: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> RepositoryResult<CachedToken> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            authority_host.trim_end_matches('/'),
            tenant_id
        );
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", client_id)
            .append_pair("client_secret", client_secret)
            .append_pair("scope", KEY_VAULT_SCOPE)
            .finish();

        debug!("Requesting Key Vault token from {}", url);
        let response = self
            .client
            .post(&url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body)
            .send()
            .await
            .map_err(|e| RepositoryError::authentication(format!("identity provider: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(RepositoryError::authentication(format!(
                "identity provider answered {}: {}",
                status,
                error_body(response).await
            )));
        }

        let token: ClientCredentialsResponse = response.json().await.map_err(|e| {
            RepositoryError::authentication(format!("identity provider response: {}", e))
        })?;

        Ok(CachedToken {
            value: Zeroizing::new(token.access_token),
            expires_at: Utc::now()
                + ChronoDuration::seconds(token.expires_in.unwrap_or(DEFAULT_CLI_TOKEN_SECS)),
        })
    }
}

impl std::fmt::Debug for AzureTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureTokenProvider")
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

fn is_fresh(token: &CachedToken) -> bool {
    token.expires_at > Utc::now() + ChronoDuration::seconds(EXPIRY_MARGIN_SECS)
}

async fn azure_cli_token() -> RepositoryResult<CachedToken> {
    let az = which::which("az").map_err(|_| {
        RepositoryError::authentication(
            "Azure CLI (az) not found; sign in with `az login` or set AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET",
        )
    })?;

    let output = Command::new(az)
        .args([
            "account",
            "get-access-token",
            "--resource",
            KEY_VAULT_RESOURCE,
            "-o",
            "json",
        ])
        .output()
        .await
        .map_err(|e| RepositoryError::authentication(format!("failed to run az: {}", e)))?;

    if !output.status.success() {
        return Err(RepositoryError::authentication(format!(
            "az account get-access-token failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_cli_token(&output.stdout)
}

fn parse_cli_token(stdout: &[u8]) -> RepositoryResult<CachedToken> {
    let token: CliTokenResponse = serde_json::from_slice(stdout)
        .map_err(|e| RepositoryError::authentication(format!("unexpected az output: {}", e)))?;

    let expires_at = token
        .expires_on
        .and_then(|epoch| DateTime::<Utc>::from_timestamp(epoch, 0))
        .unwrap_or_else(|| Utc::now() + ChronoDuration::seconds(DEFAULT_CLI_TOKEN_SECS));

    Ok(CachedToken {
        value: Zeroizing::new(token.access_token),
        expires_at,
    })
}
