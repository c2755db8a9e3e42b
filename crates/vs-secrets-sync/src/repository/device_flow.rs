//! GitHub OAuth device authorization flow
//!
//! Requests a device/user code pair, then polls the token endpoint at the
//! server-provided interval until a token is issued, the user denies access,
//! or the code expires.

use super::{error_body, RepositoryError, RepositoryResult};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Extra delay requested by a `slow_down` answer
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// Scope needed to manage secret gists
const GIST_SCOPE: &str = "gist";

/// Device/user code pair issued by the authorization server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    /// Lifetime of the code in seconds
    pub expires_in: u64,
    /// Minimum polling interval in seconds
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    5
}

/// Result of one poll of the token endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFlowPoll {
    Token(String),
    Pending,
    SlowDown,
    Expired,
    Denied,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    fn into_poll(self) -> RepositoryResult<DeviceFlowPoll> {
        if let Some(token) = self.access_token.filter(|t| !t.is_empty()) {
            return Ok(DeviceFlowPoll::Token(token));
        }

        match self.error.as_deref() {
            Some("authorization_pending") => Ok(DeviceFlowPoll::Pending),
            Some("slow_down") => Ok(DeviceFlowPoll::SlowDown),
            Some("expired_token") => Ok(DeviceFlowPoll::Expired),
            Some("access_denied") => Ok(DeviceFlowPoll::Denied),
            Some(other) => Err(RepositoryError::authentication(format!(
                "{}: {}",
                other,
                self.error_description.unwrap_or_default()
            ))),
            None => Err(RepositoryError::invalid_response(
                "token endpoint returned neither a token nor an error",
            )),
        }
    }
}

/// Device flow client for one OAuth application
pub struct DeviceFlow {
    client: reqwest::Client,
    oauth_url: String,
    client_id: String,
}

impl DeviceFlow {
    pub fn new(client: reqwest::Client, oauth_url: &str, client_id: &str) -> Self {
        Self {
            client,
            oauth_url: oauth_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
        }
    }

    /// Request a new device/user code pair
    pub async fn request_code(&self) -> RepositoryResult<DeviceCode> {
        let url = format!("{}/login/device/code", self.oauth_url);
        debug!("Requesting device code from {}", url);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&serde_json::json!({
                "client_id": self.client_id,
                "scope": GIST_SCOPE,
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

        response
            .json::<DeviceCode>()
            .await
            .map_err(|e| RepositoryError::invalid_response(format!("device code: {}", e)))
    }

    /// Poll the token endpoint once
    pub async fn poll(&self, code: &DeviceCode) -> RepositoryResult<DeviceFlowPoll> {
        let url = format!("{}/login/oauth/access_token", self.oauth_url);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&serde_json::json!({
                "client_id": self.client_id,
                "device_code": code.device_code,
                "grant_type": DEVICE_GRANT_TYPE,
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

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| RepositoryError::invalid_response(format!("token response: {}", e)))?
            .into_poll()
    }

    /// Poll until a token is issued. Bounded by the code's expiry.
    pub async fn wait_for_token(&self, code: &DeviceCode) -> RepositoryResult<String> {
        let deadline = Instant::now() + Duration::from_secs(code.expires_in);
        let mut interval = Duration::from_secs(code.interval);

        loop {
            tokio::time::sleep(interval).await;
            if Instant::now() > deadline {
                return Err(RepositoryError::authentication("device code expired"));
            }

            match self.poll(code).await? {
                DeviceFlowPoll::Token(token) => return Ok(token),
                DeviceFlowPoll::Pending => debug!("Authorization pending"),
                DeviceFlowPoll::SlowDown => {
                    interval += SLOW_DOWN_STEP;
                    debug!("Slowing down polling to {:?}", interval);
                }
                DeviceFlowPoll::Expired => {
                    return Err(RepositoryError::authentication("device code expired"))
                }
                DeviceFlowPoll::Denied => {
                    return Err(RepositoryError::authentication("access denied by user"))
                }
            }
        }
    }
}

/// Open `url` in the default browser, if an opener is installed
pub fn open_browser(url: &str) {
    let (opener, args): (&str, Vec<&str>) = if cfg!(target_os = "macos") {
        ("open", vec![url])
    } else if cfg!(windows) {
        ("cmd", vec!["/C", "start", "", url])
    } else {
        ("xdg-open", vec![url])
    };

    let Ok(program) = which::which(opener) else {
        debug!("No browser opener ({}) found", opener);
        return;
    };

    if let Err(e) = std::process::Command::new(program)
        .args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
    {
        warn!("Failed to open browser: {}", e);
    }
}
