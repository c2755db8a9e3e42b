//! Hierarchical configuration loader with precedence
//!
//! Loads configuration from multiple sources with the following precedence (low to high):
//! 1. Built-in defaults
//! 2. User config (~/.vs-secrets/config.yaml)
//! 3. Environment variables (VS_SECRETS_* prefix)
//! 4. CLI flags (handled by caller)

use crate::config::settings::{RepositoryType, Settings};
use crate::error::{Error, Result};
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration file name inside the state directory
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Configuration hierarchy loader
pub struct ConfigLoader {
    /// Base directory for configuration files
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Create a loader rooted at the standard state directory
    pub fn new() -> Result<Self> {
        Ok(Self {
            config_dir: crate::utils::state_dir()?,
        })
    }

    /// Create a loader with a custom config directory
    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Directory the loader reads from and writes to
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Path of the user configuration file
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    /// Load settings with hierarchical precedence
    pub fn load(&self) -> Result<Settings> {
        let settings = self.load_file()?.unwrap_or_default();
        self.apply_env_overrides(settings)
    }

    /// Load only the user configuration file, without environment overrides
    pub fn load_file(&self) -> Result<Option<Settings>> {
        let path = self.config_path();
        if !path.exists() {
            debug!("No configuration file at {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(Some(Settings::default()));
        }

        let settings: Settings = serde_yaml_ng::from_str(&content).map_err(|e| {
            Error::invalid_config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        Ok(Some(settings))
    }

    /// Persist settings to the user configuration file
    pub fn save(&self, settings: &Settings) -> Result<()> {
        fs::create_dir_all(&self.config_dir)?;
        let yaml = serde_yaml_ng::to_string(settings)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.config_dir)?;
        tmp.write_all(yaml.as_bytes())?;
        let path = self.config_path();
        tmp.persist(&path)
            .map_err(|e| Error::store(path.display().to_string(), e.to_string()))?;

        debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Apply environment variable overrides to the settings
    fn apply_env_overrides(&self, mut settings: Settings) -> Result<Settings> {
        if let Ok(val) = env::var("VS_SECRETS_REPOSITORY") {
            settings.repository = val.parse::<RepositoryType>()?;
        }

        if let Ok(val) = env::var("VS_SECRETS_AZURE_KEY_VAULT_URL") {
            settings.azure_key_vault_url = Some(val);
        }

        if let Ok(val) = env::var("VS_SECRETS_SECRETS_ROOT") {
            settings.secrets_root = Some(PathBuf::from(val));
        }

        if let Ok(val) = env::var("VS_SECRETS_GITHUB_API_URL") {
            settings.github.api_url = val;
        }

        if let Ok(val) = env::var("VS_SECRETS_GITHUB_OAUTH_URL") {
            settings.github.oauth_url = val;
        }

        if let Ok(val) = env::var("VS_SECRETS_GITHUB_CLIENT_ID") {
            settings.github.client_id = Some(val);
        }

        if let Ok(val) = env::var("VS_SECRETS_HTTP_TIMEOUT_SECS") {
            settings.network.http_timeout_secs = val.parse().map_err(|_| {
                Error::invalid_config("VS_SECRETS_HTTP_TIMEOUT_SECS must be a valid number")
            })?;
        }

        Ok(settings)
    }
}
