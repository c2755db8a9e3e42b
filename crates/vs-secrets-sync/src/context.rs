//! Per-invocation synchronization context

use crate::cipher::Cipher;
use crate::discovery::Discovery;
use crate::repository::{create_repository, RepositoryResult, SecretRepository};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use vs_secrets_core::store::{KEY_STORE_FILE, TOKEN_STORE_FILE};
use vs_secrets_core::{user_secrets_root, JsonFileStore, Settings};

/// Everything the sync and status engines need, built once per invocation
pub struct SyncContext {
    pub cipher: Cipher,
    pub repository: Box<dyn SecretRepository>,
    pub discovery: Discovery,
    /// Never start interactive authorization
    pub batch_mode: bool,
    authorized: AtomicBool,
}

impl SyncContext {
    pub fn new(
        cipher: Cipher,
        repository: Box<dyn SecretRepository>,
        secrets_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cipher,
            repository,
            discovery: Discovery::new(secrets_root),
            batch_mode: false,
            authorized: AtomicBool::new(false),
        }
    }

    /// Build the context from settings and the stores in the state directory
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let secrets_root = match &settings.secrets_root {
            Some(root) => root.clone(),
            None => user_secrets_root()?,
        };
        debug!("User secrets root: {}", secrets_root.display());

        let cipher = Cipher::load(JsonFileStore::in_state_dir(KEY_STORE_FILE)?);
        let tokens = JsonFileStore::in_state_dir(TOKEN_STORE_FILE)?;
        let repository = create_repository(settings, tokens)
            .context("Failed to create the remote repository")?;

        Ok(Self::new(cipher, repository, secrets_root))
    }

    pub fn with_batch_mode(mut self, batch_mode: bool) -> Self {
        self.batch_mode = batch_mode;
        self
    }

    /// Authorize with the repository once per invocation. A failure is
    /// retried by the next caller.
    pub async fn ensure_authorized(&self) -> RepositoryResult<()> {
        if self.authorized.load(Ordering::Acquire) {
            return Ok(());
        }

        self.repository.authorize(self.batch_mode).await?;
        self.authorized.store(true, Ordering::Release);
        Ok(())
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("cipher", &self.cipher)
            .field("repository", &self.repository.repository_type())
            .field("discovery", &self.discovery)
            .field("batch_mode", &self.batch_mode)
            .finish()
    }
}
