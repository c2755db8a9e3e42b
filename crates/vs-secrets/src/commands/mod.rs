//! CLI command implementations

pub mod changekey;
pub mod configure;
pub mod init;
pub mod pull;
pub mod push;
pub mod search;
pub mod status;

use anyhow::{bail, Context, Result};
use dialoguer::Password;
use std::path::PathBuf;
use tracing::debug;
use vs_secrets_core::{ConfigLoader, Settings};
use vs_secrets_sync::{DiscoveredSolution, KeyMaterial, SyncContext};

use crate::cli::KeyArgs;
use crate::output;

/// Load settings with file and environment precedence
pub(crate) fn load_settings() -> Result<Settings> {
    let loader = ConfigLoader::new()?;
    loader
        .load()
        .with_context(|| format!("Failed to load {}", loader.config_path().display()))
}

/// Build the sync context for one invocation
pub(crate) fn load_context(batch: bool) -> Result<SyncContext> {
    let settings = load_settings()?;
    debug!("Using the {} repository", settings.repository);
    Ok(SyncContext::from_settings(&settings)?.with_batch_mode(batch))
}

/// Discover every solution at `path`, defaulting to the current directory
pub(crate) fn discover(ctx: &SyncContext, path: Option<PathBuf>) -> Result<Vec<DiscoveredSolution>> {
    let path = match path {
        Some(path) => path,
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };

    let solutions = ctx.discovery.search(&path)?;
    if solutions.is_empty() {
        output::warning(&format!("No solution found at {}", path.display()));
    }
    Ok(solutions)
}

/// Key material from flags, or prompted interactively.
///
/// `None` means the key should be cleared.
pub(crate) fn key_material(args: &KeyArgs, batch: bool, prompt: &str) -> Result<Option<KeyMaterial>> {
    if let Some(path) = &args.keyfile {
        return Ok(Some(KeyMaterial::KeyFile(path.clone())));
    }

    let passphrase = match &args.passphrase {
        Some(passphrase) => passphrase.clone(),
        None if batch => bail!("--passphrase or --keyfile is required in batch mode"),
        None => Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()?,
    };

    if passphrase.is_empty() {
        Ok(None)
    } else {
        Ok(Some(KeyMaterial::Passphrase(passphrase)))
    }
}
