//! Configure command

use anyhow::{Context, Result};
use vs_secrets_core::{ConfigLoader, RepositoryType, Settings};

use crate::cli::ConfigureArgs;
use crate::output;

pub fn run(args: ConfigureArgs) -> Result<()> {
    let loader = ConfigLoader::new()?;
    let mut settings = if args.reset {
        Settings::default()
    } else {
        loader.load_file()?.unwrap_or_default()
    };

    let changed = apply(&mut settings, &args)?;
    if changed {
        loader.save(&settings)?;
        output::success(&format!("Saved {}", loader.config_path().display()));
    }

    output::section("Configuration");
    output::field("repository", settings.repository.as_str());
    output::field(
        "azure-key-vault-url",
        settings.azure_key_vault_url.as_deref().unwrap_or("(not set)"),
    );
    output::field(
        "github.client-id",
        settings.github.client_id.as_deref().unwrap_or("(not set)"),
    );
    let secrets_root = settings
        .secrets_root
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(platform default)".to_string());
    output::field("secrets-root", &secrets_root);
    Ok(())
}

/// Apply flags to `settings`; true when anything must be saved
fn apply(settings: &mut Settings, args: &ConfigureArgs) -> Result<bool> {
    let mut changed = args.reset;

    if let Some(repository) = &args.repository {
        settings.repository = repository
            .parse::<RepositoryType>()
            .context("Invalid --repository")?;
        changed = true;
    }
    if let Some(url) = &args.azure_key_vault_url {
        settings.azure_key_vault_url = Some(url.trim_end_matches('/').to_string());
        changed = true;
    }
    if let Some(client_id) = &args.github_client_id {
        settings.github.client_id = Some(client_id.clone());
        changed = true;
    }
    if let Some(root) = &args.secrets_root {
        settings.secrets_root = Some(root.clone());
        changed = true;
    }

    Ok(changed)
}
