//! Search command

use anyhow::{Context, Result};
use vs_secrets_sync::Discovery;

use super::load_settings;
use crate::cli::PathArgs;
use crate::output;

/// Lists solutions without contacting the remote repository
pub fn run(args: PathArgs) -> Result<()> {
    let settings = load_settings()?;
    let secrets_root = match settings.secrets_root {
        Some(root) => root,
        None => vs_secrets_core::user_secrets_root()?,
    };
    let path = match args.path {
        Some(path) => path,
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };

    let solutions = Discovery::new(secrets_root).search(&path)?;
    if solutions.is_empty() {
        output::warning(&format!("No solution found at {}", path.display()));
        return Ok(());
    }

    for discovered in &solutions {
        output::section(&discovered.solution.description());
        if discovered.containers.is_empty() {
            output::info("No project declares user secrets");
            continue;
        }
        for container in &discovered.containers {
            let state = if container.has_content() { "present" } else { "missing" };
            output::field(
                &container.secrets_id,
                &format!("{} ({})", container.path.display(), state),
            );
        }
    }
    Ok(())
}
