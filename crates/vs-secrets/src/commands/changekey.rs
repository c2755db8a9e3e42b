//! Changekey command

use anyhow::{bail, Result};
use dialoguer::Confirm;
use vs_secrets_sync::change_key;

use super::{key_material, load_context};
use crate::cli::ChangekeyArgs;
use crate::output;

pub async fn run(args: ChangekeyArgs, batch: bool) -> Result<()> {
    let mut ctx = load_context(batch)?;

    let Some(material) = key_material(&args.key, batch, "New passphrase")? else {
        bail!("The new key must not be empty");
    };

    if !args.yes {
        if batch {
            bail!("Changing the key requires --yes in batch mode");
        }

        output::info("Every remote bundle will be re-encrypted with the new key");
        let confirmed = Confirm::new()
            .with_prompt("Continue?")
            .default(false)
            .interact()?;

        if !confirmed {
            output::info("Key change cancelled");
            return Ok(());
        }
    }

    let report = change_key(&mut ctx, &material).await?;

    for name in &report.reencrypted {
        output::success(&format!("Re-encrypted {}", name));
    }
    for name in &report.skipped {
        output::warning(&format!("Skipped {} (unsupported or missing header)", name));
    }
    for name in &report.failed {
        output::error(&format!(
            "Failed to upload {}; it still uses the previous key. Run `vs-secrets push` for it",
            name
        ));
    }

    if report.failed.is_empty() {
        output::success("Encryption key changed");
        Ok(())
    } else {
        bail!("Encryption key changed; {} bundle(s) need to be pushed again", report.failed.len())
    }
}
