//! Init command

use anyhow::Result;
use vs_secrets_sync::init_key;

use super::{key_material, load_context};
use crate::cli::KeyArgs;
use crate::output;

pub async fn run(args: KeyArgs, batch: bool) -> Result<()> {
    let mut ctx = load_context(batch)?;

    if !ctx.repository.encrypt_on_client() {
        output::info(&format!(
            "The {} repository encrypts secrets itself; the key is only used with github",
            ctx.repository.repository_type()
        ));
    }

    let material = key_material(&args, batch, "Passphrase (empty to clear the key)")?;
    init_key(&mut ctx, material.as_ref())?;

    if ctx.cipher.is_ready() {
        output::success("Encryption key created");
    } else {
        output::warning("Encryption key cleared");
    }
    Ok(())
}
