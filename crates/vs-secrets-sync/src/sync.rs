//! Push, pull and key rotation
//!
//! Solutions are processed one at a time. A failure ends processing of that
//! solution only and is reported as its outcome.

use crate::bundle::{build_records, entries_from_containers, parse_bundle, BundleEntries, ParsedBundle};
use crate::cipher::{Cipher, KeyMaterial};
use crate::container::SecretContainer;
use crate::context::SyncContext;
use crate::discovery::DiscoveredSolution;
use crate::repository::RepositoryError;
use crate::solution::Solution;
use anyhow::{bail, Context, Result};
use std::fmt;
use tracing::{debug, info, warn};

/// Why a solution could not be synchronized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncFailure {
    AuthenticationFailed(String),
    Unauthorized(String),
    /// No encryption key is loaded
    CipherNotReady,
    EncryptionFailed,
    /// Remote content cannot be decrypted with the current key
    InvalidKey,
    HeaderError,
    ContentError(String),
    Transport(String),
    Io(String),
}

impl From<RepositoryError> for SyncFailure {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Authentication(message) => SyncFailure::AuthenticationFailed(message),
            RepositoryError::Unauthorized(message) => SyncFailure::Unauthorized(message),
            other => SyncFailure::Transport(other.to_string()),
        }
    }
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncFailure::AuthenticationFailed(m) => write!(f, "authentication failed: {}", m),
            SyncFailure::Unauthorized(m) => write!(f, "not authorized: {}", m),
            SyncFailure::CipherNotReady => write!(f, "no encryption key; run `vs-secrets init`"),
            SyncFailure::EncryptionFailed => write!(f, "encryption failed"),
            SyncFailure::InvalidKey => write!(f, "remote secrets cannot be decrypted with the current key"),
            SyncFailure::HeaderError => write!(f, "remote header is missing or invalid"),
            SyncFailure::ContentError(m) => write!(f, "remote content is invalid: {}", m),
            SyncFailure::Transport(m) => write!(f, "{}", m),
            SyncFailure::Io(m) => write!(f, "{}", m),
        }
    }
}

/// Result of pushing one solution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Done,
    /// No container carries content
    SkippedEmpty,
    Failed(SyncFailure),
}

/// Result of pulling one solution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    Done,
    /// No usable bundle exists remotely
    NotFound,
    Failed(SyncFailure),
}

/// Summary of a key rotation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeKeyReport {
    /// Bundles re-encrypted and pushed with the new key
    pub reencrypted: Vec<String>,
    /// Bundles skipped because they are unusable
    pub skipped: Vec<String>,
    /// Bundles whose upload failed; they remain encrypted with the previous
    /// key and must be pushed again from local content
    pub failed: Vec<String>,
}

/// Encrypt (when required) and upload the containers of one solution
pub async fn push(
    ctx: &SyncContext,
    solution: &Solution,
    containers: &[SecretContainer],
) -> PushOutcome {
    if !containers.iter().any(SecretContainer::has_content) {
        debug!("Nothing to push for {}", solution.name);
        return PushOutcome::SkippedEmpty;
    }

    let encrypt = ctx.repository.encrypt_on_client();
    if encrypt && !ctx.cipher.is_ready() {
        return PushOutcome::Failed(SyncFailure::CipherNotReady);
    }

    if let Err(e) = ctx.ensure_authorized().await {
        return PushOutcome::Failed(e.into());
    }

    let mut outgoing = containers.to_vec();
    if encrypt {
        for container in &mut outgoing {
            if !container.encrypt(&ctx.cipher) {
                warn!("Failed to encrypt {}", container.path.display());
                return PushOutcome::Failed(SyncFailure::EncryptionFailed);
            }
        }
    }

    let Some(records) = build_records(solution, &entries_from_containers(&outgoing)) else {
        return PushOutcome::Failed(SyncFailure::HeaderError);
    };

    match ctx.repository.push_files(solution, &records).await {
        Ok(()) => {
            info!("Pushed secrets of {}", solution.name);
            PushOutcome::Done
        }
        Err(e) => {
            warn!("Push of {} failed: {}", solution.name, e);
            PushOutcome::Failed(e.into())
        }
    }
}

/// Download, decrypt (when required) and write the containers of one solution.
///
/// Nothing is written unless every remote entry decrypts and is well-formed.
pub async fn pull(
    ctx: &SyncContext,
    solution: &Solution,
    containers: &mut [SecretContainer],
) -> PullOutcome {
    let encrypt = ctx.repository.encrypt_on_client();
    if encrypt && !ctx.cipher.is_ready() {
        return PullOutcome::Failed(SyncFailure::CipherNotReady);
    }

    if let Err(e) = ctx.ensure_authorized().await {
        return PullOutcome::Failed(e.into());
    }

    let records = match ctx.repository.pull_files(solution).await {
        Ok(records) => records,
        Err(e) => {
            warn!("Pull of {} failed: {}", solution.name, e);
            return PullOutcome::Failed(e.into());
        }
    };

    let entries = match parse_bundle(&records) {
        ParsedBundle::Present { entries, .. } => entries,
        ParsedBundle::Absent | ParsedBundle::Incompatible { .. } => return PullOutcome::NotFound,
        ParsedBundle::HeaderError => return PullOutcome::Failed(SyncFailure::HeaderError),
        ParsedBundle::ContentError { record } => {
            return PullOutcome::Failed(SyncFailure::ContentError(record))
        }
    };

    let entries = if encrypt {
        match decrypt_entries(&ctx.cipher, &entries) {
            Some(plain) => plain,
            None => return PullOutcome::Failed(SyncFailure::InvalidKey),
        }
    } else {
        entries
    };

    let mut updates = Vec::new();
    for (index, container) in containers.iter().enumerate() {
        let key = container.key();
        if let Some(content) = entries.get(&key) {
            if !container.format.is_well_formed(content) {
                return PullOutcome::Failed(SyncFailure::ContentError(container.container_name.clone()));
            }
            updates.push((index, content.clone()));
        }
    }

    for (index, content) in updates {
        let container = &mut containers[index];
        container.content = Some(content);
        if let Err(e) = container.write() {
            warn!("{:#}", e);
            return PullOutcome::Failed(SyncFailure::Io(format!("{:#}", e)));
        }
    }

    info!("Pulled secrets of {}", solution.name);
    PullOutcome::Done
}

/// Push every solution in order
pub async fn push_all(
    ctx: &SyncContext,
    solutions: &[DiscoveredSolution],
) -> Vec<(String, PushOutcome)> {
    let mut outcomes = Vec::with_capacity(solutions.len());
    for discovered in solutions {
        let outcome = push(ctx, &discovered.solution, &discovered.containers).await;
        outcomes.push((discovered.solution.name.clone(), outcome));
    }
    outcomes
}

/// Pull every solution in order
pub async fn pull_all(
    ctx: &SyncContext,
    solutions: &mut [DiscoveredSolution],
) -> Vec<(String, PullOutcome)> {
    let mut outcomes = Vec::with_capacity(solutions.len());
    for discovered in solutions.iter_mut() {
        let outcome = pull(ctx, &discovered.solution, &mut discovered.containers).await;
        outcomes.push((discovered.solution.name.clone(), outcome));
    }
    outcomes
}

/// Derive and persist the key from `material`. `None` or empty material
/// clears the stored key.
pub fn init_key(ctx: &mut SyncContext, material: Option<&KeyMaterial>) -> Result<()> {
    ctx.cipher.init(material)?;
    if ctx.cipher.is_ready() {
        info!("Encryption key initialized");
    } else {
        info!("Encryption key cleared");
    }
    Ok(())
}

/// Rotate the encryption key.
///
/// Every remote bundle must decrypt with the current key before anything is
/// re-encrypted. Once any re-encrypted bundle has been uploaded the new key is
/// persisted, even if other uploads fail; those are listed in
/// [`ChangeKeyReport::failed`]. If no upload succeeds the key is unchanged.
pub async fn change_key(ctx: &mut SyncContext, material: &KeyMaterial) -> Result<ChangeKeyReport> {
    let replacement = Cipher::derive(material)?;
    if !replacement.is_ready() {
        bail!("The new key is empty");
    }

    if !ctx.repository.encrypt_on_client() {
        ctx.cipher.adopt(replacement)?;
        info!(
            "Key replaced; {} content is not encrypted on the client",
            ctx.repository.repository_type()
        );
        return Ok(ChangeKeyReport::default());
    }

    if !ctx.cipher.is_ready() {
        bail!("No encryption key is loaded; run `vs-secrets init` first");
    }

    ctx.ensure_authorized()
        .await
        .context("Failed to authorize with the remote repository")?;

    let bundles = ctx
        .repository
        .pull_all_secrets()
        .await
        .context("Failed to download remote secrets")?;

    let mut report = ChangeKeyReport::default();
    let mut reencrypted = Vec::new();

    for bundle in bundles {
        let name = bundle.solution.description();
        let entries = match parse_bundle(&bundle.records) {
            ParsedBundle::Present { entries, .. } => entries,
            ParsedBundle::Absent | ParsedBundle::Incompatible { .. } => {
                warn!("Skipping unusable bundle {}", name);
                report.skipped.push(name);
                continue;
            }
            ParsedBundle::HeaderError | ParsedBundle::ContentError { .. } => {
                bail!("Remote secrets of {} are corrupt; key not changed", name);
            }
        };

        let Some(plain) = decrypt_entries(&ctx.cipher, &entries) else {
            bail!(
                "Remote secrets of {} cannot be decrypted with the current key; key not changed",
                name
            );
        };

        let mut rotated = BundleEntries::new();
        for (key, content) in plain {
            let Some(encrypted) = replacement.encrypt(&content) else {
                bail!("Encryption with the new key failed");
            };
            rotated.insert(key, encrypted);
        }

        let Some(records) = build_records(&bundle.solution, &rotated) else {
            bail!("Failed to build header for {}", name);
        };
        reencrypted.push((bundle.solution, records));
    }

    let mut last_error = None;
    for (solution, records) in &reencrypted {
        match ctx.repository.push_files(solution, records).await {
            Ok(()) => report.reencrypted.push(solution.description()),
            Err(e) => {
                warn!("Failed to upload re-encrypted secrets of {}: {}", solution.name, e);
                report.failed.push(solution.description());
                last_error = Some(e);
            }
        }
    }

    if report.reencrypted.is_empty() {
        if let Some(e) = last_error {
            return Err(e).context("Failed to upload re-encrypted secrets; key not changed");
        }
    }

    ctx.cipher.adopt(replacement)?;
    if report.failed.is_empty() {
        info!("Encryption key changed ({} bundle(s) re-encrypted)", report.reencrypted.len());
    } else {
        warn!(
            "Encryption key changed but {} bundle(s) still use the previous key",
            report.failed.len()
        );
    }
    Ok(report)
}

/// Decrypt every entry; `None` if any entry fails
pub(crate) fn decrypt_entries(cipher: &Cipher, entries: &BundleEntries) -> Option<BundleEntries> {
    entries
        .iter()
        .map(|(key, content)| cipher.decrypt(content).map(|plain| (key.clone(), plain)))
        .collect()
}
