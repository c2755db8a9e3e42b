//! Status reconciliation
//!
//! Compares the local containers of a solution with its remote bundle and
//! classifies the relationship. Nothing on disk or remotely is modified.

use crate::bundle::{parse_bundle, BundleEntries, EntryKey, ParsedBundle};
use crate::container::{SecretContainer, SecretFormat};
use crate::context::SyncContext;
use crate::repository::RepositoryError;
use crate::solution::Solution;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Per-entry comparison counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffCounts {
    /// Content only on this machine
    pub local_only: usize,
    /// Content only in the remote bundle
    pub remote_only: usize,
    pub equal: usize,
    pub different: usize,
    /// Declared containers with content on neither side
    pub unmanaged: usize,
    /// Remote entries that could not be decrypted
    pub undecryptable: usize,
    /// Local content whose remote counterpart could not be decrypted
    pub local_undecryptable: usize,
}

impl DiffCounts {
    /// Containers with content on this machine
    pub fn local_present(&self) -> usize {
        self.local_only + self.equal + self.different + self.local_undecryptable
    }

    /// Remote entries, decryptable or not
    pub fn remote_present(&self) -> usize {
        self.remote_only + self.equal + self.different + self.undecryptable
    }
}

/// Relationship between local and remote secrets of one solution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Synchronized,
    /// No project declares user secrets
    Unmanaged,
    NoSecretsFound,
    HeaderError,
    ContentError,
    LocalOnly,
    CloudOnly { invalid_key: bool },
    NotSynchronized(DiffCounts),
    InvalidKey,
    AuthenticationFailed,
    Unauthorized,
    CannotLoadStatus,
}

impl SyncStatus {
    pub fn is_synchronized(&self) -> bool {
        matches!(self, SyncStatus::Synchronized)
    }

    /// Whether the status reflects a problem the user must act on
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            SyncStatus::HeaderError
                | SyncStatus::ContentError
                | SyncStatus::InvalidKey
                | SyncStatus::CloudOnly { invalid_key: true }
                | SyncStatus::AuthenticationFailed
                | SyncStatus::Unauthorized
                | SyncStatus::CannotLoadStatus
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Synchronized => write!(f, "Synchronized"),
            SyncStatus::Unmanaged => write!(f, "Unmanaged"),
            SyncStatus::NoSecretsFound => write!(f, "No secrets found"),
            SyncStatus::HeaderError => write!(f, "Header error"),
            SyncStatus::ContentError => write!(f, "Content error"),
            SyncStatus::LocalOnly => write!(f, "Local only"),
            SyncStatus::CloudOnly { invalid_key: false } => write!(f, "Cloud only"),
            SyncStatus::CloudOnly { invalid_key: true } => write!(f, "Cloud only (invalid key)"),
            SyncStatus::NotSynchronized(counts) => write!(
                f,
                "Not synchronized ({} local only, {} remote only, {} different)",
                counts.local_only, counts.remote_only, counts.different
            ),
            SyncStatus::InvalidKey => write!(f, "Invalid key"),
            SyncStatus::AuthenticationFailed => write!(f, "Authentication failed"),
            SyncStatus::Unauthorized => write!(f, "Unauthorized"),
            SyncStatus::CannotLoadStatus => write!(f, "Cannot load status"),
        }
    }
}

/// Remote side of a comparison, after decryption
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteView {
    /// Whether a compatible bundle exists
    pub exists: bool,
    /// Decrypted (or plain) content by entry
    pub entries: BundleEntries,
    /// Entries that failed to decrypt
    pub undecryptable: BTreeSet<EntryKey>,
}

/// Count how local containers relate to the remote view
pub fn reconcile(containers: &[SecretContainer], remote: &RemoteView) -> DiffCounts {
    let mut counts = DiffCounts {
        undecryptable: remote.undecryptable.len(),
        ..DiffCounts::default()
    };
    let mut matched = BTreeSet::new();

    for container in containers {
        let key = container.key();
        let remote_content = remote.entries.get(&key);
        let undecryptable = remote.undecryptable.contains(&key);

        match (container.content.as_deref(), remote_content) {
            (Some(local), Some(remote)) => {
                if contents_match(container.format, local, remote) {
                    counts.equal += 1;
                } else {
                    counts.different += 1;
                }
            }
            (Some(_), None) if undecryptable => counts.local_undecryptable += 1,
            (Some(_), None) => counts.local_only += 1,
            (None, Some(_)) => counts.remote_only += 1,
            (None, None) if undecryptable => {}
            (None, None) => counts.unmanaged += 1,
        }
        matched.insert(key);
    }

    counts.remote_only += remote
        .entries
        .keys()
        .filter(|key| !matched.contains(*key))
        .count();

    counts
}

/// Ordered decision procedure over the comparison counts; first match wins
pub fn classify(bundle_exists: bool, container_count: usize, counts: &DiffCounts) -> SyncStatus {
    let local_present = counts.local_present();
    let remote_present = counts.remote_present();

    if bundle_exists
        && counts.local_only == 0
        && counts.remote_only == 0
        && counts.different == 0
        && counts.undecryptable == 0
    {
        SyncStatus::Synchronized
    } else if container_count == 0 {
        SyncStatus::Unmanaged
    } else if local_present == 0 && remote_present == 0 {
        SyncStatus::NoSecretsFound
    } else if remote_present == 0 {
        SyncStatus::LocalOnly
    } else if local_present == 0 {
        SyncStatus::CloudOnly {
            invalid_key: counts.undecryptable > 0,
        }
    } else if counts.local_only + counts.remote_only + counts.different > 0 {
        SyncStatus::NotSynchronized(*counts)
    } else {
        SyncStatus::InvalidKey
    }
}

/// Pull the remote bundle of `solution` and classify it against `containers`
pub async fn compute_status(
    ctx: &SyncContext,
    solution: &Solution,
    containers: &[SecretContainer],
) -> SyncStatus {
    if let Err(e) = ctx.ensure_authorized().await {
        return status_for_error(&e);
    }

    let records = match ctx.repository.pull_files(solution).await {
        Ok(records) => records,
        Err(e) => {
            debug!("Status of {} unavailable: {}", solution.name, e);
            return status_for_error(&e);
        }
    };

    let remote = match parse_bundle(&records) {
        ParsedBundle::HeaderError => return SyncStatus::HeaderError,
        ParsedBundle::ContentError { .. } => return SyncStatus::ContentError,
        ParsedBundle::Absent | ParsedBundle::Incompatible { .. } => RemoteView::default(),
        ParsedBundle::Present { entries, .. } => {
            if ctx.repository.encrypt_on_client() {
                decrypt_view(ctx, entries)
            } else {
                RemoteView {
                    exists: true,
                    entries,
                    undecryptable: BTreeSet::new(),
                }
            }
        }
    };

    let counts = reconcile(containers, &remote);
    debug!("Status counts for {}: {:?}", solution.name, counts);
    classify(remote.exists, containers.len(), &counts)
}

fn decrypt_view(ctx: &SyncContext, entries: BundleEntries) -> RemoteView {
    let mut view = RemoteView {
        exists: true,
        ..RemoteView::default()
    };

    for (key, content) in entries {
        match ctx.cipher.decrypt(&content) {
            Some(plain) => {
                view.entries.insert(key, plain);
            }
            None => {
                view.undecryptable.insert(key);
            }
        }
    }

    view
}

fn status_for_error(error: &RepositoryError) -> SyncStatus {
    match error {
        RepositoryError::Authentication(_) => SyncStatus::AuthenticationFailed,
        RepositoryError::Unauthorized(_) => SyncStatus::Unauthorized,
        _ => SyncStatus::CannotLoadStatus,
    }
}

/// JSON content is compared structurally so formatting differences do not count
fn contents_match(format: SecretFormat, local: &str, remote: &str) -> bool {
    if local == remote {
        return true;
    }

    match format {
        SecretFormat::Json => {
            match (
                serde_json::from_str::<serde_json::Value>(local),
                serde_json::from_str::<serde_json::Value>(remote),
            ) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            }
        }
        SecretFormat::Xml => local.trim() == remote.trim(),
    }
}
