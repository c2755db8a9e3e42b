//! # vs-secrets-sync
//!
//! Synchronizes solution user secrets with a remote repository:
//! - [`discovery`]: which projects own secrets and where they live on disk
//! - [`cipher`]: client-side AES-256-CBC encryption
//! - [`repository`]: GitHub gist and Azure Key Vault backends
//! - [`sync`]: push, pull and key rotation
//! - [`status`]: local/remote reconciliation

pub mod bundle;
pub mod cipher;
pub mod container;
pub mod context;
pub mod discovery;
pub mod header;
pub mod repository;
pub mod solution;
pub mod status;
pub mod sync;

pub use cipher::{Cipher, KeyMaterial};
pub use container::{SecretContainer, SecretFormat};
pub use context::SyncContext;
pub use discovery::{DiscoveredSolution, Discovery};
pub use header::HeaderMetadata;
pub use repository::{
    create_repository, RemoteBundle, RemoteRecord, RepositoryError, SecretRepository,
};
pub use solution::Solution;
pub use status::{compute_status, DiffCounts, SyncStatus};
pub use sync::{change_key, init_key, pull, push, ChangeKeyReport, PullOutcome, PushOutcome, SyncFailure};
