//! # vs-secrets-core
//!
//! Core library for the vs-secrets CLI providing:
//! - Configuration loading (`~/.vs-secrets/config.yaml` + `VS_SECRETS_*` overrides)
//! - Error types shared by the other crates
//! - Atomic JSON key-value stores for the encryption key and OAuth tokens
//! - Home and state directory helpers

pub mod config;
pub mod error;
pub mod store;
pub mod utils;

pub use config::{ConfigLoader, GitHubSettings, NetworkSettings, RepositoryType, Settings};
pub use error::{Error, Result};
pub use store::JsonFileStore;
pub use utils::{get_home_dir, state_dir, user_secrets_root};
