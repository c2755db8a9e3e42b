//! Common test infrastructure for vs-secrets-sync tests
//!
//! # Usage
//!
//! In your test file, add:
//! ```ignore
//! mod common;
//! use common::*;
//! ```
//!
//! # Modules
//!
//! - `constants`: Solution identifiers, tokens and sample secrets
//! - `fixtures`: On-disk solutions with projects and user secrets
//! - `memory_repository`: In-memory `SecretRepository` for engine tests
//! - `mock_server`: Wiremock setup helpers for the GitHub and Key Vault APIs

// Each test binary uses a different subset of the helpers
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod constants;
pub mod fixtures;
pub mod memory_repository;
pub mod mock_server;

pub use constants::*;
pub use fixtures::*;
pub use memory_repository::*;
pub use mock_server::*;
