//! Configuration loading and management

mod loader;
mod settings;

pub use loader::ConfigLoader;
pub use settings::{GitHubSettings, NetworkSettings, RepositoryType, Settings};
