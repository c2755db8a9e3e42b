//! Shared utility functions for vs-secrets crates

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Name of the per-user state directory under the home directory
const STATE_DIR_NAME: &str = ".vs-secrets";

/// Get the user's home directory
///
/// Prefers the HOME environment variable over dirs::home_dir() so that
/// containers and test harnesses that override HOME are respected.
pub fn get_home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }

    dirs::home_dir().ok_or(Error::NoHomeDir)
}

/// Directory holding configuration, the key store and the token store.
///
/// `VS_SECRETS_HOME` overrides the default `~/.vs-secrets`.
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("VS_SECRETS_HOME") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    Ok(get_home_dir()?.join(STATE_DIR_NAME))
}

/// Default root directory for per-project user secrets.
///
/// Windows keeps them under `%APPDATA%\Microsoft\UserSecrets`, every other
/// platform under `~/.microsoft/usersecrets`.
pub fn user_secrets_root() -> Result<PathBuf> {
    if cfg!(windows) {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return Ok(PathBuf::from(appdata).join("Microsoft").join("UserSecrets"));
        }
        return dirs::config_dir()
            .map(|dir| dir.join("Microsoft").join("UserSecrets"))
            .ok_or(Error::NoHomeDir);
    }

    Ok(get_home_dir()?.join(".microsoft").join("usersecrets"))
}
