//! Opaque key-value JSON stores
//!
//! The encryption key and OAuth tokens are kept in small JSON files under the
//! state directory. Files are read on first access and rewritten atomically
//! (temp file in the same directory, then rename) whenever a value changes.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// File name of the encryption key store
pub const KEY_STORE_FILE: &str = "cipher.json";

/// File name of the OAuth token store
pub const TOKEN_STORE_FILE: &str = "tokens.json";

/// A flat string-to-string map persisted as a JSON document
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<Option<BTreeMap<String, String>>>,
}

impl JsonFileStore {
    /// Create a store backed by `path`. Nothing is read until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    /// Create a store for `file_name` inside the state directory
    pub fn in_state_dir(file_name: &str) -> Result<Self> {
        Ok(Self::new(crate::utils::state_dir()?.join(file_name)))
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a value
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_entries(|entries| Ok(entries.get(key).cloned()))
    }

    /// Insert or replace a value and persist the store
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), value.to_string());
            Ok(())
        })?;
        self.flush()
    }

    /// Remove a value and persist the store. Removing a missing key is a no-op.
    pub fn remove(&self, key: &str) -> Result<()> {
        let removed = self.with_entries(|entries| Ok(entries.remove(key).is_some()))?;
        if removed {
            self.flush()?;
        }
        Ok(())
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| Error::store(self.path.display().to_string(), "store lock poisoned"))?;

        if guard.is_none() {
            *guard = Some(self.load()?);
        }

        match guard.as_mut() {
            Some(entries) => f(entries),
            None => Err(Error::store(
                self.path.display().to_string(),
                "store not loaded",
            )),
        }
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            debug!("Store {} does not exist yet", self.path.display());
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            Error::store(
                self.path.display().to_string(),
                format!("invalid JSON: {}", e),
            )
        })
    }

    fn flush(&self) -> Result<()> {
        let snapshot = self.with_entries(|entries| Ok(entries.clone()))?;
        let json = serde_json::to_string_pretty(&snapshot)?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))?;
        }

        tmp.persist(&self.path)
            .map_err(|e| Error::store(self.path.display().to_string(), e.to_string()))?;

        debug!("Wrote store {}", self.path.display());
        Ok(())
    }
}

impl std::fmt::Debug for JsonFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get("key").unwrap(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_set_persists_and_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("tokens.json");

        let store = JsonFileStore::new(&path);
        store.set("github", "gho_abc").unwrap();
        assert!(path.exists());

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.get("github").unwrap().as_deref(), Some("gho_abc"));
    }

    #[test]
    fn test_remove_clears_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cipher.json");

        let store = JsonFileStore::new(&path);
        store.set("key", "value").unwrap();
        store.remove("key").unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.get("key").unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cipher.json");
        fs::write(&path, "not json").unwrap();

        let store = JsonFileStore::new(&path);
        let err = store.get("key").unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[cfg(unix)]
    #[test]
    fn test_store_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        JsonFileStore::new(&path).set("github", "t").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
