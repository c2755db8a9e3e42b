//! Secret containers: one local secrets file belonging to one project

use crate::bundle::EntryKey;
use crate::cipher::Cipher;
use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

static SECRETS_ROOT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<secrets[\s/>]").expect("secrets root regex is valid"));
static SECRET_ELEMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<secret[\s/>]").expect("secret element regex is valid"));

/// File name of project-native (JSON) user secrets
pub const JSON_FILE_NAME: &str = "secrets.json";

/// File name of legacy configuration-builder (XML) user secrets
pub const XML_FILE_NAME: &str = "secrets.xml";

/// Content format of a secrets file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretFormat {
    Json,
    Xml,
}

impl SecretFormat {
    /// Local file name for this format
    pub fn file_name(&self) -> &'static str {
        match self {
            SecretFormat::Json => JSON_FILE_NAME,
            SecretFormat::Xml => XML_FILE_NAME,
        }
    }

    /// Whether `content` carries no secrets at all
    pub fn is_effectively_empty(&self, content: &str) -> bool {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return true;
        }

        match self {
            SecretFormat::Json => match serde_json::from_str::<serde_json::Value>(trimmed) {
                Ok(serde_json::Value::Object(map)) => map.is_empty(),
                _ => false,
            },
            SecretFormat::Xml => {
                SECRETS_ROOT_RE.is_match(trimmed) && !SECRET_ELEMENT_RE.is_match(trimmed)
            }
        }
    }

    /// Whether `content` is well-formed enough to be written to disk
    pub fn is_well_formed(&self, content: &str) -> bool {
        match self {
            SecretFormat::Json => serde_json::from_str::<serde_json::Value>(content).is_ok(),
            SecretFormat::Xml => content.trim_start().starts_with('<'),
        }
    }

    /// Format implied by a local file name
    pub fn from_file_name(name: &str) -> Option<Self> {
        match name {
            JSON_FILE_NAME => Some(SecretFormat::Json),
            XML_FILE_NAME => Some(SecretFormat::Xml),
            _ => None,
        }
    }
}

/// One named secret payload within a solution
#[derive(Debug, Clone, PartialEq)]
pub struct SecretContainer {
    /// Remote container name, `secrets\{identifier}.json`
    pub container_name: String,
    /// Local file name, `secrets.json` or `secrets.xml`
    pub name: String,
    /// Secret identifier declared by the project
    pub secrets_id: String,
    /// Resolved on-disk location
    pub path: PathBuf,
    /// Project file that declared the identifier
    pub project: PathBuf,
    pub format: SecretFormat,
    /// Raw content; `None` when nothing is recorded
    pub content: Option<String>,
}

impl SecretContainer {
    /// Build a container and load its content from `path`
    pub fn load(
        secrets_id: &str,
        format: SecretFormat,
        path: PathBuf,
        project: PathBuf,
    ) -> Self {
        let content = read_content(&path, format);
        Self {
            container_name: container_name_for(secrets_id),
            name: format.file_name().to_string(),
            secrets_id: secrets_id.to_string(),
            path,
            project,
            format,
            content,
        }
    }

    /// Pair key used to match local and remote entries
    pub fn key(&self) -> EntryKey {
        (self.container_name.clone(), self.name.clone())
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Replace content with its ciphertext. Returns false and leaves content
    /// untouched when the cipher fails.
    pub fn encrypt(&mut self, cipher: &Cipher) -> bool {
        let Some(plain) = self.content.as_deref() else {
            return true;
        };

        match cipher.encrypt(plain) {
            Some(encrypted) => {
                self.content = Some(encrypted);
                true
            }
            None => false,
        }
    }

    /// Replace content with its plaintext. Returns false and leaves content
    /// untouched when the cipher fails.
    pub fn decrypt(&mut self, cipher: &Cipher) -> bool {
        let Some(encrypted) = self.content.as_deref() else {
            return true;
        };

        match cipher.decrypt(encrypted) {
            Some(plain) => {
                self.content = Some(plain);
                true
            }
            None => false,
        }
    }

    /// Write content to disk, creating the secrets directory when needed
    pub fn write(&self) -> Result<()> {
        let Some(content) = &self.content else {
            return Ok(());
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write secrets file: {}", self.path.display()))?;

        debug!("Wrote {}", self.path.display());
        Ok(())
    }
}

/// Remote container name for a secret identifier
pub fn container_name_for(secrets_id: &str) -> String {
    format!("secrets\\{}.json", secrets_id)
}

fn read_content(path: &Path, format: SecretFormat) -> Option<String> {
    if !path.exists() {
        return None;
    }

    match std::fs::read_to_string(path) {
        Ok(content) if format.is_effectively_empty(&content) => {
            debug!("Ignoring empty secrets file {}", path.display());
            None
        }
        Ok(content) => Some(content),
        Err(e) => {
            warn!("Failed to read secrets file {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::KeyMaterial;
    use tempfile::tempdir;

    fn container_at(dir: &Path, format: SecretFormat, content: Option<&str>) -> SecretContainer {
        let path = dir.join("abc").join(format.file_name());
        if let Some(content) = content {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, content).unwrap();
        }
        SecretContainer::load("abc", format, path, dir.join("App.csproj"))
    }

    #[test]
    fn test_empty_json_object_is_absent() {
        let dir = tempdir().unwrap();
        let container = container_at(dir.path(), SecretFormat::Json, Some(" {\n} "));
        assert_eq!(container.content, None);
    }

    #[test]
    fn test_json_with_values_is_present() {
        let dir = tempdir().unwrap();
        let container = container_at(dir.path(), SecretFormat::Json, Some(r#"{"A":"1"}"#));
        assert_eq!(container.content.as_deref(), Some(r#"{"A":"1"}"#));
        assert_eq!(container.container_name, "secrets\\abc.json");
        assert_eq!(container.name, "secrets.json");
    }

    #[test]
    fn test_xml_without_secret_children_is_absent() {
        let dir = tempdir().unwrap();
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<root>
  <secrets ver="1.0" />
</root>"#;
        let container = container_at(dir.path(), SecretFormat::Xml, Some(xml));
        assert_eq!(container.content, None);
    }

    #[test]
    fn test_xml_with_secret_children_is_present() {
        let dir = tempdir().unwrap();
        let xml = r#"<root><secrets ver="1.0"><secret name="k" value="v" /></secrets></root>"#;
        let container = container_at(dir.path(), SecretFormat::Xml, Some(xml));
        assert_eq!(container.name, "secrets.xml");
        assert!(container.has_content());
    }

    #[test]
    fn test_missing_file_is_absent() {
        let dir = tempdir().unwrap();
        let container = container_at(dir.path(), SecretFormat::Json, None);
        assert_eq!(container.content, None);
    }

    #[test]
    fn test_encrypt_then_decrypt_restores_content() {
        let dir = tempdir().unwrap();
        let cipher = Cipher::derive(&KeyMaterial::Passphrase("k".to_string())).unwrap();
        let mut container = container_at(dir.path(), SecretFormat::Json, Some(r#"{"A":"1"}"#));

        assert!(container.encrypt(&cipher));
        assert_ne!(container.content.as_deref(), Some(r#"{"A":"1"}"#));
        assert!(container.decrypt(&cipher));
        assert_eq!(container.content.as_deref(), Some(r#"{"A":"1"}"#));
    }

    #[test]
    fn test_failed_decrypt_leaves_content() {
        let dir = tempdir().unwrap();
        let cipher = Cipher::derive(&KeyMaterial::Passphrase("k".to_string())).unwrap();
        let mut container = container_at(dir.path(), SecretFormat::Json, Some("garbage"));

        assert!(!container.decrypt(&cipher));
        assert_eq!(container.content.as_deref(), Some("garbage"));
    }

    #[test]
    fn test_encrypt_without_key_fails() {
        let dir = tempdir().unwrap();
        let mut container = container_at(dir.path(), SecretFormat::Json, Some(r#"{"A":"1"}"#));
        assert!(!container.encrypt(&Cipher::in_memory()));
        assert_eq!(container.content.as_deref(), Some(r#"{"A":"1"}"#));
    }

    #[test]
    fn test_write_creates_directory() {
        let dir = tempdir().unwrap();
        let mut container = container_at(dir.path(), SecretFormat::Json, None);
        container.content = Some(r#"{"B":"2"}"#.to_string());
        container.write().unwrap();

        let written = std::fs::read_to_string(&container.path).unwrap();
        assert_eq!(written, r#"{"B":"2"}"#);
    }
}
