//! Secret discovery
//!
//! Finds the projects of a solution that declare a user secrets identifier
//! and resolves each identifier to its file under the user secrets root.

use crate::container::{SecretContainer, SecretFormat};
use crate::solution::{Solution, SOLUTION_EXTENSIONS};
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};
use walkdir::WalkDir;

static USER_SECRETS_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<UserSecretsId>\s*([^<]+?)\s*</UserSecretsId>")
        .expect("user secrets id regex is valid")
});

static LEGACY_SECRETS_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"userSecretsId\s*=\s*"([^"]+)""#).expect("legacy secrets id regex is valid")
});

/// Configuration files searched for a legacy declaration beside the project
const LEGACY_CONFIG_FILES: &[&str] = &["Web.config", "App.config"];

/// Directories never descended into during search
const SKIPPED_DIRS: &[&str] = &["bin", "obj", "node_modules"];

/// A solution together with the containers its projects declare
#[derive(Debug, Clone)]
pub struct DiscoveredSolution {
    pub solution: Solution,
    pub containers: Vec<SecretContainer>,
}

/// Resolves solutions to secret containers under a secrets root
#[derive(Debug, Clone)]
pub struct Discovery {
    secrets_root: PathBuf,
}

impl Discovery {
    pub fn new(secrets_root: impl Into<PathBuf>) -> Self {
        Self {
            secrets_root: secrets_root.into(),
        }
    }

    pub fn secrets_root(&self) -> &Path {
        &self.secrets_root
    }

    /// Containers declared by the projects of `solution`, deduplicated by
    /// resolved file path.
    ///
    /// A project that cannot be read is skipped with a warning.
    pub fn containers(&self, solution: &Solution) -> Vec<SecretContainer> {
        let mut seen = HashSet::new();
        let mut containers = Vec::new();

        for project in &solution.projects {
            let declaration = match find_secrets_id(&project.path) {
                Ok(Some(declaration)) => declaration,
                Ok(None) => {
                    debug!("Project {} declares no user secrets", project.name);
                    continue;
                }
                Err(e) => {
                    warn!("Skipping project {}: {:#}", project.path.display(), e);
                    continue;
                }
            };

            let (secrets_id, format) = declaration;
            let path = self
                .secrets_root
                .join(&secrets_id)
                .join(format.file_name());

            if !seen.insert(path.clone()) {
                debug!("Secrets file {} already claimed", path.display());
                continue;
            }

            containers.push(SecretContainer::load(
                &secrets_id,
                format,
                path,
                project.path.clone(),
            ));
        }

        containers
    }

    /// Load one solution and discover its containers
    pub fn discover(&self, solution_path: &Path) -> Result<DiscoveredSolution> {
        let solution = Solution::load(solution_path)?;
        let containers = self.containers(&solution);
        Ok(DiscoveredSolution {
            solution,
            containers,
        })
    }

    /// Discover every solution at `path`.
    ///
    /// A descriptor file yields that solution; a directory is walked
    /// recursively and every descriptor found is loaded, in path order.
    pub fn search(&self, path: &Path) -> Result<Vec<DiscoveredSolution>> {
        if path.is_file() {
            return Ok(vec![self.discover(path)?]);
        }

        if !path.is_dir() {
            anyhow::bail!("Path not found: {}", path.display());
        }

        let mut found = Vec::new();
        for solution_path in find_solution_files(path)? {
            match self.discover(&solution_path) {
                Ok(discovered) => found.push(discovered),
                Err(e) => warn!("Skipping solution {}: {:#}", solution_path.display(), e),
            }
        }

        Ok(found)
    }
}

/// Every solution descriptor beneath `root`, sorted by path
pub fn find_solution_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry));

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if entry.file_type().is_file() && is_solution_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.iter().any(|skipped| name == *skipped)
}

fn is_solution_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SOLUTION_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Secret identifier declared for the project at `project_path`.
///
/// `<UserSecretsId>` wins; otherwise a legacy `userSecretsId="..."`
/// attribute in the project file or a configuration file beside it.
fn find_secrets_id(project_path: &Path) -> Result<Option<(String, SecretFormat)>> {
    let content = std::fs::read_to_string(project_path)
        .with_context(|| format!("Failed to read project file: {}", project_path.display()))?;

    if let Some(caps) = USER_SECRETS_ID_RE.captures(&content) {
        return Ok(Some((caps[1].to_string(), SecretFormat::Json)));
    }

    if let Some(id) = legacy_secrets_id(&content) {
        return Ok(Some((id, SecretFormat::Xml)));
    }

    let Some(project_dir) = project_path.parent() else {
        return Ok(None);
    };

    for config_name in LEGACY_CONFIG_FILES {
        let config_path = project_dir.join(config_name);
        if !config_path.is_file() {
            continue;
        }

        match std::fs::read_to_string(&config_path) {
            Ok(config) => {
                if let Some(id) = legacy_secrets_id(&config) {
                    return Ok(Some((id, SecretFormat::Xml)));
                }
            }
            Err(e) => warn!("Failed to read {}: {}", config_path.display(), e),
        }
    }

    Ok(None)
}

fn legacy_secrets_id(content: &str) -> Option<String> {
    LEGACY_SECRETS_ID_RE
        .captures(content)
        .map(|caps| caps[1].trim().to_string())
        .filter(|id| !id.is_empty())
}
