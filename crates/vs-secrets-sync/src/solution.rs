//! Solution descriptor parsing
//!
//! Supports the classic line-based `.sln` format and the XML `.slnx` format.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static PROJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*Project\("\{[^}]*\}"\)\s*=\s*"([^"]*)"\s*,\s*"([^"]*)"\s*,"#)
        .expect("project regex is valid")
});

static SOLUTION_GUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*SolutionGuid\s*=\s*\{?([0-9A-Fa-f-]{36})\}?")
        .expect("solution guid regex is valid")
});

static SLNX_PROJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<Project\b[^>]*\bPath\s*=\s*"([^"]+)""#).expect("slnx project regex is valid")
});

/// Descriptor extensions recognized as solutions
pub const SOLUTION_EXTENSIONS: &[&str] = &["sln", "slnx"];

/// Project file extensions that may declare user secrets
pub const PROJECT_EXTENSIONS: &[&str] = &["csproj", "vbproj", "fsproj"];

/// A project referenced by a solution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectReference {
    pub name: String,
    /// Absolute (or solution-relative joined) path of the project file
    pub path: PathBuf,
}

/// A solution descriptor and the projects it references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    /// Display name (descriptor file stem)
    pub name: String,
    /// Stable unique identifier, lowercase hyphenated
    pub uid: Option<String>,
    /// Descriptor path
    pub path: PathBuf,
    /// Referenced projects with a project-file extension
    pub projects: Vec<ProjectReference>,
}

impl Solution {
    /// Load and parse a solution descriptor
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read solution file: {}", path.display()))?;
        Ok(Self::parse(path, &content))
    }

    /// Parse descriptor `content` located at `path`
    pub fn parse(path: &Path, content: &str) -> Self {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let is_xml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("slnx"))
            .unwrap_or(false);

        let (uid, references) = if is_xml {
            (None, parse_slnx(content))
        } else {
            parse_sln(content)
        };

        let projects = references
            .into_iter()
            .filter(|(_, relative)| has_project_extension(relative))
            .map(|(name, relative)| ProjectReference {
                name,
                path: base_dir.join(normalize_separators(&relative)),
            })
            .collect::<Vec<_>>();

        debug!(
            "Parsed solution {} ({} project(s), uid: {:?})",
            name,
            projects.len(),
            uid
        );

        Self {
            name,
            uid,
            path: path.to_path_buf(),
            projects,
        }
    }

    /// A solution known only from a remote bundle, with no descriptor on disk
    pub fn remote(name: impl Into<String>, uid: Option<String>) -> Self {
        Self {
            name: name.into(),
            uid,
            path: PathBuf::new(),
            projects: Vec::new(),
        }
    }

    /// Remote bundle description: `"{name} ({uid})"`, or the bare name when
    /// the solution has no unique identifier
    pub fn description(&self) -> String {
        match &self.uid {
            Some(uid) => format!("{} ({})", self.name, uid),
            None => self.name.clone(),
        }
    }

    /// Key used by per-secret backends: the unique identifier when known,
    /// otherwise the display name
    pub fn storage_key(&self) -> &str {
        self.uid.as_deref().unwrap_or(&self.name)
    }
}

fn parse_sln(content: &str) -> (Option<String>, Vec<(String, String)>) {
    let mut uid = None;
    let mut references = Vec::new();

    for line in content.lines() {
        if let Some(caps) = PROJECT_RE.captures(line) {
            references.push((caps[1].to_string(), caps[2].to_string()));
        } else if let Some(caps) = SOLUTION_GUID_RE.captures(line) {
            uid = uuid::Uuid::parse_str(&caps[1])
                .ok()
                .map(|guid| guid.hyphenated().to_string());
        }
    }

    (uid, references)
}

fn parse_slnx(content: &str) -> Vec<(String, String)> {
    SLNX_PROJECT_RE
        .captures_iter(content)
        .map(|caps| {
            let relative = caps[1].to_string();
            let name = Path::new(&normalize_separators(&relative))
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            (name, relative)
        })
        .collect()
}

fn has_project_extension(relative: &str) -> bool {
    Path::new(&normalize_separators(relative))
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            PROJECT_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

fn normalize_separators(relative: &str) -> String {
    if cfg!(windows) {
        relative.replace('/', "\\")
    } else {
        relative.replace('\\', "/")
    }
}
