//! Remote bundle header
//!
//! Every bundle carries one header record describing the format version,
//! the upload time and the solution it belongs to.

use crate::solution::Solution;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Record name of the header inside a bundle
pub const HEADER_RECORD_NAME: &str = "secrets";

/// Oldest supported major format version
pub const MIN_SUPPORTED_MAJOR: u64 = 1;

/// Newest supported major format version
pub const MAX_SUPPORTED_MAJOR: u64 = 2;

/// Bundle header metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMetadata {
    #[serde(rename = "visualStudioSolutionSecretsVersion")]
    pub version: String,
    pub last_upload: DateTime<Utc>,
    pub solution_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution_guid: Option<String>,
}

/// Outcome of reading a header record
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderCheck {
    /// Parsed and within the supported version range
    Compatible(HeaderMetadata),
    /// Parsed, but written by an unsupported format version
    Incompatible(String),
    /// Missing or unparseable
    Invalid,
}

impl HeaderMetadata {
    /// Header stamped with this build's version and the current time
    pub fn new(solution: &Solution) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            last_upload: Utc::now(),
            solution_file: solution.name.clone(),
            solution_guid: solution.uid.clone(),
        }
    }

    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    /// Whether the header's major version lies in the supported range
    pub fn is_compatible(&self) -> bool {
        major_version(&self.version)
            .map(|major| (MIN_SUPPORTED_MAJOR..=MAX_SUPPORTED_MAJOR).contains(&major))
            .unwrap_or(false)
    }

    /// Parse and validate a header record
    pub fn check(content: Option<&str>) -> HeaderCheck {
        let Some(content) = content else {
            return HeaderCheck::Invalid;
        };

        match serde_json::from_str::<HeaderMetadata>(content) {
            Ok(header) if header.is_compatible() => HeaderCheck::Compatible(header),
            Ok(header) => {
                warn!(
                    "Remote secrets were written by unsupported format version {}",
                    header.version
                );
                HeaderCheck::Incompatible(header.version)
            }
            Err(_) => HeaderCheck::Invalid,
        }
    }
}

fn major_version(version: &str) -> Option<u64> {
    if let Ok(parsed) = semver::Version::parse(version.trim()) {
        return Some(parsed.major);
    }
    // Tolerate two-part versions such as "1.0"
    version.trim().split('.').next()?.parse().ok()
}
