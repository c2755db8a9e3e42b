//! Remote bundle layout
//!
//! A bundle is the header record plus one record per container name. Each
//! container record is a JSON object mapping local file names to content.

use crate::container::SecretContainer;
use crate::header::{HeaderCheck, HeaderMetadata, HEADER_RECORD_NAME};
use crate::repository::RemoteRecord;
use crate::solution::Solution;
use std::collections::BTreeMap;
use tracing::debug;

/// `(container name, file name)` pair identifying one secrets file
pub type EntryKey = (String, String);

/// Secrets file contents keyed by [`EntryKey`]
pub type BundleEntries = BTreeMap<EntryKey, String>;

/// Result of interpreting the records pulled for one solution
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBundle {
    /// Nothing stored for the solution
    Absent,
    /// Written by an unsupported format version; handled like `Absent`
    Incompatible { version: String },
    /// Header record missing or unparseable
    HeaderError,
    /// A container record is not a JSON object of strings
    ContentError { record: String },
    Present {
        header: HeaderMetadata,
        entries: BundleEntries,
    },
}

impl ParsedBundle {
    /// Entries of a usable bundle; `None` when the bundle counts as not found
    pub fn entries(&self) -> Option<&BundleEntries> {
        match self {
            ParsedBundle::Present { entries, .. } => Some(entries),
            _ => None,
        }
    }
}

/// Interpret pulled records
pub fn parse_bundle(records: &[RemoteRecord]) -> ParsedBundle {
    if records.is_empty() {
        return ParsedBundle::Absent;
    }

    let header = records
        .iter()
        .find(|record| record.name == HEADER_RECORD_NAME)
        .and_then(|record| record.content.as_deref());

    let header = match HeaderMetadata::check(header) {
        HeaderCheck::Compatible(header) => header,
        HeaderCheck::Incompatible(version) => return ParsedBundle::Incompatible { version },
        HeaderCheck::Invalid => return ParsedBundle::HeaderError,
    };

    let mut entries = BundleEntries::new();
    for record in records.iter().filter(|r| r.name != HEADER_RECORD_NAME) {
        let Some(content) = record.content.as_deref() else {
            continue;
        };

        let files = match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(content)
        {
            Ok(files) => files,
            Err(e) => {
                debug!("Record {} is not a JSON object: {}", record.name, e);
                return ParsedBundle::ContentError {
                    record: record.name.clone(),
                };
            }
        };

        for (file_name, value) in files {
            match value {
                serde_json::Value::String(text) => {
                    entries.insert((record.name.clone(), file_name), text);
                }
                serde_json::Value::Null => {}
                _ => {
                    return ParsedBundle::ContentError {
                        record: record.name.clone(),
                    }
                }
            }
        }
    }

    ParsedBundle::Present { header, entries }
}

/// Entries of the containers that carry content
pub fn entries_from_containers(containers: &[SecretContainer]) -> BundleEntries {
    containers
        .iter()
        .filter_map(|container| {
            container
                .content
                .as_ref()
                .map(|content| (container.key(), content.clone()))
        })
        .collect()
}

/// Header plus one record per container name.
///
/// Returns `None` when the header cannot be serialized.
pub fn build_records(solution: &Solution, entries: &BundleEntries) -> Option<Vec<RemoteRecord>> {
    let header = HeaderMetadata::new(solution).to_json()?;

    let mut grouped: BTreeMap<&str, serde_json::Map<String, serde_json::Value>> = BTreeMap::new();
    for ((container_name, file_name), content) in entries {
        grouped
            .entry(container_name.as_str())
            .or_default()
            .insert(file_name.clone(), serde_json::Value::String(content.clone()));
    }

    let mut records = Vec::with_capacity(grouped.len() + 1);
    records.push(RemoteRecord::new(HEADER_RECORD_NAME, Some(header)));
    for (container_name, files) in grouped {
        let content = serde_json::Value::Object(files).to_string();
        records.push(RemoteRecord::new(container_name, Some(content)));
    }

    Some(records)
}
