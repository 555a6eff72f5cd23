//! Document references and identifier resolution

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::filter::Granularity;

/// A document selected for synchronization.
///
/// The reference is either a bare document identifier or a full editor URL
/// containing a `/d/{id}` segment. An optional display name overrides the
/// output folder, and an optional granularity overrides the run-wide default
/// for this document only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRef {
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity: Option<Granularity>,
}

impl DocumentRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            display_name: None,
            granularity: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = Some(granularity);
        self
    }
}

/// Extracts the document identifier from a reference.
///
/// Editor URLs carry the identifier in a `/d/{id}` path segment; everything
/// after it (further path segments, query, fragment) is dropped. References
/// without that segment are treated as bare identifiers and must consist of
/// identifier characters only.
pub fn resolve_reference(reference: &str) -> Result<String> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return Err(SyncError::InvalidReference {
            reference: reference.to_string(),
        });
    }

    if let Some(idx) = trimmed.find("/d/") {
        let after = &trimmed[idx + 3..];
        let id = after
            .split(|c| c == '/' || c == '?' || c == '#')
            .next()
            .unwrap_or_default();
        if id.is_empty() {
            return Err(SyncError::InvalidReference {
                reference: reference.to_string(),
            });
        }
        return Ok(id.to_string());
    }

    let is_bare_id = trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if is_bare_id {
        Ok(trimmed.to_string())
    } else {
        Err(SyncError::InvalidReference {
            reference: reference.to_string(),
        })
    }
}
