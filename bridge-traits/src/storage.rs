//! Storage and Revision Source Abstractions
//!
//! Defines the seam between the sync engine and the hosting API (revision
//! listing, content export) plus the file-system trait used by the output
//! vault and credential cache handling.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Metadata for one historical revision of a remote document.
///
/// Timestamps are UTC with second precision. The hosting API does not
/// document an ordering guarantee, so sources sort ascending by
/// `modified_at` before returning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionMeta {
    /// Opaque revision identifier assigned by the API
    pub revision_id: String,

    /// Modification timestamp (UTC)
    pub modified_at: DateTime<Utc>,

    /// Display name of the last modifying user, when the API reports one
    pub author: Option<String>,
}

/// Display metadata for a remote document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Document identifier
    pub id: String,

    /// Document title
    pub name: String,

    /// MIME type reported by the API
    pub mime_type: String,
}

/// Source of historical revisions for remote documents.
///
/// Implemented against the legacy listing endpoint, which is the only API
/// version that enumerates revisions. Kept separate from [`ContentExporter`]
/// so that a future API migration touches one implementation at a time.
#[async_trait]
pub trait RevisionSource: Send + Sync {
    /// List every revision of a document, sorted ascending by `modified_at`.
    ///
    /// # Errors
    ///
    /// - `BridgeError::NotFound` when the document does not exist
    /// - `BridgeError::PermissionDenied` when the caller may not read it
    /// - `BridgeError::Http` when the API keeps failing past the retry budget
    /// - `BridgeError::Unauthorized` when credentials expired and could not
    ///   be refreshed
    async fn list_revisions(&self, document_id: &str) -> Result<Vec<RevisionMeta>>;

    /// Fetch one revision's content as plain text.
    ///
    /// Returns `Ok(None)` when the revision offers no plain-text export
    /// (unsupported content type); callers record such revisions as skipped
    /// rather than failed.
    async fn fetch_revision_text(
        &self,
        document_id: &str,
        revision_id: &str,
    ) -> Result<Option<Bytes>>;
}

/// Exporter for a document's current content, served by the current API
/// version.
#[async_trait]
pub trait ContentExporter: Send + Sync {
    /// Export the document's present content as plain text.
    async fn export_current_text(&self, document_id: &str) -> Result<Bytes>;

    /// Fetch display metadata (title, MIME type) for a document.
    async fn document_info(&self, document_id: &str) -> Result<DocumentInfo>;
}

/// File system access trait
///
/// Abstracts the handful of file operations the engine needs (vault writes,
/// credential cache reads) so tests can run against temp directories and the
/// core never touches `std::fs` directly.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn persist(fs: &dyn FileSystemAccess, dir: &Path, data: Bytes) -> Result<()> {
///     fs.create_dir_all(dir).await?;
///     fs.write_file(&dir.join("snapshot.txt"), data).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating it if it doesn't exist
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_revision_meta_roundtrip() {
        let meta = RevisionMeta {
            revision_id: "rev-41".to_string(),
            modified_at: Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap(),
            author: Some("alice".to_string()),
        };

        let json = serde_json::to_string(&meta).unwrap();
        let back: RevisionMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}
