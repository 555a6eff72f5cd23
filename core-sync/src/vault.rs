//! Revision output layout
//!
//! Downloaded snapshots land under `{output_dir}/{folder}/{timestamp}.txt`,
//! where the folder comes from the document's display name (sanitized for the
//! filesystem) or falls back to the raw identifier. Timestamps use a
//! colon-free ISO 8601 form so the names stay valid on Windows.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use bridge_traits::storage::FileSystemAccess;

use crate::error::Result;

/// Folder names longer than this are truncated after sanitization.
const MAX_FOLDER_LEN: usize = 120;

const FALLBACK_FOLDER: &str = "untitled";

/// Writes revision snapshots through the platform filesystem bridge.
///
/// The vault remembers every path it has written during the current run and
/// skips repeats, so two revisions sharing a modification second produce one
/// file and a warning instead of silently overwriting each other.
pub struct RevisionVault {
    file_system: Arc<dyn FileSystemAccess>,
    output_dir: PathBuf,
    written: Mutex<HashSet<PathBuf>>,
}

impl RevisionVault {
    pub fn new(file_system: Arc<dyn FileSystemAccess>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            file_system,
            output_dir: output_dir.into(),
            written: Mutex::new(HashSet::new()),
        }
    }

    pub fn output_dir(&self) -> &PathBuf {
        &self.output_dir
    }

    /// Persists one revision snapshot, returning the path written or `None`
    /// when the target name was already produced by this run.
    pub async fn persist(
        &self,
        folder: &str,
        modified_at: DateTime<Utc>,
        content: Bytes,
    ) -> Result<Option<PathBuf>> {
        let file_name = format!("{}.txt", modified_at.format("%Y-%m-%dT%H-%M-%SZ"));
        let path = self.output_dir.join(folder).join(file_name);

        {
            let mut written = self.written.lock().await;
            if !written.insert(path.clone()) {
                warn!("Skipping duplicate snapshot name: {}", path.display());
                return Ok(None);
            }
        }

        self.write(&path, content).await?;
        Ok(Some(path))
    }

    /// Persists the current document content as `current.txt`, overwriting any
    /// previous export.
    pub async fn persist_current(&self, folder: &str, content: Bytes) -> Result<PathBuf> {
        let path = self.output_dir.join(folder).join("current.txt");
        self.write(&path, content).await?;
        Ok(path)
    }

    async fn write(&self, path: &PathBuf, content: Bytes) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.file_system.create_dir_all(parent).await?;
        }
        self.file_system.write_file(path, content).await?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

/// Picks the output folder for a document: the sanitized display name when
/// one is set, otherwise the raw identifier.
pub fn folder_name(display_name: Option<&str>, document_id: &str) -> String {
    match display_name {
        Some(name) => sanitize_folder(name),
        None => document_id.to_string(),
    }
}

fn sanitize_folder(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => ' ',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let collapsed = mapped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return FALLBACK_FOLDER.to_string();
    }

    collapsed.chars().take(MAX_FOLDER_LEN).collect::<String>().trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::path::Path;

    struct MemoryFs {
        files: Mutex<HashMap<PathBuf, Bytes>>,
        dirs: Mutex<HashSet<PathBuf>>,
    }

    impl MemoryFs {
        fn new() -> Self {
            Self {
                files: Mutex::new(HashMap::new()),
                dirs: Mutex::new(HashSet::new()),
            }
        }

        async fn content(&self, path: &Path) -> Option<Bytes> {
            self.files.lock().await.get(path).cloned()
        }

        async fn file_count(&self) -> usize {
            self.files.lock().await.len()
        }
    }

    #[async_trait]
    impl FileSystemAccess for MemoryFs {
        async fn exists(&self, path: &Path) -> BridgeResult<bool> {
            let files = self.files.lock().await;
            let dirs = self.dirs.lock().await;
            Ok(files.contains_key(path) || dirs.contains(path))
        }

        async fn create_dir_all(&self, path: &Path) -> BridgeResult<()> {
            self.dirs.lock().await.insert(path.to_path_buf());
            Ok(())
        }

        async fn read_file(&self, path: &Path) -> BridgeResult<Bytes> {
            self.files
                .lock()
                .await
                .get(path)
                .cloned()
                .ok_or_else(|| BridgeError::NotFound(path.display().to_string()))
        }

        async fn write_file(&self, path: &Path, data: Bytes) -> BridgeResult<()> {
            self.files.lock().await.insert(path.to_path_buf(), data);
            Ok(())
        }

        async fn list_directory(&self, path: &Path) -> BridgeResult<Vec<PathBuf>> {
            let files = self.files.lock().await;
            Ok(files
                .keys()
                .filter(|p| p.parent() == Some(path))
                .cloned()
                .collect())
        }
    }

    fn vault_over(fs: Arc<MemoryFs>) -> RevisionVault {
        RevisionVault::new(fs, "out")
    }

    #[tokio::test]
    async fn test_persist_uses_colon_free_timestamp() {
        let fs = Arc::new(MemoryFs::new());
        let vault = vault_over(fs.clone());
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 14, 0, 0).unwrap();

        let path = vault
            .persist("My Doc", at, Bytes::from_static(b"hello"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(path, PathBuf::from("out/My Doc/2025-01-01T14-00-00Z.txt"));
        assert_eq!(fs.content(&path).await.unwrap(), Bytes::from_static(b"hello"));
        assert!(fs.dirs.lock().await.contains(&PathBuf::from("out/My Doc")));
    }

    #[tokio::test]
    async fn test_duplicate_timestamp_writes_once() {
        let fs = Arc::new(MemoryFs::new());
        let vault = vault_over(fs.clone());
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 14, 0, 0).unwrap();

        let first = vault
            .persist("doc", at, Bytes::from_static(b"first"))
            .await
            .unwrap();
        let second = vault
            .persist("doc", at, Bytes::from_static(b"second"))
            .await
            .unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(fs.file_count().await, 1);
        assert_eq!(
            fs.content(first.as_deref().unwrap()).await.unwrap(),
            Bytes::from_static(b"first")
        );
    }

    #[tokio::test]
    async fn test_same_timestamp_in_different_folders_is_not_a_collision() {
        let fs = Arc::new(MemoryFs::new());
        let vault = vault_over(fs.clone());
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 14, 0, 0).unwrap();

        let a = vault.persist("a", at, Bytes::from_static(b"a")).await.unwrap();
        let b = vault.persist("b", at, Bytes::from_static(b"b")).await.unwrap();

        assert!(a.is_some());
        assert!(b.is_some());
        assert_eq!(fs.file_count().await, 2);
    }

    #[tokio::test]
    async fn test_persist_current_overwrites() {
        let fs = Arc::new(MemoryFs::new());
        let vault = vault_over(fs.clone());

        let path = vault
            .persist_current("doc", Bytes::from_static(b"v1"))
            .await
            .unwrap();
        vault
            .persist_current("doc", Bytes::from_static(b"v2"))
            .await
            .unwrap();

        assert_eq!(path, PathBuf::from("out/doc/current.txt"));
        assert_eq!(fs.content(&path).await.unwrap(), Bytes::from_static(b"v2"));
    }

    #[test]
    fn test_folder_name_prefers_display_name() {
        assert_eq!(folder_name(Some("Meeting Notes"), "ABC123"), "Meeting Notes");
        assert_eq!(folder_name(None, "ABC123"), "ABC123");
    }

    #[test]
    fn test_sanitize_replaces_unsafe_characters() {
        assert_eq!(
            folder_name(Some("Q3: plans / review?"), "id"),
            "Q3_ plans _ review_"
        );
        assert_eq!(folder_name(Some("a\tb\nc"), "id"), "a b c");
        assert_eq!(folder_name(Some("nul\u{0}byte"), "id"), "nul_byte");
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(folder_name(Some("  spaced   out  "), "id"), "spaced out");
    }

    #[test]
    fn test_sanitize_falls_back_when_empty() {
        assert_eq!(folder_name(Some("   "), "id"), "untitled");
        assert_eq!(folder_name(Some(""), "id"), "untitled");
    }

    #[test]
    fn test_sanitize_truncates_long_names() {
        let long = "x".repeat(500);
        let folder = folder_name(Some(&long), "id");
        assert_eq!(folder.chars().count(), MAX_FOLDER_LEN);
    }
}
