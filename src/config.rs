//! CLI configuration file
//!
//! Loaded from `--config`, falling back to the platform config directory
//! (`~/.config/revsync/config.toml` on Linux). Every section is optional;
//! command-line flags override whatever the file sets.
//!
//! ```toml
//! [auth]
//! client_secrets = "/home/user/.config/revsync/client_secrets.json"
//!
//! [sync]
//! output_dir = "/home/user/revisions"
//! granularity = "daily"
//!
//! [[documents]]
//! ref = "https://docs.example.com/document/d/ABC123/edit"
//! name = "Design Notes"
//! granularity = "hourly"
//! ```

use anyhow::{Context, Result};
use core_sync::Granularity;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment fallback for the client secrets path.
pub const SECRETS_ENV_VAR: &str = "REVSYNC_CLIENT_SECRETS";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub documents: Vec<DocumentEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Path to the OAuth client secrets JSON downloaded from the provider
    pub client_secrets: Option<PathBuf>,
    /// Where tokens are cached between runs
    pub token_cache: Option<PathBuf>,
    /// Seconds to wait for the browser authorization flow
    pub flow_timeout_secs: u64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            client_secrets: None,
            token_cache: None,
            flow_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub output_dir: PathBuf,
    pub granularity: Granularity,
    pub max_concurrent_downloads: usize,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("revisions"),
            granularity: Granularity::All,
            max_concurrent_downloads: core_sync::DEFAULT_CONCURRENT_DOWNLOADS,
        }
    }
}

/// One document to sync, as configured in the file.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentEntry {
    /// Editor URL or bare document identifier
    #[serde(rename = "ref")]
    pub reference: String,
    /// Output folder name override
    #[serde(default)]
    pub name: Option<String>,
    /// Granularity override for this document
    #[serde(default)]
    pub granularity: Option<Granularity>,
}

impl AppConfig {
    /// Loads the config from an explicit path, the default location, or
    /// built-in defaults when no file exists.
    ///
    /// An explicit `--config` path must exist; the default location is
    /// allowed to be absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Malformed config file {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// `{config_dir}/revsync/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("revsync").join("config.toml"))
    }

    /// Client secrets path from the config or the environment.
    pub fn client_secrets_path(&self) -> Option<PathBuf> {
        self.auth
            .client_secrets
            .clone()
            .or_else(|| std::env::var_os(SECRETS_ENV_VAR).map(PathBuf::from))
    }

    /// Token cache path from the config or the platform default.
    pub fn token_cache_path(&self) -> PathBuf {
        self.auth.token_cache.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("revsync")
                .join("tokens.json")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parses() {
        let config: AppConfig = toml::from_str(
            r#"
            [auth]
            client_secrets = "/secrets/client.json"
            token_cache = "/secrets/tokens.json"
            flow_timeout_secs = 30

            [sync]
            output_dir = "/data/revisions"
            granularity = "daily"
            max_concurrent_downloads = 2

            [[documents]]
            ref = "https://docs.example.com/document/d/ABC123/edit"
            name = "Design Notes"
            granularity = "hourly"

            [[documents]]
            ref = "XYZ789"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.auth.client_secrets.as_deref(),
            Some(Path::new("/secrets/client.json"))
        );
        assert_eq!(config.auth.flow_timeout_secs, 30);
        assert_eq!(config.sync.granularity, Granularity::Daily);
        assert_eq!(config.sync.max_concurrent_downloads, 2);

        assert_eq!(config.documents.len(), 2);
        assert_eq!(
            config.documents[0].reference,
            "https://docs.example.com/document/d/ABC123/edit"
        );
        assert_eq!(config.documents[0].name.as_deref(), Some("Design Notes"));
        assert_eq!(config.documents[0].granularity, Some(Granularity::Hourly));
        assert_eq!(config.documents[1].reference, "XYZ789");
        assert!(config.documents[1].granularity.is_none());
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [sync]
            granularity = "weekly"
            "#,
        )
        .unwrap();

        assert_eq!(config.sync.granularity, Granularity::Weekly);
        assert_eq!(config.sync.output_dir, PathBuf::from("revisions"));
        assert_eq!(
            config.sync.max_concurrent_downloads,
            core_sync::DEFAULT_CONCURRENT_DOWNLOADS
        );
        assert_eq!(config.auth.flow_timeout_secs, 120);
        assert!(config.documents.is_empty());
    }

    #[test]
    fn test_empty_config_is_valid() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.auth.client_secrets.is_none());
        assert!(config.documents.is_empty());
    }

    #[test]
    fn test_unknown_granularity_rejected() {
        let result: std::result::Result<AppConfig, _> = toml::from_str(
            r#"
            [sync]
            granularity = "fortnightly"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_token_cache_wins() {
        let config: AppConfig = toml::from_str(
            r#"
            [auth]
            token_cache = "/custom/tokens.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.token_cache_path(), PathBuf::from("/custom/tokens.json"));
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync]\ngranularity = \"monthly\"\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.sync.granularity, Granularity::Monthly);
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(AppConfig::load(Some(&missing)).is_err());
    }
}
