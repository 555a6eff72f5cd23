//! Command-line interface definition

use clap::{ArgAction, Args, Parser, Subcommand};
use core_runtime::logging::LogFormat;
use core_sync::Granularity;
use std::path::PathBuf;

/// Downloads cloud document revision histories into folders of plain-text
/// snapshots.
#[derive(Debug, Parser)]
#[command(name = "revsync", version, about)]
pub struct Cli {
    /// Path to the config file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log output format: pretty, json, or compact
    #[arg(long, global = true, value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download revision histories for documents
    Sync(SyncArgs),
    /// Export each document's current content instead of its history
    Export(ExportArgs),
    /// Run the browser authorization flow and cache the credentials
    Auth(AuthArgs),
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Document references, as editor URLs or bare identifiers
    /// (defaults to the config file's documents)
    #[arg(value_name = "REFERENCE")]
    pub references: Vec<String>,

    /// Keep one revision per bucket: all, hourly, daily, weekly, or monthly
    #[arg(long, short = 'g')]
    pub granularity: Option<Granularity>,

    /// Directory snapshots are written under
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Output folder name (single reference only)
    #[arg(long)]
    pub name: Option<String>,

    /// Concurrent downloads per document (1-8)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Seconds to wait for browser authorization
    #[arg(long, value_name = "SECS")]
    pub auth_timeout_secs: Option<u64>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Document references, as editor URLs or bare identifiers
    /// (defaults to the config file's documents)
    #[arg(value_name = "REFERENCE")]
    pub references: Vec<String>,

    /// Directory exports are written under
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Output folder name (single reference only)
    #[arg(long)]
    pub name: Option<String>,

    /// Seconds to wait for browser authorization
    #[arg(long, value_name = "SECS")]
    pub auth_timeout_secs: Option<u64>,
}

#[derive(Debug, Args)]
pub struct AuthArgs {
    /// Re-run the browser flow even when cached credentials exist
    #[arg(long)]
    pub force: bool,

    /// Seconds to wait for browser authorization
    #[arg(long, value_name = "SECS")]
    pub auth_timeout_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_command_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sync_flags() {
        let cli = Cli::try_parse_from([
            "revsync",
            "sync",
            "ABC123",
            "--granularity",
            "daily",
            "--output",
            "/tmp/out",
            "--concurrency",
            "2",
        ])
        .unwrap();

        match cli.command {
            Command::Sync(args) => {
                assert_eq!(args.references, vec!["ABC123".to_string()]);
                assert_eq!(args.granularity, Some(Granularity::Daily));
                assert_eq!(args.output.as_deref(), Some(Path::new("/tmp/out")));
                assert_eq!(args.concurrency, Some(2));
                assert!(args.name.is_none());
            }
            other => panic!("expected sync, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_multiple_references() {
        let cli = Cli::try_parse_from([
            "revsync",
            "sync",
            "https://docs.example.com/document/d/ABC123/edit",
            "XYZ789",
        ])
        .unwrap();

        match cli.command {
            Command::Sync(args) => assert_eq!(args.references.len(), 2),
            other => panic!("expected sync, got {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["revsync", "auth", "--force", "-vv", "--log-format", "json"])
            .unwrap();

        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.log_format, Some(LogFormat::Json)));
        assert!(matches!(cli.command, Command::Auth(AuthArgs { force: true, .. })));
    }

    #[test]
    fn test_unknown_granularity_rejected() {
        let result = Cli::try_parse_from(["revsync", "sync", "ABC123", "-g", "fortnightly"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_export_accepts_name() {
        let cli =
            Cli::try_parse_from(["revsync", "export", "ABC123", "--name", "My Doc"]).unwrap();
        match cli.command {
            Command::Export(args) => assert_eq!(args.name.as_deref(), Some("My Doc")),
            other => panic!("expected export, got {:?}", other),
        }
    }
}
