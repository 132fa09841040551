//! CLI argument definitions using clap
//!
//! Every command operates on a file-backed store under `--data-dir`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::recovery::RecoveryStrategy;
use crate::store::Operation;

/// kvguard - checksummed, self-healing key-value store
#[derive(Parser, Debug)]
#[command(name = "kvguard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding one file per key
    #[arg(long, default_value = "./kvguard-data")]
    pub data_dir: PathBuf,

    /// Path to configuration file (defaults apply if missing)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Append security events to this JSON-lines file
    #[arg(long)]
    pub audit_log: Option<PathBuf>,

    /// Log lifecycle events; otherwise only errors are logged (to stderr)
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a JSON value
    Put {
        key: String,
        /// JSON text, e.g. '{"a":1}' or '"text"'
        value: String,
        #[arg(long, default_value = "update", value_parser = parse_operation)]
        operation: Operation,
    },

    /// Read a value, healing it from backups if corrupted
    Get { key: String },

    /// Remove a key (its backup history is kept)
    Rm { key: String },

    /// List backups of a key, newest first
    History { key: String },

    /// Restore a key from a named backup
    Restore { key: String, backup_id: String },

    /// Integrity-check keys (all keys if none given)
    Check { keys: Vec<String> },

    /// Recover keys (all keys if none given)
    Recover {
        keys: Vec<String>,
        #[arg(long, default_value = "auto", value_parser = parse_strategy)]
        strategy: RecoveryStrategy,
    },

    /// Prune backups by count and age
    Cleanup,

    /// Show usage counters and capacity
    Usage,

    /// Show aggregated health
    Health,

    /// Export data and backups as JSON
    Export {
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Import a package produced by `export`
    Import {
        file: PathBuf,
        /// Replace keys that already exist
        #[arg(long)]
        overwrite: bool,
        /// Snapshot before each imported write
        #[arg(long)]
        create_backups: bool,
    },

    /// Show usage patterns and a growth prediction
    Predict {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
}

fn parse_operation(s: &str) -> Result<Operation, String> {
    s.parse()
}

fn parse_strategy(s: &str) -> Result<RecoveryStrategy, String> {
    s.parse()
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_put() {
        let cli = Cli::try_parse_from([
            "kvguard", "--data-dir", "/tmp/x", "put", "tasks", "[1,2]", "--operation", "create",
        ])
        .unwrap();
        match cli.command {
            Command::Put { key, value, operation } => {
                assert_eq!(key, "tasks");
                assert_eq!(value, "[1,2]");
                assert_eq!(operation, Operation::Create);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_recover_defaults() {
        let cli = Cli::try_parse_from(["kvguard", "recover", "a", "b"]).unwrap();
        match cli.command {
            Command::Recover { keys, strategy } => {
                assert_eq!(keys, vec!["a", "b"]);
                assert_eq!(strategy, RecoveryStrategy::Auto);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(!cli.verbose);
        assert!(Cli::try_parse_from(["kvguard", "recover", "--strategy", "yolo"]).is_err());
    }
}
