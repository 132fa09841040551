//! CLI command implementations
//!
//! Each invocation opens the store, runs one command and prints one
//! `{success, data}` envelope. Failures are returned as [`CliError`] and
//! reported on stderr by the caller.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::analytics::AnalyticsEngine;
use crate::backend::FileBackend;
use crate::config::Config;
use crate::errors::OperationResult;
use crate::health::HealthMonitor;
use crate::observability::{AuditSink, FileAuditSink, LogAuditSink};
use crate::recovery::{RecoveryCoordinator, RecoveryOptions};
use crate::store::{ExportPackage, ImportOptions, IntegrityStore};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{parse_value, read_json_file, write_json, write_json_file};

/// Components opened for one invocation
pub struct Context {
    pub store: Arc<IntegrityStore>,
    pub recovery: Arc<RecoveryCoordinator>,
    pub analytics: Arc<AnalyticsEngine>,
}

impl Context {
    /// Open the file-backed store described by the global flags
    pub fn open(data_dir: &Path, config: Option<&Path>, audit_log: Option<&Path>) -> CliResult<Self> {
        let config = match config {
            Some(path) => Config::load(path).map_err(|e| CliError::Config(e.to_string()))?,
            None => Config::default(),
        };

        let backend = FileBackend::open(data_dir, config.storage.quota_bytes)
            .map_err(|e| CliError::Io(format!("cannot open {}: {}", data_dir.display(), e)))?;

        let audit: Arc<dyn AuditSink> = match audit_log {
            Some(path) => Arc::new(FileAuditSink::open(path)?),
            None => Arc::new(LogAuditSink),
        };

        let store = Arc::new(IntegrityStore::new(Arc::new(backend), config)?.with_audit(audit));
        Ok(Self {
            recovery: Arc::new(RecoveryCoordinator::new(Arc::clone(&store))),
            analytics: Arc::new(AnalyticsEngine::new(Arc::clone(&store))),
            store,
        })
    }

    fn all_keys_if_empty(&self, keys: Vec<String>) -> CliResult<Vec<String>> {
        if keys.is_empty() {
            Ok(self.store.keys()?)
        } else {
            Ok(keys)
        }
    }
}

/// Parse-free entry point: run an already parsed command line
pub fn run_command(cli: Cli) -> CliResult<()> {
    let ctx = Context::open(
        &cli.data_dir,
        cli.config.as_deref(),
        cli.audit_log.as_deref(),
    )?;
    execute(&ctx, cli.command)
}

/// Run one command against an open context
pub fn execute(ctx: &Context, command: Command) -> CliResult<()> {
    match command {
        Command::Put {
            key,
            value,
            operation,
        } => {
            let data = parse_value(&value)?;
            emit(ctx.store.write(&key, data, operation)?)
        }
        Command::Get { key } => emit(ctx.store.read(&key)?),
        Command::Rm { key } => {
            let removed = ctx.store.remove(&key)?;
            emit(json!({ "key": key, "removed": removed }))
        }
        Command::History { key } => emit(ctx.store.get_backup_history(&key)?),
        Command::Restore { key, backup_id } => emit(ctx.store.restore(&key, &backup_id)?),
        Command::Check { keys } => {
            let keys = ctx.all_keys_if_empty(keys)?;
            emit(ctx.recovery.recommendations(&keys))
        }
        Command::Recover { keys, strategy } => {
            let options = RecoveryOptions::with_strategy(strategy);
            if let [key] = keys.as_slice() {
                return emit(ctx.recovery.recover(key, options)?);
            }
            let keys = ctx.all_keys_if_empty(keys)?;
            emit(ctx.recovery.batch_recover(&keys, options)?)
        }
        Command::Cleanup => emit(ctx.store.cleanup()?),
        Command::Usage => emit(ctx.store.usage()?),
        Command::Health => {
            let monitor = HealthMonitor::new(
                Arc::clone(&ctx.store),
                Arc::clone(&ctx.recovery),
                Arc::clone(&ctx.analytics),
            );
            emit(monitor.check()?)
        }
        Command::Export { output } => {
            let package = ctx.store.export(ctx.analytics.history())?;
            match output {
                Some(path) => {
                    write_json_file(&path, &package)?;
                    emit(json!({
                        "path": path.display().to_string(),
                        "keys": package.data.len(),
                        "backups": package.backups.len(),
                    }))
                }
                None => emit(package),
            }
        }
        Command::Import {
            file,
            overwrite,
            create_backups,
        } => {
            let package: ExportPackage = read_json_file(&file)?;
            ctx.analytics.import_history(package.analytics.clone());
            let options = ImportOptions {
                overwrite,
                create_backups,
            };
            emit(ctx.store.import(&package, options)?)
        }
        Command::Predict { days } => {
            ctx.analytics.sample()?;
            emit(json!({
                "summary": ctx.analytics.summary()?,
                "prediction": ctx.analytics.growth_prediction(days)?,
            }))
        }
    }
}

fn emit<T: Serialize>(data: T) -> CliResult<()> {
    write_json(&OperationResult::ok(data))
}
