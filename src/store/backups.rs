//! Backup history persistence
//!
//! The history of a key lives under `__kvguard_backups__:<key>` as a JSON
//! array, newest first. The prefix is reserved: logical keys may not use it.

use std::sync::Arc;

use crate::backend::StorageBackend;
use crate::errors::{StoreError, StoreResult};
use crate::observability::Logger;

use super::record::Backup;

/// Reserved prefix of backup-history keys
pub const BACKUP_PREFIX: &str = "__kvguard_backups__:";

/// Backend key holding the history of `key`
pub fn history_key(key: &str) -> String {
    format!("{}{}", BACKUP_PREFIX, key)
}

/// Logical key for a history key, `None` for ordinary keys
pub fn logical_key(backend_key: &str) -> Option<&str> {
    backend_key.strip_prefix(BACKUP_PREFIX)
}

/// Reads and writes backup histories on a backend
#[derive(Debug, Clone)]
pub struct BackupLog {
    backend: Arc<dyn StorageBackend>,
}

impl BackupLog {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// History of `key`, newest first.
    ///
    /// An unreadable history is reported and treated as empty: the history
    /// itself carries no checksum, and a broken one must not block writes.
    pub fn load(&self, key: &str) -> StoreResult<Vec<Backup>> {
        let raw = self
            .backend
            .get(&history_key(key))
            .map_err(|e| StoreError::from_backend(key, e))?;

        let Some(raw) = raw else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<Backup>>(&raw) {
            Ok(mut backups) => {
                sort_newest_first(&mut backups);
                Ok(backups)
            }
            Err(e) => {
                let reason = e.to_string();
                Logger::warn(
                    "BACKUP_HISTORY_UNREADABLE",
                    &[("key", key), ("reason", &reason)],
                );
                Ok(Vec::new())
            }
        }
    }

    /// Replace the history of `key`; an empty history removes the entry
    pub fn save(&self, key: &str, backups: &[Backup]) -> StoreResult<()> {
        let backend_key = history_key(key);
        if backups.is_empty() {
            return self
                .backend
                .remove(&backend_key)
                .map_err(|e| StoreError::from_backend(key, e));
        }

        let json = serde_json::to_string(backups).map_err(|e| {
            StoreError::validation(key, format!("unserializable backup history: {}", e))
        })?;
        self.backend
            .set(&backend_key, &json)
            .map_err(|e| StoreError::from_backend(key, e))
    }

    /// Prepend `backup`, keeping at most `max_backups`
    pub fn push(&self, key: &str, backup: Backup, max_backups: usize) -> StoreResult<()> {
        let mut backups = self.load(key)?;
        backups.insert(0, backup);
        sort_newest_first(&mut backups);
        backups.truncate(max_backups.max(1));
        self.save(key, &backups)
    }

    /// Remove one backup by id; the rest of the history is untouched
    pub fn discard(&self, key: &str, backup_id: &str) -> StoreResult<()> {
        let mut backups = self.load(key)?;
        backups.retain(|b| b.id != backup_id);
        self.save(key, &backups)
    }

    /// Logical keys that currently have a history
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        let keys = self
            .backend
            .keys()
            .map_err(|e| StoreError::from_backend("*", e))?;
        Ok(keys
            .iter()
            .filter_map(|k| logical_key(k).map(str::to_string))
            .collect())
    }
}

/// Order by timestamp descending; ties broken by id for determinism
pub fn sort_newest_first(backups: &mut [Backup]) {
    backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
}

/// Drop entries beyond `max_backups` and entries older than `cutoff_ms`.
///
/// Returns how many were removed.
pub fn prune(backups: &mut Vec<Backup>, max_backups: usize, cutoff_ms: i64) -> usize {
    let before = backups.len();
    sort_newest_first(backups);
    backups.retain(|b| b.timestamp >= cutoff_ms);
    backups.truncate(max_backups);
    before - backups.len()
}
