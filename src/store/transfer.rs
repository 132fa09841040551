//! Export / import of store contents
//!
//! Package format:
//!
//! ```json
//! { "data": { "<key>": <value> }, "backups": [ <Backup> ],
//!   "analytics": [ <TrendSnapshot> ], "exportedAt": 0, "version": "1.0" }
//! ```
//!
//! Only records that verify are exported. Import merges backups by id and
//! never replaces a backup that is already present.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analytics::TrendSnapshot;
use crate::errors::{StoreError, StoreResult};
use crate::observability::{log_event, Event, Logger, SecurityEventType};

use super::backups::sort_newest_first;
use super::record::{Backup, Operation};
use super::{IntegrityStore, RecordState};

/// Package format version
pub const EXPORT_FORMAT_VERSION: &str = "1.0";

/// Portable snapshot of a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPackage {
    pub data: BTreeMap<String, Value>,
    #[serde(default)]
    pub backups: Vec<Backup>,
    #[serde(default)]
    pub analytics: Vec<TrendSnapshot>,
    pub exported_at: i64,
    pub version: String,
}

/// Import behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    /// Replace keys that already have a record
    pub overwrite: bool,
    /// Snapshot before each imported write
    pub create_backups: bool,
}

/// What an import did, per key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported: Vec<String>,
    pub skipped: Vec<String>,
    /// key -> error message
    pub failed: BTreeMap<String, String>,
    pub backups_merged: usize,
}

impl IntegrityStore {
    /// Export every verifying record and every backup.
    ///
    /// Corrupt records are left out and reported in the log.
    pub fn export(&self, analytics: Vec<TrendSnapshot>) -> StoreResult<ExportPackage> {
        let mut data = BTreeMap::new();
        for key in self.keys()? {
            match self.load_record(&key)? {
                RecordState::Valid(record) => {
                    data.insert(key, record.data);
                }
                RecordState::Corrupt { reason, .. } => {
                    Logger::warn("EXPORT_SKIPPED_CORRUPT", &[("key", &key), ("reason", &reason)]);
                }
                RecordState::Missing => {}
            }
        }

        let mut backups = Vec::new();
        for key in self.backups.keys()? {
            backups.extend(self.backups.load(&key)?);
        }

        let package = ExportPackage {
            data,
            backups,
            analytics,
            exported_at: Utc::now().timestamp_millis(),
            version: EXPORT_FORMAT_VERSION.to_string(),
        };

        let keys = package.data.len().to_string();
        let backups = package.backups.len().to_string();
        log_event(Event::ExportComplete, &[("keys", &keys), ("backups", &backups)]);
        self.audit.record(
            SecurityEventType::DataExport,
            &format!(
                "Exported {} keys and {} backups",
                package.data.len(),
                package.backups.len()
            ),
        );
        Ok(package)
    }

    /// Apply an export package.
    ///
    /// Per-key failures are collected in the report; the import itself only
    /// fails for an unsupported package version or a backend error while
    /// merging backups.
    pub fn import(&self, package: &ExportPackage, options: ImportOptions) -> StoreResult<ImportReport> {
        if package.version != EXPORT_FORMAT_VERSION {
            return Err(StoreError::validation(
                "import",
                format!(
                    "unsupported package version '{}', expected '{}'",
                    package.version, EXPORT_FORMAT_VERSION
                ),
            ));
        }

        let mut report = ImportReport::default();
        let _guard = self.lock_writes();

        for (key, value) in &package.data {
            if let Err(e) = Self::check_key(key) {
                report.failed.insert(key.clone(), e.to_string());
                continue;
            }

            let exists = match self.load_record(key) {
                Ok(RecordState::Missing) => false,
                Ok(_) => true,
                Err(e) => {
                    report.failed.insert(key.clone(), e.to_string());
                    continue;
                }
            };

            if exists && !options.overwrite {
                report.skipped.push(key.clone());
                continue;
            }

            let operation = if exists {
                Operation::Update
            } else {
                Operation::Create
            };
            match self.write_locked(key, value.clone(), operation, options.create_backups) {
                Ok(_) => report.imported.push(key.clone()),
                Err(e) => {
                    report.failed.insert(key.clone(), e.to_string());
                }
            }
        }

        report.backups_merged = self.merge_backups(&package.backups)?;

        log_event(
            Event::ImportComplete,
            &[
                ("imported", &report.imported.len().to_string()),
                ("skipped", &report.skipped.len().to_string()),
                ("failed", &report.failed.len().to_string()),
                ("backups_merged", &report.backups_merged.to_string()),
            ],
        );
        self.audit.record(
            SecurityEventType::DataImport,
            &format!(
                "Imported {} keys ({} skipped, {} failed), merged {} backups",
                report.imported.len(),
                report.skipped.len(),
                report.failed.len(),
                report.backups_merged
            ),
        );
        Ok(report)
    }

    /// Add backups whose ids are not yet known; returns how many were added
    fn merge_backups(&self, incoming: &[Backup]) -> StoreResult<usize> {
        let mut by_key: BTreeMap<&str, Vec<&Backup>> = BTreeMap::new();
        for backup in incoming {
            if Self::check_key(&backup.key).is_ok() {
                by_key.entry(backup.key.as_str()).or_default().push(backup);
            }
        }

        let max_backups = self.config().backup.max_backups;
        let mut merged = 0;
        for (key, candidates) in by_key {
            let mut history = self.backups.load(key)?;
            let known: HashSet<String> = history.iter().map(|b| b.id.clone()).collect();

            let before = history.len();
            history.extend(
                candidates
                    .into_iter()
                    .filter(|b| !known.contains(&b.id))
                    .cloned(),
            );
            if history.len() == before {
                continue;
            }
            merged += history.len() - before;

            sort_newest_first(&mut history);
            history.truncate(max_backups);
            self.backups.save(key, &history)?;
        }
        Ok(merged)
    }
}
