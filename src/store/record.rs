//! Persisted record and backup formats
//!
//! Record (one per key):
//!
//! ```json
//! {
//!   "data": <value>,
//!   "metadata": {
//!     "version": "1.0",
//!     "timestamp": 1767225600000,
//!     "checksum": "<sha256 base64>",
//!     "crc32": "crc32:deadbeef",
//!     "backupId": "backup_1767225600000_1a2b3c4d",
//!     "operation": "update"
//!   }
//! }
//! ```
//!
//! Backup (immutable, newest-first per key):
//!
//! ```json
//! { "id": "...", "timestamp": 0, "data": <value>, "metadata": {...},
//!   "operation": "update", "key": "tasks", "compressed": false }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::checksum;

/// Record format version written into metadata
pub const RECORD_FORMAT_VERSION: &str = "1.0";

/// Kind of write that produced a record or backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Restore,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Restore => "restore",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            "restore" => Ok(Operation::Restore),
            other => Err(format!("unknown operation '{}'", other)),
        }
    }
}

/// Version, timing and integrity metadata of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    pub version: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub checksum: String,
    pub crc32: String,
    /// Backup created by the write that produced this record ("" if none)
    #[serde(default)]
    pub backup_id: String,
    pub operation: Operation,
}

impl RecordMetadata {
    fn for_data(data: &Value, operation: Operation, timestamp: i64, backup_id: &str) -> Self {
        let digest = checksum::digest(data);
        Self {
            version: RECORD_FORMAT_VERSION.to_string(),
            timestamp,
            checksum: digest.checksum,
            crc32: digest.crc32,
            backup_id: backup_id.to_string(),
            operation,
        }
    }
}

/// The persisted wrapper for a key's current value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: Value,
    pub metadata: RecordMetadata,
}

impl Record {
    /// Wrap `data` with freshly computed metadata
    pub fn new(data: Value, operation: Operation, timestamp: i64, backup_id: &str) -> Self {
        let metadata = RecordMetadata::for_data(&data, operation, timestamp, backup_id);
        Self { data, metadata }
    }

    /// Parse a raw backend value
    pub fn parse(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|e| format!("unparsable record: {}", e))
    }

    /// Serialize for the backend
    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|e| format!("unserializable record: {}", e))
    }

    /// Check the stored digests against the data
    pub fn verify(&self) -> Result<(), String> {
        checksum::verify(&self.data, &self.metadata.checksum, &self.metadata.crc32)
    }
}

/// Immutable pre-write copy of a key's value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub id: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub data: Value,
    pub metadata: RecordMetadata,
    pub operation: Operation,
    pub key: String,
    /// Always false; compression is not implemented
    #[serde(default)]
    pub compressed: bool,
}

impl Backup {
    /// Snapshot of an existing record
    pub fn of_record(key: &str, record: &Record, operation: Operation, timestamp: i64) -> Self {
        Self {
            id: new_backup_id(timestamp),
            timestamp,
            data: record.data.clone(),
            metadata: record.metadata.clone(),
            operation,
            key: key.to_string(),
            compressed: false,
        }
    }

    /// Baseline snapshot taken on the first write of a key
    pub fn baseline(key: &str, data: &Value, operation: Operation, timestamp: i64) -> Self {
        let id = new_backup_id(timestamp);
        let metadata = RecordMetadata::for_data(data, operation, timestamp, &id);
        Self {
            id,
            timestamp,
            data: data.clone(),
            metadata,
            operation,
            key: key.to_string(),
            compressed: false,
        }
    }

    /// Whether the backup's own digests still match its data
    pub fn is_valid(&self) -> bool {
        checksum::verify(&self.data, &self.metadata.checksum, &self.metadata.crc32).is_ok()
    }

    /// Serialized size of the payload
    pub fn size_bytes(&self) -> u64 {
        checksum::canonical_json(&self.data).len() as u64
    }

    pub fn summary(&self) -> BackupSummary {
        BackupSummary {
            id: self.id.clone(),
            timestamp: self.timestamp,
            operation: self.operation,
            valid: self.is_valid(),
            size_bytes: self.size_bytes(),
        }
    }
}

/// Lightweight description of a backup, offered to callers choosing one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSummary {
    pub id: String,
    pub timestamp: i64,
    pub operation: Operation,
    pub valid: bool,
    pub size_bytes: u64,
}

fn new_backup_id(timestamp: i64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("backup_{}_{}", timestamp, &suffix[..8])
}
