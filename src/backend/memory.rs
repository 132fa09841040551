//! # In-Memory Backend

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use super::errors::{BackendError, BackendResult};
use super::{entry_size, StorageBackend, DEFAULT_QUOTA_BYTES};

/// In-memory backend with a byte quota.
///
/// Behaves like a browser origin store: writes that would push usage past
/// the quota are rejected and leave the previous value in place.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, String>>,
    quota: Option<u64>,
    disabled: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::with_quota(DEFAULT_QUOTA_BYTES)
    }
}

impl MemoryBackend {
    /// Backend with the default 5 MiB quota
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with a specific quota in bytes
    pub fn with_quota(quota: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota: Some(quota),
            disabled: AtomicBool::new(false),
        }
    }

    /// Backend without a capacity ceiling
    pub fn unbounded() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota: None,
            disabled: AtomicBool::new(false),
        }
    }

    /// Switch the backend off (every call fails with `Disabled`) or back on
    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::SeqCst);
    }

    /// Overwrite a raw value, bypassing quota checks.
    ///
    /// Used to simulate out-of-band tampering.
    pub fn tamper(&self, key: &str, value: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
    }

    fn check_enabled(&self) -> BackendResult<()> {
        if self.disabled.load(Ordering::SeqCst) {
            return Err(BackendError::Disabled("memory backend disabled".into()));
        }
        Ok(())
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> BackendResult<Option<String>> {
        self.check_enabled()?;
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        self.check_enabled()?;
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        if let Some(quota) = self.quota {
            let used: u64 = entries.iter().map(|(k, v)| entry_size(k, v)).sum();
            let existing = entries.get(key).map(|v| entry_size(key, v)).unwrap_or(0);
            let required = entry_size(key, value);
            let available = quota.saturating_sub(used - existing);
            if required > available {
                return Err(BackendError::QuotaExceeded {
                    required,
                    available,
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> BackendResult<()> {
        self.check_enabled()?;
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> BackendResult<Vec<String>> {
        self.check_enabled()?;
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn capacity(&self) -> Option<u64> {
        self.quota
    }

    fn used_bytes(&self) -> BackendResult<u64> {
        self.check_enabled()?;
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.iter().map(|(k, v)| entry_size(k, v)).sum())
    }
}
