//! # Local Filesystem Backend
//!
//! Each key is stored in its own file under the root directory. File names
//! are the hex encoding of the key so arbitrary keys map to safe names.
//! Writes go to a temporary file that is renamed into place, so a rejected
//! or interrupted write never leaves a half-written value.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::errors::{BackendError, BackendResult};
use super::{entry_size, StorageBackend};

const VALUE_SUFFIX: &str = ".kv";

/// Directory-backed key-value store
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
    quota: Option<u64>,
}

impl FileBackend {
    /// Open (creating if needed) a backend rooted at `root`
    pub fn open(root: impl Into<PathBuf>, quota: Option<u64>) -> BackendResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| map_io(&root, e))?;
        Ok(Self { root, quota })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}{}", encode_key(key), VALUE_SUFFIX))
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_io(&path, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        if let Some(quota) = self.quota {
            let used = self.used_bytes()?;
            let existing = self
                .get(key)?
                .map(|v| entry_size(key, &v))
                .unwrap_or(0);
            let required = entry_size(key, value);
            let available = quota.saturating_sub(used.saturating_sub(existing));
            if required > available {
                return Err(BackendError::QuotaExceeded {
                    required,
                    available,
                });
            }
        }

        let path = self.path_for(key);
        let temp = path.with_extension("tmp");
        let mut file = fs::File::create(&temp).map_err(|e| map_io(&temp, e))?;
        file.write_all(value.as_bytes())
            .map_err(|e| map_io(&temp, e))?;
        file.sync_all().map_err(|e| map_io(&temp, e))?;
        fs::rename(&temp, &path).map_err(|e| map_io(&path, e))
    }

    fn remove(&self, key: &str) -> BackendResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(map_io(&path, e)),
        }
    }

    fn keys(&self) -> BackendResult<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|e| map_io(&self.root, e))?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| map_io(&self.root, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(encoded) = name.strip_suffix(VALUE_SUFFIX) else {
                continue;
            };
            if let Some(key) = decode_key(encoded) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn capacity(&self) -> Option<u64> {
        self.quota
    }
}

fn map_io(path: &Path, err: io::Error) -> BackendError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => {
            BackendError::Disabled(format!("{}: {}", path.display(), err))
        }
        _ => BackendError::Io(format!("{}: {}", path.display(), err)),
    }
}

fn encode_key(key: &str) -> String {
    key.bytes().map(|b| format!("{:02x}", b)).collect()
}

fn decode_key(encoded: &str) -> Option<String> {
    if encoded.len() % 2 != 0 {
        return None;
    }
    let bytes: Option<Vec<u8>> = (0..encoded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&encoded[i..i + 2], 16).ok())
        .collect();
    String::from_utf8(bytes?).ok()
}
