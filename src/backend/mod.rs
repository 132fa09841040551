//! Raw key-value backends
//!
//! The backend is the plain string store the integrity layer sits on. It
//! knows nothing about checksums, backups or recovery; it only stores,
//! fetches, removes and enumerates string values and reports capacity.
//!
//! Two implementations are provided:
//!
//! - [`MemoryBackend`] - in-process map with a byte quota
//! - [`FileBackend`] - one file per key under a root directory

mod errors;
mod file;
mod memory;

pub use errors::{BackendError, BackendResult};
pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Default quota for the memory backend, mirroring a browser origin store.
pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

/// Backend contract used by the integrity store.
///
/// Sizes are measured as `key.len() + value.len()` bytes.
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Fetch the raw value for `key`
    fn get(&self, key: &str) -> BackendResult<Option<String>>;

    /// Store `value` under `key`, replacing any existing value
    fn set(&self, key: &str, value: &str) -> BackendResult<()>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> BackendResult<()>;

    /// Enumerate every stored key
    fn keys(&self) -> BackendResult<Vec<String>>;

    /// Capacity ceiling in bytes, `None` when unbounded
    fn capacity(&self) -> Option<u64>;

    /// Bytes currently in use
    fn used_bytes(&self) -> BackendResult<u64> {
        let mut total = 0u64;
        for key in self.keys()? {
            if let Some(value) = self.get(&key)? {
                total += entry_size(&key, &value);
            }
        }
        Ok(total)
    }
}

/// Size accounted for one entry.
pub fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}
