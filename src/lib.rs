//! kvguard - checksummed, self-healing key-value storage
//!
//! Layers versioned, checksummed records, automatic pre-write backups,
//! corruption detection, multi-strategy recovery and usage analytics on top
//! of a plain key-value backend.
//!
//! # Components (leaf-first)
//!
//! - [`backend`]: raw string store contract with memory and file backends
//! - [`store`]: the integrity store
//! - [`recovery`]: integrity checks, recovery strategies, batch sessions
//! - [`analytics`]: sampling, trends, recommendations, predictions
//! - [`health`]: one aggregated status

pub mod analytics;
pub mod backend;
pub mod cli;
pub mod config;
pub mod errors;
pub mod health;
pub mod observability;
pub mod recovery;
pub mod store;
pub mod task;

pub use config::Config;
pub use errors::{ErrorCode, OperationResult, StoreError, StoreResult};
pub use store::{IntegrityStore, Operation};
