//! Key-value persistence for local device state
//!
//! - Memory: process-local store for tests and ephemeral sessions
//! - File: a single JSON document on disk

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

/// Store adapter error types
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Stored data has unsupported version {0}")]
    UnsupportedVersion(u32),
}

/// Async key-value store the registry persists through
///
/// Implementations need not be transactional; callers that read-modify-write
/// must serialize their own writes.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key was never written or was deleted
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key; removing a missing key is not an error
    async fn delete_item(&self, key: &str) -> Result<(), StoreError>;
}
