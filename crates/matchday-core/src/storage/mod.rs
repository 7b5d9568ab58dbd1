//! Durable key-value storage with pluggable backing.
//!
//! Every persisted blob in the core (favorite sets, consistency keepers,
//! the local matches database) goes through [`KeyValueStorage`]. Production
//! code uses [`DiskStorage`] (one directory namespace per kind, one file per
//! key); tests use [`MemoryStorage`].

mod disk;
mod memory;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Persistent mapping from a string key to a blob.
///
/// Absence is reported as [`crate::Error::NotFound`] so callers can decide
/// whether to default; write failures are always surfaced, never swallowed.
/// Retry policy belongs to the caller.
#[allow(async_fn_in_trait)]
pub trait KeyValueStorage: Send + Sync {
    /// Read the blob stored under `key`.
    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Atomically replace the blob stored under `key`.
    async fn write(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Read and JSON-decode the value stored under `key`.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let bytes = self.read(key).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// JSON-encode `value` and atomically replace the blob under `key`.
    async fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.write(key, &bytes).await
    }
}
