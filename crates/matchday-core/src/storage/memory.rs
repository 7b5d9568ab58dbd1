//! In-memory key-value storage for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

use super::KeyValueStorage;

/// Clone-shared in-memory backend. Clones see the same data, which lets a
/// test hold a handle to storage it already handed to a component.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    values: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, for error-path tests.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.lock().unwrap().contains_key(key)
    }
}

impl KeyValueStorage for MemoryStorage {
    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.values
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Write {
                key: key.to_string(),
                source: std::io::Error::other("injected write failure"),
            });
        }
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn clones_share_data() {
        let storage = MemoryStorage::new();
        let clone = storage.clone();
        storage.write("key", b"value").await.unwrap();
        assert_eq!(clone.read("key").await.unwrap(), b"value");
    }

    #[tokio::test]
    async fn injected_failure_surfaces_as_write_error() {
        let storage = MemoryStorage::new();
        storage.set_fail_writes(true);
        let error = storage.write("key", b"value").await.unwrap_err();
        assert!(matches!(error, Error::Write { .. }));
        assert!(!storage.contains("key"));
    }
}
