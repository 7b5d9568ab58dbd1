//! Durable record of the last state believed uploaded.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::storage::KeyValueStorage;

/// Storage key the keeper snapshot is persisted under, inside the keeper's
/// own storage namespace.
const KEEPER_KEY: &str = "uploaded";

/// Remembers the last snapshot the server is believed to hold.
///
/// The sync engine compares the keeper against the currently-desired state
/// to decide whether a re-upload is needed. Uploads can fail silently from
/// the app's point of view (suspended before the completion callback), so
/// the keeper deliberately defaults instead of erroring when nothing has
/// been recorded yet: comparisons must never operate on missing data.
pub struct ConsistencyKeeper<T, S> {
    storage: S,
    default: T,
}

impl<T, S> ConsistencyKeeper<T, S>
where
    T: Serialize + DeserializeOwned + Clone,
    S: KeyValueStorage,
{
    pub fn new(storage: S, default: T) -> Self {
        Self { storage, default }
    }

    /// The last snapshot recorded as uploaded, or the default when none
    /// has been recorded.
    pub async fn load(&self) -> Result<T> {
        match self.storage.read_json(KEEPER_KEY).await {
            Ok(value) => Ok(value),
            Err(Error::NotFound(_)) => Ok(self.default.clone()),
            Err(error) => Err(error),
        }
    }

    /// Record `snapshot` as successfully uploaded.
    pub async fn store(&self, snapshot: &T) -> Result<()> {
        self.storage.write_json(KEEPER_KEY, snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn load_defaults_when_nothing_recorded() {
        let keeper = ConsistencyKeeper::new(MemoryStorage::new(), String::from("default"));
        assert_eq!(keeper.load().await.unwrap(), "default");
    }

    #[tokio::test]
    async fn store_then_load_round_trips() {
        let keeper = ConsistencyKeeper::new(MemoryStorage::new(), 0u64);
        keeper.store(&42).await.unwrap();
        assert_eq!(keeper.load().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn store_failure_is_surfaced() {
        let storage = MemoryStorage::new();
        let keeper = ConsistencyKeeper::new(storage.clone(), 0u64);
        storage.set_fail_writes(true);
        assert!(keeper.store(&42).await.is_err());
        // Still defaults: the failed write recorded nothing.
        assert_eq!(keeper.load().await.unwrap(), 0);
    }
}
