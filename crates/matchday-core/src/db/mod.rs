//! Local matches database.
//!
//! A persisted list of edition-stamped matches, the companion device's copy
//! of the reference data. Single-match updates arriving over the bridge are
//! merged with the last-writer-wins edition rule, which makes out-of-order
//! delivery deterministic.

use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{Editioned, Match, MatchId};
use crate::storage::KeyValueStorage;

/// Storage key for the full matches list.
const MATCHES_KEY: &str = "all-matches";

/// Clone-shared persisted store of `Editioned<Match>` entries.
pub struct MatchesDb<S> {
    inner: Arc<DbInner<S>>,
}

struct DbInner<S> {
    storage: S,
    /// Serializes the read-modify-persist-commit section of every mutation.
    mutation: Mutex<()>,
    matches: RwLock<Vec<Editioned<Match>>>,
}

impl<S> Clone for MatchesDb<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: KeyValueStorage> MatchesDb<S> {
    /// Open the database backed by `storage`, loading any persisted list.
    pub async fn open(storage: S) -> Result<Self> {
        let matches = match storage.read_json::<Vec<Editioned<Match>>>(MATCHES_KEY).await {
            Ok(matches) => matches,
            Err(Error::NotFound(_)) => Vec::new(),
            Err(error) => return Err(error),
        };
        Ok(Self {
            inner: Arc::new(DbInner {
                storage,
                mutation: Mutex::new(()),
                matches: RwLock::new(matches),
            }),
        })
    }

    /// Snapshot of all stored matches.
    pub fn matches(&self) -> Vec<Editioned<Match>> {
        self.inner.matches.read().unwrap().clone()
    }

    pub fn get(&self, id: MatchId) -> Option<Editioned<Match>> {
        self.inner
            .matches
            .read()
            .unwrap()
            .iter()
            .find(|entry| entry.content.id == id)
            .cloned()
    }

    /// Replace the whole list, e.g. after a full snapshot fetch.
    pub async fn replace_all(&self, matches: Vec<Editioned<Match>>) -> Result<()> {
        let _guard = self.inner.mutation.lock().await;
        self.inner.storage.write_json(MATCHES_KEY, &matches).await?;
        *self.inner.matches.write().unwrap() = matches;
        Ok(())
    }

    /// Merge a single-match update. The stored copy is overwritten only if
    /// the incoming edition is more recent; a match not seen before is
    /// inserted. Returns whether anything changed.
    pub async fn apply(&self, update: Editioned<Match>) -> Result<bool> {
        let _guard = self.inner.mutation.lock().await;
        let mut updated = self.inner.matches.read().unwrap().clone();
        let changed = match updated
            .iter_mut()
            .find(|entry| entry.content.id == update.content.id)
        {
            Some(existing) => {
                if update.is_more_recent_than(existing) {
                    *existing = update;
                    true
                } else {
                    false
                }
            }
            None => {
                updated.push(update);
                true
            }
        };
        if !changed {
            return Ok(false);
        }

        self.inner.storage.write_json(MATCHES_KEY, &updated).await?;
        *self.inner.matches.write().unwrap() = updated;
        Ok(true)
    }
}
