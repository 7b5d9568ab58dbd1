//! Locally-authoritative favorite-ID sets.
//!
//! One [`FavoritesRegistry`] instance exists per favorite kind (teams,
//! matches, unsubscribed matches). The registry is the source of truth for
//! membership; the sync engine and the cross-device bridge both read from
//! and write through it.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};

use crate::error::{Error, Result};
use crate::storage::KeyValueStorage;

/// Storage key the current set is persisted under, inside the registry's
/// own storage namespace.
const FAVORITES_KEY: &str = "favorites";

/// Capacity of the update broadcast channel. Listeners that lag behind by
/// more than this many events observe a `Lagged` error instead of silently
/// missing updates.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A single membership change, delivered at most once per subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FavoriteUpdate<I> {
    pub id: I,
    pub is_favorite: bool,
}

/// Bounds every favorite identifier type satisfies (`TeamId`, `MatchId`).
pub trait FavoriteId:
    Copy + Ord + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<I> FavoriteId for I where
    I: Copy + Ord + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Persisted, replaceable set of favorite IDs for one entity kind.
///
/// Mutations are durably written before any event is published, so a crash
/// after an observer reacted can never lose the toggle it reacted to.
pub struct FavoritesRegistry<I, S> {
    inner: Arc<Inner<I, S>>,
}

struct Inner<I, S> {
    storage: S,
    /// Serializes the persist-then-commit section of every mutation.
    mutation: Mutex<()>,
    set: RwLock<BTreeSet<I>>,
    events: broadcast::Sender<FavoriteUpdate<I>>,
}

impl<I, S> Clone for FavoritesRegistry<I, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, S> FavoritesRegistry<I, S>
where
    I: FavoriteId,
    S: KeyValueStorage,
{
    /// Open the registry backed by `storage`, loading any persisted set.
    pub async fn open(storage: S) -> Result<Self> {
        let set = match storage.read_json::<BTreeSet<I>>(FAVORITES_KEY).await {
            Ok(set) => set,
            Err(Error::NotFound(_)) => BTreeSet::new(),
            Err(error) => return Err(error),
        };
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                storage,
                mutation: Mutex::new(()),
                set: RwLock::new(set),
                events,
            }),
        })
    }

    /// Subscribe to membership changes. Each subscriber observes every
    /// update at most once, in publish order.
    pub fn subscribe(&self) -> broadcast::Receiver<FavoriteUpdate<I>> {
        self.inner.events.subscribe()
    }

    pub fn is_favorite(&self, id: I) -> bool {
        self.inner.set.read().unwrap().contains(&id)
    }

    /// Snapshot of the current set.
    pub fn all(&self) -> BTreeSet<I> {
        self.inner.set.read().unwrap().clone()
    }

    /// Overwrite the whole set, e.g. with a set received from the paired
    /// device. Emits one event per ID in the symmetric difference:
    /// removals first, then additions. Replacing with the current set
    /// emits nothing.
    pub async fn replace(&self, new_set: BTreeSet<I>) -> Result<()> {
        let _guard = self.inner.mutation.lock().await;
        let previous = self.inner.set.read().unwrap().clone();
        if previous == new_set {
            return Ok(());
        }

        let removed: Vec<I> = previous.difference(&new_set).copied().collect();
        let added: Vec<I> = new_set.difference(&previous).copied().collect();

        self.persist_and_commit(new_set).await?;

        for id in removed {
            let _ = self.inner.events.send(FavoriteUpdate {
                id,
                is_favorite: false,
            });
        }
        for id in added {
            let _ = self.inner.events.send(FavoriteUpdate {
                id,
                is_favorite: true,
            });
        }
        Ok(())
    }

    /// Set a single membership. No-op (and no event) when already in the
    /// requested state.
    pub async fn set_favorite(&self, id: I, favorite: bool) -> Result<()> {
        let _guard = self.inner.mutation.lock().await;
        let mut new_set = self.inner.set.read().unwrap().clone();
        let changed = if favorite {
            new_set.insert(id)
        } else {
            new_set.remove(&id)
        };
        if !changed {
            return Ok(());
        }

        self.persist_and_commit(new_set).await?;
        let _ = self.inner.events.send(FavoriteUpdate {
            id,
            is_favorite: favorite,
        });
        Ok(())
    }

    /// Flip a single membership, returning the new state.
    pub async fn toggle(&self, id: I) -> Result<bool> {
        let favorite = !self.is_favorite(id);
        self.set_favorite(id, favorite).await?;
        Ok(favorite)
    }

    /// Durably write `new_set`, then make it visible in memory. Callers
    /// must hold the mutation lock and publish events only after this
    /// returns.
    async fn persist_and_commit(&self, new_set: BTreeSet<I>) -> Result<()> {
        self.inner
            .storage
            .write_json(FAVORITES_KEY, &new_set)
            .await?;
        *self.inner.set.write().unwrap() = new_set;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TeamId;
    use crate::storage::MemoryStorage;
    use pretty_assertions::assert_eq;

    async fn registry() -> FavoritesRegistry<TeamId, MemoryStorage> {
        FavoritesRegistry::open(MemoryStorage::new()).await.unwrap()
    }

    fn drain<I: FavoriteId>(
        rx: &mut broadcast::Receiver<FavoriteUpdate<I>>,
    ) -> Vec<FavoriteUpdate<I>> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn starts_empty_and_tracks_membership() {
        let registry = registry().await;
        assert!(!registry.is_favorite(TeamId(42)));
        registry.set_favorite(TeamId(42), true).await.unwrap();
        assert!(registry.is_favorite(TeamId(42)));
        assert_eq!(registry.all(), BTreeSet::from([TeamId(42)]));
    }

    #[tokio::test]
    async fn set_favorite_emits_singleton_delta() {
        let registry = registry().await;
        let mut rx = registry.subscribe();

        registry.set_favorite(TeamId(42), true).await.unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![FavoriteUpdate {
                id: TeamId(42),
                is_favorite: true
            }]
        );

        // Same state again: no event.
        registry.set_favorite(TeamId(42), true).await.unwrap();
        assert_eq!(drain(&mut rx), vec![]);
    }

    #[tokio::test]
    async fn replace_emits_removals_then_additions() {
        let registry = registry().await;
        registry
            .replace(BTreeSet::from([TeamId(1), TeamId(2)]))
            .await
            .unwrap();

        let mut rx = registry.subscribe();
        registry
            .replace(BTreeSet::from([TeamId(2), TeamId(3)]))
            .await
            .unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                FavoriteUpdate {
                    id: TeamId(1),
                    is_favorite: false
                },
                FavoriteUpdate {
                    id: TeamId(3),
                    is_favorite: true
                },
            ]
        );
    }

    #[tokio::test]
    async fn identical_replace_is_silent() {
        let registry = registry().await;
        let set = BTreeSet::from([TeamId(1), TeamId(2)]);
        registry.replace(set.clone()).await.unwrap();

        let mut rx = registry.subscribe();
        registry.replace(set).await.unwrap();
        assert_eq!(drain(&mut rx), vec![]);
    }

    #[tokio::test]
    async fn toggle_flips_and_reports_state() {
        let registry = registry().await;
        assert!(registry.toggle(TeamId(7)).await.unwrap());
        assert!(!registry.toggle(TeamId(7)).await.unwrap());
        assert!(!registry.is_favorite(TeamId(7)));
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let storage = MemoryStorage::new();
        {
            let registry: FavoritesRegistry<TeamId, _> =
                FavoritesRegistry::open(storage.clone()).await.unwrap();
            registry.set_favorite(TeamId(42), true).await.unwrap();
        }
        let reopened: FavoritesRegistry<TeamId, _> =
            FavoritesRegistry::open(storage).await.unwrap();
        assert!(reopened.is_favorite(TeamId(42)));
    }

    #[tokio::test]
    async fn failed_persist_leaves_memory_and_emits_nothing() {
        let storage = MemoryStorage::new();
        let registry: FavoritesRegistry<TeamId, _> =
            FavoritesRegistry::open(storage.clone()).await.unwrap();
        let mut rx = registry.subscribe();

        storage.set_fail_writes(true);
        let error = registry.set_favorite(TeamId(42), true).await.unwrap_err();
        assert!(matches!(error, Error::Write { .. }));
        assert!(!registry.is_favorite(TeamId(42)));
        assert_eq!(drain(&mut rx), vec![]);
    }
}
