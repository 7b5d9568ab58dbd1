//! The favorites sync engine: one consistency loop per favorite kind.
//!
//! The engine is level-triggered. Every trigger (registry mutation, delayed
//! consistency check, token rotation) means "desired state may differ from
//! what the server holds"; a round re-derives the desired snapshot, compares
//! it against the keeper, and uploads only on mismatch. A mutation that
//! races an in-flight upload is therefore never lost; it just causes one
//! more round.
//!
//! The engine does not retry. A failed upload leaves the keeper stale and
//! returns the engine to `Idle`; the next trigger is the single recovery
//! path.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::error::Result;
use crate::favorites::{FavoriteId, FavoritesRegistry};
use crate::storage::KeyValueStorage;

use super::keeper::ConsistencyKeeper;
use super::tokens::PushToken;
use super::uploader::Uploader;

/// Where the engine currently is in its upload cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    AwaitingToken,
    Uploading,
    UpToDate,
}

/// What the server is told (and what the keeper remembers): the device
/// token plus the full favorite-ID set. Including the token means a
/// rotation makes the keeper compare as stale, so rotation reuses the
/// ordinary consistency path instead of special-case logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSnapshot<I: Ord> {
    pub token: String,
    pub ids: BTreeSet<I>,
}

impl<I: Ord> Default for UploadSnapshot<I> {
    fn default() -> Self {
        Self {
            token: String::new(),
            ids: BTreeSet::new(),
        }
    }
}

/// Level-triggered sync engine for one favorite kind.
///
/// Rounds run strictly serially; triggers arriving while a round is in
/// flight coalesce into at most one pending round (capacity-1 channel).
pub struct FavoritesSync<I: Ord, S, U> {
    inner: Arc<EngineInner<I, S, U>>,
}

struct EngineInner<I: Ord, S, U> {
    resource: String,
    registry: FavoritesRegistry<I, S>,
    keeper: ConsistencyKeeper<UploadSnapshot<I>, S>,
    token: watch::Receiver<Option<PushToken>>,
    uploader: U,
    trigger_tx: mpsc::Sender<()>,
    trigger_rx: Mutex<Option<mpsc::Receiver<()>>>,
    phase: watch::Sender<SyncPhase>,
}

impl<I: Ord, S, U> Clone for FavoritesSync<I, S, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, S, U> FavoritesSync<I, S, U>
where
    I: FavoriteId,
    S: KeyValueStorage,
    U: Uploader,
{
    pub fn new(
        resource: impl Into<String>,
        registry: FavoritesRegistry<I, S>,
        keeper: ConsistencyKeeper<UploadSnapshot<I>, S>,
        token: watch::Receiver<Option<PushToken>>,
        uploader: U,
    ) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            inner: Arc::new(EngineInner {
                resource: resource.into(),
                registry,
                keeper,
                token,
                uploader,
                trigger_tx,
                trigger_rx: Mutex::new(Some(trigger_rx)),
                phase,
            }),
        }
    }

    /// Request a consistency check. Cheap and non-blocking; any number of
    /// triggers during an in-flight round collapse into one pending round.
    pub fn trigger(&self) {
        let _ = self.inner.trigger_tx.try_send(());
    }

    /// Observe phase transitions (mainly for tests and status UI).
    pub fn watch_phase(&self) -> watch::Receiver<SyncPhase> {
        self.inner.phase.subscribe()
    }

    /// Drive the engine until the last handle is dropped. Call once, from
    /// a spawned task.
    pub async fn run(self) {
        let receiver = self.inner.trigger_rx.lock().unwrap().take();
        let Some(mut receiver) = receiver else {
            tracing::warn!(resource = %self.inner.resource, "sync engine already running");
            return;
        };
        while receiver.recv().await.is_some() {
            if let Err(error) = self.sync_once().await {
                tracing::warn!(
                    resource = %self.inner.resource,
                    %error,
                    "sync round failed"
                );
                self.set_phase(SyncPhase::Idle);
            }
        }
    }

    /// One consistency round: wait for a token, compare desired state with
    /// the keeper, upload on mismatch.
    pub async fn sync_once(&self) -> Result<()> {
        let Some(token) = self.wait_for_token().await else {
            // Token source is gone; nothing can be uploaded anymore.
            self.set_phase(SyncPhase::Idle);
            return Ok(());
        };

        let desired = UploadSnapshot {
            token: token.to_hex(),
            ids: self.inner.registry.all(),
        };
        let uploaded = self.inner.keeper.load().await?;
        if desired == uploaded {
            tracing::debug!(resource = %self.inner.resource, "already consistent");
            self.set_phase(SyncPhase::UpToDate);
            return Ok(());
        }

        self.set_phase(SyncPhase::Uploading);
        let body = serde_json::to_vec(&desired)?;
        match self.inner.uploader.upload(&self.inner.resource, body).await {
            Ok(()) => {
                self.inner.keeper.store(&desired).await?;
                tracing::info!(
                    resource = %self.inner.resource,
                    count = desired.ids.len(),
                    "favorites uploaded"
                );
                self.set_phase(SyncPhase::UpToDate);
            }
            Err(error) => {
                // Keeper untouched: the next trigger retries automatically.
                tracing::warn!(resource = %self.inner.resource, %error, "upload failed");
                self.set_phase(SyncPhase::Idle);
            }
        }
        Ok(())
    }

    async fn wait_for_token(&self) -> Option<PushToken> {
        let mut rx = self.inner.token.clone();
        loop {
            if let Some(token) = rx.borrow_and_update().clone() {
                return Some(token);
            }
            self.set_phase(SyncPhase::AwaitingToken);
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.inner.phase.send_replace(phase);
    }
}
