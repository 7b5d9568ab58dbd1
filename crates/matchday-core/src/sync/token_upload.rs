//! Push-token uploader: the consistency-keeper pattern applied to the
//! complication push token itself.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::error::Result;
use crate::storage::KeyValueStorage;

use super::engine::SyncPhase;
use super::keeper::ConsistencyKeeper;
use super::tokens::PushToken;
use super::uploader::Uploader;

/// Body sent to the `pushkit-token` resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUploadPayload {
    pub device_identifier: String,
    pub token: String,
}

/// Keeps the server's copy of the complication push token consistent with
/// the locally registered one.
///
/// The keeper defaults to the all-zero sentinel token, so the first real
/// registration always compares as "not yet uploaded". Triggered by token
/// rotation and by the app-active consistency check, exactly like the
/// favorites engines.
pub struct TokenUploader<S, U> {
    inner: Arc<TokenUploaderInner<S, U>>,
}

struct TokenUploaderInner<S, U> {
    resource: String,
    device_identifier: String,
    keeper: ConsistencyKeeper<PushToken, S>,
    token: watch::Receiver<Option<PushToken>>,
    uploader: U,
    trigger_tx: mpsc::Sender<()>,
    trigger_rx: Mutex<Option<mpsc::Receiver<()>>>,
    phase: watch::Sender<SyncPhase>,
}

impl<S, U> Clone for TokenUploader<S, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, U> TokenUploader<S, U>
where
    S: KeyValueStorage,
    U: Uploader,
{
    pub fn new(
        resource: impl Into<String>,
        device_identifier: impl Into<String>,
        keeper_storage: S,
        token: watch::Receiver<Option<PushToken>>,
        uploader: U,
    ) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            inner: Arc::new(TokenUploaderInner {
                resource: resource.into(),
                device_identifier: device_identifier.into(),
                keeper: ConsistencyKeeper::new(keeper_storage, PushToken::zero()),
                token,
                uploader,
                trigger_tx,
                trigger_rx: Mutex::new(Some(trigger_rx)),
                phase,
            }),
        }
    }

    /// Request a consistency check; coalesces like the favorites engine.
    pub fn trigger(&self) {
        let _ = self.inner.trigger_tx.try_send(());
    }

    pub fn watch_phase(&self) -> watch::Receiver<SyncPhase> {
        self.inner.phase.subscribe()
    }

    /// Drive the uploader until the last handle is dropped.
    pub async fn run(self) {
        let receiver = self.inner.trigger_rx.lock().unwrap().take();
        let Some(mut receiver) = receiver else {
            tracing::warn!(resource = %self.inner.resource, "token uploader already running");
            return;
        };
        while receiver.recv().await.is_some() {
            if let Err(error) = self.sync_once().await {
                tracing::warn!(
                    resource = %self.inner.resource,
                    %error,
                    "token upload round failed"
                );
                self.set_phase(SyncPhase::Idle);
            }
        }
    }

    /// One consistency round for the token.
    pub async fn sync_once(&self) -> Result<()> {
        let Some(token) = self.wait_for_token().await else {
            self.set_phase(SyncPhase::Idle);
            return Ok(());
        };

        let uploaded = self.inner.keeper.load().await?;
        if token == uploaded {
            self.set_phase(SyncPhase::UpToDate);
            return Ok(());
        }

        self.set_phase(SyncPhase::Uploading);
        let payload = TokenUploadPayload {
            device_identifier: self.inner.device_identifier.clone(),
            token: token.to_hex(),
        };
        let body = serde_json::to_vec(&payload)?;
        match self.inner.uploader.upload(&self.inner.resource, body).await {
            Ok(()) => {
                self.inner.keeper.store(&token).await?;
                tracing::info!(resource = %self.inner.resource, "push token uploaded");
                self.set_phase(SyncPhase::UpToDate);
            }
            Err(error) => {
                tracing::warn!(resource = %self.inner.resource, %error, "token upload failed");
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
