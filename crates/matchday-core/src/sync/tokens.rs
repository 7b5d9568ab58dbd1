//! Push/device token ownership and rotation events.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// Raw bytes identifying this installation to the push service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushToken(pub Vec<u8>);

impl PushToken {
    /// The one-byte all-zero sentinel used as a keeper default, so the
    /// first real token always compares as "different from uploaded".
    pub fn zero() -> Self {
        Self(vec![0])
    }

    /// Lowercase hex rendering, the form tokens are uploaded in.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

impl fmt::Display for PushToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PushToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_tuple("PushToken")
            .field(&"[REDACTED]")
            .finish()
    }
}

/// Owns the current device tokens and notifies observers on rotation.
///
/// Two independent tokens are tracked: the general remote-notification
/// token and the complication token for the companion-device channel. A
/// rotation must trigger the same consistency re-check path as a normal
/// app-active timer, because a new token invalidates the server's previous
/// association; observers get that via the watch channels.
pub struct DeviceTokens {
    notifications: watch::Sender<Option<PushToken>>,
    complication: watch::Sender<Option<PushToken>>,
}

impl Default for DeviceTokens {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTokens {
    pub fn new() -> Self {
        let (notifications, _) = watch::channel(None);
        let (complication, _) = watch::channel(None);
        Self {
            notifications,
            complication,
        }
    }

    pub fn notifications_token(&self) -> Option<PushToken> {
        self.notifications.borrow().clone()
    }

    pub fn complication_token(&self) -> Option<PushToken> {
        self.complication.borrow().clone()
    }

    /// Record a (re-)registered remote-notification token.
    pub fn set_notifications_token(&self, token: PushToken) {
        tracing::info!("remote notifications token updated");
        self.notifications.send_replace(Some(token));
    }

    /// Record a (re-)registered complication token.
    pub fn set_complication_token(&self, token: PushToken) {
        tracing::info!("complication token updated");
        self.complication.send_replace(Some(token));
    }

    /// Observe the remote-notification token, including rotations.
    pub fn watch_notifications(&self) -> watch::Receiver<Option<PushToken>> {
        self.notifications.subscribe()
    }

    /// Observe the complication token, including rotations.
    pub fn watch_complication(&self) -> watch::Receiver<Option<PushToken>> {
        self.complication.subscribe()
    }
}
