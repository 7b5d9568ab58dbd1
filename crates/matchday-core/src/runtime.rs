//! Composition roots for the phone app and the companion extension.
//!
//! All components are constructed and wired here, once, at process start,
//! and handed down by dependency injection; there are no ambient globals.
//! UI layers hold a runtime and call into it from event handlers.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::bridge::{Package, WatchBridge};
use crate::db::MatchesDb;
use crate::error::Result;
use crate::favorites::{FavoriteId, FavoritesRegistry};
use crate::models::{choose_match_to_show, Match, MatchId, TeamId};
use crate::storage::DiskStorage;
use crate::sync::{
    ConsistencyKeeper, DeviceTokens, FavoritesSync, HttpUploader, SyncPhase, TokenUploader,
    UploadSnapshot,
};
use tokio::sync::{mpsc, watch};

/// How long after an activation event the consistency check fires. Long
/// enough to let launch-time work settle, short enough to repair a missed
/// upload within the same foreground session.
const CONSISTENCY_CHECK_DELAY: Duration = Duration::from_secs(4);

/// Everything the composition roots need to know about the environment.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Root directory for all persisted state.
    pub data_dir: PathBuf,
    /// Base URL of the upload endpoint.
    pub upload_base_url: String,
    /// Stable per-installation identifier sent with token uploads.
    pub device_identifier: String,
}

type DiskRegistry<I> = FavoritesRegistry<I, DiskStorage>;
type DiskSync<I> = FavoritesSync<I, DiskStorage, HttpUploader>;

/// Phone-side composition root: three favorite kinds, each with its own
/// registry, keeper and sync engine, plus the push-token uploader.
pub struct PhoneRuntime {
    pub tokens: Arc<DeviceTokens>,
    pub favorite_teams: DiskRegistry<TeamId>,
    pub favorite_matches: DiskRegistry<MatchId>,
    pub unsubscribed_matches: DiskRegistry<MatchId>,
    teams_sync: DiskSync<TeamId>,
    matches_sync: DiskSync<MatchId>,
    unsubs_sync: DiskSync<MatchId>,
    token_uploader: TokenUploader<DiskStorage, HttpUploader>,
}

impl PhoneRuntime {
    /// Build the phone runtime. Packages destined for the paired device
    /// are pushed into `outbound`; the transport layer owns the receiving
    /// end and delivers them over the device-to-device session.
    pub async fn new(config: RuntimeConfig, outbound: mpsc::Sender<Package>) -> Result<Self> {
        let tokens = Arc::new(DeviceTokens::new());
        let uploader = HttpUploader::new(config.upload_base_url)?;

        let favorite_teams = open_registry(&config.data_dir, "favorite-teams").await?;
        let favorite_matches = open_registry(&config.data_dir, "favorite-matches").await?;
        let unsubscribed_matches = open_registry(&config.data_dir, "unsubscribed-matches").await?;

        let teams_sync = spawn_sync(
            "favorite-teams",
            "teams-upload-keepers",
            &config.data_dir,
            favorite_teams.clone(),
            &tokens,
            uploader.clone(),
        )
        .await?;
        let matches_sync = spawn_sync(
            "favorite-matches",
            "matches-upload-keepers",
            &config.data_dir,
            favorite_matches.clone(),
            &tokens,
            uploader.clone(),
        )
        .await?;
        let unsubs_sync = spawn_sync(
            "unsubscribe",
            "matches-unsub-upload-keepers",
            &config.data_dir,
            unsubscribed_matches.clone(),
            &tokens,
            uploader.clone(),
        )
        .await?;

        let keeper_storage =
            DiskStorage::open(config.data_dir.join("pushkit-token-upload-keeper")).await?;
        let token_uploader = TokenUploader::new(
            "pushkit-token",
            config.device_identifier,
            keeper_storage,
            tokens.watch_complication(),
            uploader,
        );
        tokio::spawn(token_uploader.clone().run());
        forward_token_rotation_to(tokens.watch_complication(), {
            let token_uploader = token_uploader.clone();
            move || token_uploader.trigger()
        });

        forward_favorites_to_watch(
            favorite_teams.clone(),
            outbound.clone(),
            Package::team_favorites,
        );
        forward_favorites_to_watch(
            favorite_matches.clone(),
            outbound,
            Package::match_favorites,
        );

        tracing::info!(data_dir = %config.data_dir.display(), "phone runtime ready");
        Ok(Self {
            tokens,
            favorite_teams,
            favorite_matches,
            unsubscribed_matches,
            teams_sync,
            matches_sync,
            unsubs_sync,
            token_uploader,
        })
    }

    /// Schedule the delayed consistency check that follows an activation
    /// event. If the process exits before the delay elapses the check
    /// simply never fires; the next activation schedules a new one.
    pub fn became_active(&self) {
        let teams = self.teams_sync.clone();
        let matches = self.matches_sync.clone();
        let unsubs = self.unsubs_sync.clone();
        let token_uploader = self.token_uploader.clone();
        tokio::spawn(async move {
            tokio::time::sleep(CONSISTENCY_CHECK_DELAY).await;
            tracing::debug!("running post-activation consistency check");
            teams.trigger();
            matches.trigger();
            unsubs.trigger();
            token_uploader.trigger();
        });
    }

    pub fn teams_sync_phase(&self) -> watch::Receiver<SyncPhase> {
        self.teams_sync.watch_phase()
    }

    /// Outbound bridge package mirroring the current favorite teams, for
    /// the external transport to deliver to the paired device.
    pub fn team_favorites_package(&self) -> Result<Package> {
        Package::team_favorites(&self.favorite_teams.all())
    }

    /// Outbound bridge package mirroring the current favorite matches.
    pub fn match_favorites_package(&self) -> Result<Package> {
        Package::match_favorites(&self.favorite_matches.all())
    }
}

/// Companion-side composition root: registries fed by the bridge plus the
/// local matches database backing the watch face.
pub struct WatchRuntime {
    pub favorite_teams: DiskRegistry<TeamId>,
    pub favorite_matches: DiskRegistry<MatchId>,
    pub matches_db: MatchesDb<DiskStorage>,
    bridge: WatchBridge<DiskStorage>,
}

impl WatchRuntime {
    pub async fn new(config: RuntimeConfig) -> Result<Self> {
        let favorite_teams = open_registry(&config.data_dir, "favorite-teams").await?;
        let favorite_matches = open_registry(&config.data_dir, "favorite-matches").await?;
        let matches_db =
            MatchesDb::open(DiskStorage::open(config.data_dir.join("matches-db")).await?).await?;
        let bridge = WatchBridge::new(
            favorite_teams.clone(),
            favorite_matches.clone(),
            matches_db.clone(),
        );

        tracing::info!(data_dir = %config.data_dir.display(), "watch runtime ready");
        Ok(Self {
            favorite_teams,
            favorite_matches,
            matches_db,
            bridge,
        })
    }

    /// Feed raw transport bytes into the bridge.
    pub async fn receive_bytes(&self, bytes: &[u8]) {
        self.bridge.receive_bytes(bytes).await;
    }

    pub fn is_favorite_match(&self, m: &Match) -> bool {
        m.is_favorite(
            |id| self.favorite_matches.is_favorite(id),
            |id| self.favorite_teams.is_favorite(id),
        )
    }

    /// Which of two matches the watch face should show.
    pub fn choose_match_to_show(&self, lhs: Match, rhs: Match) -> Match {
        choose_match_to_show(lhs, rhs, |m| self.is_favorite_match(m))
    }
}

async fn open_registry<I: FavoriteId>(
    data_dir: &std::path::Path,
    namespace: &str,
) -> Result<DiskRegistry<I>> {
    FavoritesRegistry::open(DiskStorage::open(data_dir.join(namespace)).await?).await
}

/// Wire one favorite kind: keeper storage, engine task, and the forwarding
/// tasks that turn registry events and token rotations into triggers.
async fn spawn_sync<I: FavoriteId>(
    resource: &str,
    keeper_namespace: &str,
    data_dir: &std::path::Path,
    registry: DiskRegistry<I>,
    tokens: &DeviceTokens,
    uploader: HttpUploader,
) -> Result<DiskSync<I>> {
    let keeper_storage = DiskStorage::open(data_dir.join(keeper_namespace)).await?;
    let keeper = ConsistencyKeeper::new(keeper_storage, UploadSnapshot::default());
    let engine = FavoritesSync::new(
        resource,
        registry.clone(),
        keeper,
        tokens.watch_notifications(),
        uploader,
    );
    tokio::spawn(engine.clone().run());

    // Registry mutations poke the engine. A lagged receiver only means
    // triggers were dropped while one was already pending, which the
    // level-triggered engine does not care about.
    let mut events = registry.subscribe();
    let event_engine = engine.clone();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    event_engine.trigger();
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    forward_token_rotation_to(tokens.watch_notifications(), {
        let engine = engine.clone();
        move || engine.trigger()
    });

    Ok(engine)
}

/// Mirror every mutation of one favorites registry to the paired device
/// as a full-set package. Sending the whole set makes delivery order
/// irrelevant on the receiving side.
fn forward_favorites_to_watch<I: FavoriteId>(
    registry: DiskRegistry<I>,
    outbound: mpsc::Sender<Package>,
    pack: impl Fn(&BTreeSet<I>) -> Result<Package> + Send + 'static,
) {
    let mut events = registry.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    match pack(&registry.all()) {
                        Ok(package) => {
                            if outbound.send(package).await.is_err() {
                                break;
                            }
                        }
                        Err(error) => {
                            tracing::warn!(%error, "failed to build outbound favorites package");
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn forward_token_rotation_to(
    mut rx: watch::Receiver<Option<crate::sync::PushToken>>,
    trigger: impl Fn() + Send + 'static,
) {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            trigger();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::PackageKind;
    use crate::models::TeamId;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn config(dir: &TempDir) -> RuntimeConfig {
        RuntimeConfig {
            data_dir: dir.path().to_path_buf(),
            upload_base_url: "https://api.example.com".to_string(),
            device_identifier: "device-1234".to_string(),
        }
    }

    async fn phone_runtime(dir: &TempDir) -> (PhoneRuntime, mpsc::Receiver<Package>) {
        let (tx, rx) = mpsc::channel(16);
        let runtime = PhoneRuntime::new(config(dir), tx).await.unwrap();
        (runtime, rx)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn phone_runtime_creates_storage_namespaces() {
        let dir = TempDir::new().unwrap();
        let (_runtime, _rx) = phone_runtime(&dir).await;
        for namespace in [
            "favorite-teams",
            "favorite-matches",
            "unsubscribed-matches",
            "teams-upload-keepers",
            "matches-upload-keepers",
            "matches-unsub-upload-keepers",
            "pushkit-token-upload-keeper",
        ] {
            assert!(dir.path().join(namespace).is_dir(), "{namespace} missing");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn favorite_mutation_wakes_the_engine() {
        let dir = TempDir::new().unwrap();
        let (runtime, _rx) = phone_runtime(&dir).await;
        let mut phase = runtime.teams_sync_phase();

        runtime
            .favorite_teams
            .set_favorite(TeamId(42), true)
            .await
            .unwrap();

        // No token registered, so the engine must end up waiting for one.
        timeout(
            Duration::from_secs(5),
            phase.wait_for(|p| *p == SyncPhase::AwaitingToken),
        )
        .await
        .unwrap()
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn became_active_schedules_delayed_check() {
        let dir = TempDir::new().unwrap();
        let (runtime, _rx) = phone_runtime(&dir).await;
        let mut phase = runtime.teams_sync_phase();
        assert_eq!(*phase.borrow(), SyncPhase::Idle);

        runtime.became_active();

        // Paused-clock auto-advance skips the 4 second delay.
        phase
            .wait_for(|p| *p == SyncPhase::AwaitingToken)
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn favorite_mutation_is_mirrored_to_the_paired_device() {
        let dir = TempDir::new().unwrap();
        let (runtime, mut rx) = phone_runtime(&dir).await;

        runtime
            .favorite_teams
            .set_favorite(TeamId(7), true)
            .await
            .unwrap();

        let package = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(package.kind, PackageKind::TeamFavoritesUpdate);
        let ids: BTreeSet<TeamId> = package.unpack().unwrap();
        assert_eq!(ids, BTreeSet::from([TeamId(7)]));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn watch_runtime_answers_favorite_queries_after_bridge_update() {
        let dir = TempDir::new().unwrap();
        let runtime = WatchRuntime::new(config(&dir)).await.unwrap();

        let package =
            Package::team_favorites(&std::collections::BTreeSet::from([TeamId(10)])).unwrap();
        runtime.receive_bytes(&package.to_bytes().unwrap()).await;

        assert!(runtime.favorite_teams.is_favorite(TeamId(10)));
    }
}
