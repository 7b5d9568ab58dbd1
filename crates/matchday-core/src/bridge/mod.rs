//! Cross-device bridge: typed packages between phone and companion device.
//!
//! The transport itself (the watch connectivity session) is an external
//! collaborator; this module owns the package envelope and what happens
//! when one arrives. Delivery is asynchronous and unordered relative to
//! local mutations. Favorite-set packages replace the registry wholesale
//! (last writer wins at the set level), and match updates are merged with
//! the edition rule.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::db::MatchesDb;
use crate::error::{Error, Result};
use crate::favorites::FavoritesRegistry;
use crate::models::{Editioned, Match, MatchId, TeamId};
use crate::storage::KeyValueStorage;

/// What a package carries; decides how `content` deserializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageKind {
    TeamFavoritesUpdate,
    MatchFavoritesUpdate,
    ComplicationMatchUpdate,
}

/// Envelope delivered over the device-to-device transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub kind: PackageKind,
    pub content: serde_json::Value,
}

impl Package {
    pub fn pack<T: Serialize>(kind: PackageKind, content: &T) -> Result<Self> {
        Ok(Self {
            kind,
            content: serde_json::to_value(content)?,
        })
    }

    /// Decode the content for this package's kind.
    pub fn unpack<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.content.clone())
            .map_err(|error| Error::Decode(format!("{:?} content: {error}", self.kind)))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|error| Error::Decode(error.to_string()))
    }

    /// Phone-side outbound: the full favorite-teams set.
    pub fn team_favorites(ids: &BTreeSet<TeamId>) -> Result<Self> {
        Self::pack(PackageKind::TeamFavoritesUpdate, ids)
    }

    /// Phone-side outbound: the full favorite-matches set.
    pub fn match_favorites(ids: &BTreeSet<MatchId>) -> Result<Self> {
        Self::pack(PackageKind::MatchFavoritesUpdate, ids)
    }

    /// Phone-side outbound: a single updated match for the complication.
    pub fn complication_match_update(update: &Editioned<Match>) -> Result<Self> {
        Self::pack(PackageKind::ComplicationMatchUpdate, update)
    }
}

/// Companion-side package handler.
///
/// A malformed package is logged and dropped; it never takes the bridge
/// down, and partial application never happens (decode precedes apply).
pub struct WatchBridge<S> {
    favorite_teams: FavoritesRegistry<TeamId, S>,
    favorite_matches: FavoritesRegistry<MatchId, S>,
    matches_db: MatchesDb<S>,
}

impl<S: KeyValueStorage> WatchBridge<S> {
    pub fn new(
        favorite_teams: FavoritesRegistry<TeamId, S>,
        favorite_matches: FavoritesRegistry<MatchId, S>,
        matches_db: MatchesDb<S>,
    ) -> Self {
        Self {
            favorite_teams,
            favorite_matches,
            matches_db,
        }
    }

    /// Handle raw bytes off the transport.
    pub async fn receive_bytes(&self, bytes: &[u8]) {
        match Package::from_bytes(bytes) {
            Ok(package) => self.receive(package).await,
            Err(error) => {
                tracing::warn!(%error, "dropping undecodable package");
            }
        }
    }

    /// Handle one decoded envelope.
    pub async fn receive(&self, package: Package) {
        if let Err(error) = self.dispatch(&package).await {
            tracing::warn!(kind = ?package.kind, %error, "dropping package");
        }
    }

    async fn dispatch(&self, package: &Package) -> Result<()> {
        match package.kind {
            PackageKind::TeamFavoritesUpdate => {
                let ids: BTreeSet<TeamId> = package.unpack()?;
                tracing::debug!(count = ids.len(), "replacing favorite teams from phone");
                self.favorite_teams.replace(ids).await
            }
            PackageKind::MatchFavoritesUpdate => {
                let ids: BTreeSet<MatchId> = package.unpack()?;
                tracing::debug!(count = ids.len(), "replacing favorite matches from phone");
                self.favorite_matches.replace(ids).await
            }
            PackageKind::ComplicationMatchUpdate => {
                let update: Editioned<Match> = package.unpack()?;
                let merged = self.matches_db.apply(update).await?;
                tracing::debug!(merged, "complication match update");
                Ok(())
            }
        }
    }
}
