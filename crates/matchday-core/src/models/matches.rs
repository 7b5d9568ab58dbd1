//! Match reference data and watch-face selection rules.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use super::TeamId;

/// Conservative regulation-plus-stoppage window used when the server does
/// not report an explicit end time.
const MATCH_WINDOW_MINUTES: i64 = 120;

/// A stable server-assigned match identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub u64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MatchId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// One side of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTeam {
    pub id: TeamId,
    pub name: String,
    pub short_name: String,
}

/// Current score, absent before kickoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

/// A match as delivered by the content server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub home: MatchTeam,
    pub away: MatchTeam,
    pub kickoff: DateTime<Utc>,
    #[serde(default)]
    pub score: Option<Score>,
}

impl Match {
    pub fn is_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.kickoff
    }

    /// Approximate end of the viewing window for this match.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.kickoff + Duration::minutes(MATCH_WINDOW_MINUTES)
    }

    /// Whether the user cares about this match, given membership checks for
    /// the match-favorites and team-favorites sets.
    pub fn is_favorite(
        &self,
        is_favorite_match: impl Fn(MatchId) -> bool,
        is_favorite_team: impl Fn(TeamId) -> bool,
    ) -> bool {
        is_favorite_match(self.id) || is_favorite_team(self.home.id) || is_favorite_team(self.away.id)
    }

    /// Of two matches, the one whose window ends later.
    pub fn ends_later(lhs: Self, rhs: Self) -> Self {
        if rhs.end_time() > lhs.end_time() {
            rhs
        } else {
            lhs
        }
    }
}

/// Pick which of two matches the watch face should show: a favorite beats a
/// non-favorite, otherwise the match that ends later wins.
pub fn choose_match_to_show(
    lhs: Match,
    rhs: Match,
    is_favorite: impl Fn(&Match) -> bool,
) -> Match {
    match (is_favorite(&lhs), is_favorite(&rhs)) {
        (true, true) | (false, false) => Match::ends_later(lhs, rhs),
        (true, false) => lhs,
        (false, true) => rhs,
    }
}
