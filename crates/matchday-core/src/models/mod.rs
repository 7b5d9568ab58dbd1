//! Shared data models.

mod editioned;
mod matches;
mod team;

pub use editioned::{Editioned, UNVERSIONED_EDITION};
pub use matches::{choose_match_to_show, Match, MatchId, MatchTeam, Score};
pub use team::{Team, TeamId};
