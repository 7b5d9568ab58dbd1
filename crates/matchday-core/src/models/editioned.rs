//! Edition-stamped values for last-writer-wins conflict resolution.

use serde::{Deserialize, Serialize};

/// Edition `-1` marks a value that was produced without a server-assigned
/// version and always wins against any versioned value.
pub const UNVERSIONED_EDITION: i64 = -1;

/// A payload paired with a monotonic edition counter.
///
/// Editions decide which of two copies of the same entity is kept when state
/// arrives from more than one source (local store vs. paired device). There
/// is no total order: equal editions are never "more recent" either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Editioned<T> {
    pub edition: i64,
    pub content: T,
}

impl<T> Editioned<T> {
    pub const fn new(edition: i64, content: T) -> Self {
        Self { edition, content }
    }

    /// Wrap a value with the unversioned sentinel edition.
    pub const fn unversioned(content: T) -> Self {
        Self::new(UNVERSIONED_EDITION, content)
    }

    /// Whether this copy should overwrite `other`.
    ///
    /// True iff this edition is the `-1` sentinel while the other is not,
    /// or this edition is strictly greater. Equal editions resolve to
    /// `false` for both operands.
    #[must_use]
    pub fn is_more_recent_than<U>(&self, other: &Editioned<U>) -> bool {
        if self.edition == UNVERSIONED_EDITION && other.edition != UNVERSIONED_EDITION {
            return true;
        }
        self.edition > other.edition
    }
}
