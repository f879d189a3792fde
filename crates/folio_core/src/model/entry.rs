//! Entry and revision records.
//!
//! # Invariants
//! - An entry is the identity scope for perma ids.
//! - Published revisions are frozen once their copy has been committed.

use serde::{Deserialize, Serialize};

/// Storage-assigned entry id.
pub type EntryId = i64;

/// Storage-assigned revision id.
pub type RevisionId = i64;

/// Top-level authored item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub title: String,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
}

/// Lifecycle state of one revision snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionState {
    /// Editable working copy.
    Draft,
    /// Immutable snapshot produced by publishing a draft.
    Published,
}

impl RevisionState {
    /// Returns whether authoring operations may mutate this revision.
    pub fn is_mutable(self) -> bool {
        matches!(self, Self::Draft)
    }

    pub(crate) fn as_db(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }

    pub(crate) fn from_db(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            _ => None,
        }
    }
}

/// One versioned snapshot of an entry's component forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub id: RevisionId,
    pub entry_id: EntryId,
    pub state: RevisionState,
    /// Epoch ms, set only for published revisions.
    pub published_at: Option<i64>,
    pub created_at: i64,
}

impl Revision {
    pub fn is_mutable(&self) -> bool {
        self.state.is_mutable()
    }
}
