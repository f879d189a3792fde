//! Duplication failure taxonomy.
//!
//! Every variant aborts the enclosing transaction and reaches the caller
//! unchanged. Nothing here is retried.

use crate::db::DbError;
use crate::duplication::allocator::AllocationError;
use crate::model::component::ComponentId;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Error returned by a node customization hook.
pub type HookFailure = Box<dyn Error + Send + Sync + 'static>;

pub type DuplicationResult<T> = Result<T, DuplicationError>;

#[derive(Debug)]
pub enum DuplicationError {
    /// No perma id could be issued for the copy of `component_id`.
    Allocation {
        component_id: ComponentId,
        source: AllocationError,
    },
    /// Storage rejected a read or write while copying `component_id`.
    Persistence {
        component_id: ComponentId,
        source: RepoError,
    },
    /// The caller's hook failed for `component_id`.
    Hook {
        component_id: ComponentId,
        source: HookFailure,
    },
    /// The source subtree changed while it was being copied.
    Conflict {
        parent_id: ComponentId,
        collection: String,
        detail: String,
    },
    /// The copy would be placed inside the subtree being copied.
    InvalidTarget {
        component_id: ComponentId,
        target_parent_id: ComponentId,
    },
    /// The transaction wrapping the run could not begin or commit.
    Transaction(DbError),
}

impl DuplicationError {
    /// Stable machine-readable code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Allocation { .. } => "allocation_failed",
            Self::Persistence { .. } => "persistence_failed",
            Self::Hook { .. } => "hook_failed",
            Self::Conflict { .. } => "source_conflict",
            Self::InvalidTarget { .. } => "invalid_target",
            Self::Transaction(_) => "transaction_failed",
        }
    }
}

impl Display for DuplicationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allocation {
                component_id,
                source,
            } => write!(f, "perma id allocation failed for component {component_id}: {source}"),
            Self::Persistence {
                component_id,
                source,
            } => write!(f, "persisting copy of component {component_id} failed: {source}"),
            Self::Hook {
                component_id,
                source,
            } => write!(f, "duplication hook failed for component {component_id}: {source}"),
            Self::Conflict {
                parent_id,
                collection,
                detail,
            } => write!(
                f,
                "source collection `{collection}` of component {parent_id} changed during copy: {detail}"
            ),
            Self::InvalidTarget {
                component_id,
                target_parent_id,
            } => write!(
                f,
                "cannot copy component {component_id} into its own subtree (target parent {target_parent_id})"
            ),
            Self::Transaction(err) => write!(f, "duplication transaction failed: {err}"),
        }
    }
}

impl Error for DuplicationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Allocation { source, .. } => Some(source),
            Self::Persistence { source, .. } => Some(source),
            Self::Hook { source, .. } => Some(&**source),
            Self::Transaction(err) => Some(err),
            Self::Conflict { .. } | Self::InvalidTarget { .. } => None,
        }
    }
}

impl From<DbError> for DuplicationError {
    fn from(value: DbError) -> Self {
        Self::Transaction(value)
    }
}
