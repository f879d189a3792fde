//! Publication and copy workflows built on the duplication engine.
//!
//! # Responsibility
//! - Publish a draft into a new frozen revision with perma ids preserved.
//! - Copy an entry into a new entry with fresh perma ids.
//! - Duplicate one component subtree within or across drafts.
//!
//! # Invariants
//! - Each workflow is one transaction: a failure leaves no partial rows.
//! - Copies never land in a published revision, except the revision a
//!   publish creates.

use crate::db::{run_in_transaction, DbError};
use crate::duplication::allocator::SqlitePermaIdAllocator;
use crate::duplication::engine::{DuplicateOptions, DuplicationEngine, DuplicationTarget};
use crate::duplication::error::DuplicationError;
use crate::duplication::registry::ComponentTypeRegistry;
use crate::duplication::tree::ComponentTree;
use crate::model::component::ComponentId;
use crate::model::entry::{Entry, EntryId, Revision, RevisionId, RevisionState};
use crate::repo::component_repo::{ComponentRepository, SqliteComponentRepository};
use crate::repo::entry_repo::{EntryRepository, SqliteEntryRepository};
use crate::repo::RepoError;
use log::{error, info};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Errors from publication workflows.
#[derive(Debug)]
pub enum PublicationError {
    /// Entry title is blank after trim.
    InvalidTitle,
    EntryNotFound(EntryId),
    /// Entry has no draft to publish or copy from.
    NoDraftRevision(EntryId),
    RevisionNotFound(RevisionId),
    ComponentNotFound(ComponentId),
    /// Copy target revision is published.
    RevisionFrozen(RevisionId),
    Duplication(DuplicationError),
    Repo(RepoError),
}

impl PublicationError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidTitle => "invalid_title",
            Self::EntryNotFound(_) => "entry_not_found",
            Self::NoDraftRevision(_) => "no_draft_revision",
            Self::RevisionNotFound(_) => "revision_not_found",
            Self::ComponentNotFound(_) => "component_not_found",
            Self::RevisionFrozen(_) => "revision_frozen",
            Self::Duplication(err) => err.code(),
            Self::Repo(_) => "repo_error",
        }
    }
}

impl Display for PublicationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTitle => write!(f, "entry title must not be blank"),
            Self::EntryNotFound(id) => write!(f, "entry not found: {id}"),
            Self::NoDraftRevision(id) => write!(f, "entry {id} has no draft revision"),
            Self::RevisionNotFound(id) => write!(f, "revision not found: {id}"),
            Self::ComponentNotFound(id) => write!(f, "component not found: {id}"),
            Self::RevisionFrozen(id) => write!(f, "revision {id} is published and frozen"),
            Self::Duplication(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for PublicationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Duplication(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for PublicationError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::EntryNotFound(id) => Self::EntryNotFound(id),
            RepoError::RevisionNotFound(id) => Self::RevisionNotFound(id),
            RepoError::ComponentNotFound(id) => Self::ComponentNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<DuplicationError> for PublicationError {
    fn from(value: DuplicationError) -> Self {
        Self::Duplication(value)
    }
}

impl From<DbError> for PublicationError {
    fn from(value: DbError) -> Self {
        Self::Repo(RepoError::Db(value))
    }
}

/// Publish, copy, and duplicate workflows over one connection.
pub struct PublicationService<'a> {
    conn: &'a Connection,
    registry: &'a ComponentTypeRegistry,
}

impl<'a> PublicationService<'a> {
    pub fn new(conn: &'a Connection, registry: &'a ComponentTypeRegistry) -> Self {
        Self { conn, registry }
    }

    /// Freezes the current draft of `entry_id` into a new published revision.
    ///
    /// The draft stays in place and remains editable. Published components
    /// keep the draft's perma ids, so external links resolve in both.
    pub fn publish(&self, entry_id: EntryId) -> Result<Revision, PublicationError> {
        let started_at = Instant::now();
        let result = run_in_transaction(self.conn, |tx| {
            let entries = SqliteEntryRepository::new(tx);
            let draft = self.require_draft(&entries, entry_id)?;
            let published = entries.create_revision(entry_id, RevisionState::Published)?;

            let components = SqliteComponentRepository::new(tx);
            let allocator = SqlitePermaIdAllocator::new(tx);
            let roots = components.list_roots(draft.id)?;
            DuplicationEngine::new(self.registry, &components, &allocator).duplicate_all(
                &roots,
                DuplicateOptions::preserve_perma_ids()
                    .with_target(DuplicationTarget::RevisionRoot(published.id)),
            )?;
            Ok(published)
        });
        log_publication("publish", entry_id, started_at, &result);
        result
    }

    /// Copies the current draft of `source_entry_id` into a new entry.
    ///
    /// The copy gets fresh perma ids from the new entry's scope, and
    /// references inside the copied trees follow the new ids.
    pub fn copy_entry(
        &self,
        source_entry_id: EntryId,
        title: &str,
    ) -> Result<(Entry, Revision), PublicationError> {
        let started_at = Instant::now();
        let title = title.trim();
        let result = if title.is_empty() {
            Err(PublicationError::InvalidTitle)
        } else {
            run_in_transaction(self.conn, |tx| {
                let entries = SqliteEntryRepository::new(tx);
                let source_draft = self.require_draft(&entries, source_entry_id)?;
                let entry = entries.create_entry(title)?;
                let draft = entries.create_revision(entry.id, RevisionState::Draft)?;

                let components = SqliteComponentRepository::new(tx);
                let allocator = SqlitePermaIdAllocator::new(tx);
                let roots = components.list_roots(source_draft.id)?;
                DuplicationEngine::new(self.registry, &components, &allocator).duplicate_all(
                    &roots,
                    DuplicateOptions::reset_perma_ids()
                        .with_target(DuplicationTarget::RevisionRoot(draft.id)),
                )?;
                Ok((entry, draft))
            })
        };
        log_publication("copy_entry", source_entry_id, started_at, &result);
        result
    }

    /// Duplicates one component subtree as one transaction.
    ///
    /// The revision the copy lands in must be a draft.
    pub fn duplicate_component(
        &self,
        component_id: ComponentId,
        options: DuplicateOptions<'_>,
    ) -> Result<ComponentTree, PublicationError> {
        run_in_transaction(self.conn, |tx| {
            let components = SqliteComponentRepository::new(tx);
            let source = components
                .get_component(component_id)?
                .ok_or(PublicationError::ComponentNotFound(component_id))?;
            let target_revision_id = match options.target() {
                DuplicationTarget::SameParent => source.revision_id,
                DuplicationTarget::RevisionRoot(revision_id) => *revision_id,
                DuplicationTarget::Child { parent_id, .. } => {
                    components
                        .get_component(*parent_id)?
                        .ok_or(PublicationError::ComponentNotFound(*parent_id))?
                        .revision_id
                }
            };
            let target_revision = SqliteEntryRepository::new(tx)
                .get_revision(target_revision_id)?
                .ok_or(PublicationError::RevisionNotFound(target_revision_id))?;
            if !target_revision.is_mutable() {
                return Err(PublicationError::RevisionFrozen(target_revision_id));
            }

            let allocator = SqlitePermaIdAllocator::new(tx);
            let tree = DuplicationEngine::new(self.registry, &components, &allocator)
                .duplicate(&source, options)?;
            Ok(tree)
        })
    }

    fn require_draft<R: EntryRepository>(
        &self,
        entries: &R,
        entry_id: EntryId,
    ) -> Result<Revision, PublicationError> {
        entries
            .get_entry(entry_id)?
            .ok_or(PublicationError::EntryNotFound(entry_id))?;
        entries
            .draft_revision(entry_id)?
            .ok_or(PublicationError::NoDraftRevision(entry_id))
    }
}

fn log_publication<T>(
    event: &str,
    entry_id: EntryId,
    started_at: Instant,
    result: &Result<T, PublicationError>,
) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(_) => info!(
            "event={event} module=publication status=ok entry_id={entry_id} duration_ms={duration_ms}"
        ),
        Err(err) => error!(
            "event={event} module=publication status=error entry_id={entry_id} duration_ms={duration_ms} error_code={} error={err}",
            err.code()
        ),
    }
}
