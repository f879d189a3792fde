//! Draft authoring use-case service.
//!
//! # Responsibility
//! - Create entries with their initial draft revision.
//! - Add, reconfigure, and delete components of a draft.
//!
//! # Invariants
//! - Only draft revisions are mutated; published revisions are frozen.
//! - Child type tags come from the registry declaration of the collection.
//! - Configuration payloads are JSON objects.
//! - Every new component gets a perma id from its entry's allocator scope.

use crate::db::{run_in_transaction, DbError};
use crate::duplication::allocator::{AllocationError, PermaIdAllocator, SqlitePermaIdAllocator};
use crate::duplication::registry::ComponentTypeRegistry;
use crate::model::component::{Component, ComponentId, NewComponent, ROOT_COLLECTION};
use crate::model::entry::{Entry, Revision, RevisionId, RevisionState};
use crate::repo::component_repo::{ComponentRepository, SqliteComponentRepository};
use crate::repo::entry_repo::{EntryRepository, SqliteEntryRepository};
use crate::repo::RepoError;
use rusqlite::Connection;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from draft authoring operations.
#[derive(Debug)]
pub enum AuthoringError {
    /// Entry title is blank after trim.
    InvalidTitle,
    RevisionNotFound(RevisionId),
    ComponentNotFound(ComponentId),
    /// Target revision is published.
    RevisionFrozen(RevisionId),
    /// Component type has no registry declaration.
    UndeclaredType(String),
    /// Parent type declares no collection with this name.
    UndeclaredCollection {
        component_type: String,
        collection: String,
    },
    /// Configuration is not a JSON object.
    InvalidConfiguration,
    Allocation(AllocationError),
    Repo(RepoError),
}

impl Display for AuthoringError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTitle => write!(f, "entry title must not be blank"),
            Self::RevisionNotFound(id) => write!(f, "revision not found: {id}"),
            Self::ComponentNotFound(id) => write!(f, "component not found: {id}"),
            Self::RevisionFrozen(id) => write!(f, "revision {id} is published and frozen"),
            Self::UndeclaredType(component_type) => {
                write!(f, "component type is not declared: {component_type}")
            }
            Self::UndeclaredCollection {
                component_type,
                collection,
            } => write!(
                f,
                "component type `{component_type}` declares no collection `{collection}`"
            ),
            Self::InvalidConfiguration => write!(f, "configuration must be a JSON object"),
            Self::Allocation(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AuthoringError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Allocation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for AuthoringError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::RevisionNotFound(id) => Self::RevisionNotFound(id),
            RepoError::ComponentNotFound(id) => Self::ComponentNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<AllocationError> for AuthoringError {
    fn from(value: AllocationError) -> Self {
        Self::Allocation(value)
    }
}

impl From<DbError> for AuthoringError {
    fn from(value: DbError) -> Self {
        Self::Repo(RepoError::Db(value))
    }
}

/// Draft authoring facade over one connection.
pub struct AuthoringService<'a> {
    conn: &'a Connection,
    registry: &'a ComponentTypeRegistry,
}

impl<'a> AuthoringService<'a> {
    pub fn new(conn: &'a Connection, registry: &'a ComponentTypeRegistry) -> Self {
        Self { conn, registry }
    }

    /// Creates one entry together with its first draft revision.
    pub fn create_entry(&self, title: &str) -> Result<(Entry, Revision), AuthoringError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AuthoringError::InvalidTitle);
        }
        run_in_transaction(self.conn, |tx| {
            let entries = SqliteEntryRepository::new(tx);
            let entry = entries.create_entry(title)?;
            let draft = entries.create_revision(entry.id, RevisionState::Draft)?;
            Ok((entry, draft))
        })
    }

    /// Appends one root component to a draft revision.
    pub fn add_root(
        &self,
        revision_id: RevisionId,
        component_type: &str,
        configuration: Value,
    ) -> Result<Component, AuthoringError> {
        ensure_object(&configuration)?;
        if !self.registry.is_declared(component_type) {
            return Err(AuthoringError::UndeclaredType(component_type.to_string()));
        }
        run_in_transaction(self.conn, |tx| {
            let revision = ensure_draft(&SqliteEntryRepository::new(tx), revision_id)?;
            let components = SqliteComponentRepository::new(tx);
            let perma_id = SqlitePermaIdAllocator::new(tx).allocate(revision.entry_id)?;
            let position = components.next_position(revision.id, None, ROOT_COLLECTION)?;
            let component = components.insert_component(&NewComponent {
                revision_id: revision.id,
                parent_id: None,
                collection: ROOT_COLLECTION.to_string(),
                component_type: component_type.to_string(),
                perma_id,
                position,
                configuration,
            })?;
            Ok(component)
        })
    }

    /// Appends one child to a declared collection of `parent_id`.
    pub fn add_child(
        &self,
        parent_id: ComponentId,
        collection: &str,
        configuration: Value,
    ) -> Result<Component, AuthoringError> {
        ensure_object(&configuration)?;
        run_in_transaction(self.conn, |tx| {
            let components = SqliteComponentRepository::new(tx);
            let parent = components
                .get_component(parent_id)?
                .ok_or(AuthoringError::ComponentNotFound(parent_id))?;
            let declared = self
                .registry
                .collection(&parent.component_type, collection)
                .ok_or_else(|| AuthoringError::UndeclaredCollection {
                    component_type: parent.component_type.clone(),
                    collection: collection.to_string(),
                })?;
            let revision = ensure_draft(&SqliteEntryRepository::new(tx), parent.revision_id)?;

            let perma_id = SqlitePermaIdAllocator::new(tx).allocate(revision.entry_id)?;
            let position = components.next_position(revision.id, Some(parent.id), collection)?;
            let component = components.insert_component(&NewComponent {
                revision_id: revision.id,
                parent_id: Some(parent.id),
                collection: collection.to_string(),
                component_type: declared.child_type.clone(),
                perma_id,
                position,
                configuration,
            })?;
            Ok(component)
        })
    }

    /// Replaces the configuration of one draft component.
    pub fn update_configuration(
        &self,
        component_id: ComponentId,
        configuration: Value,
    ) -> Result<Component, AuthoringError> {
        ensure_object(&configuration)?;
        run_in_transaction(self.conn, |tx| {
            let components = SqliteComponentRepository::new(tx);
            let mut component = components
                .get_component(component_id)?
                .ok_or(AuthoringError::ComponentNotFound(component_id))?;
            ensure_draft(&SqliteEntryRepository::new(tx), component.revision_id)?;
            components.update_configuration(component.id, &configuration)?;
            component.configuration = configuration;
            Ok(component)
        })
    }

    /// Deletes one draft component and its whole subtree.
    pub fn delete_component(&self, component_id: ComponentId) -> Result<(), AuthoringError> {
        run_in_transaction(self.conn, |tx| {
            let components = SqliteComponentRepository::new(tx);
            let component = components
                .get_component(component_id)?
                .ok_or(AuthoringError::ComponentNotFound(component_id))?;
            ensure_draft(&SqliteEntryRepository::new(tx), component.revision_id)?;
            components.delete_component(component.id)?;
            Ok(())
        })
    }
}

fn ensure_object(configuration: &Value) -> Result<(), AuthoringError> {
    if configuration.is_object() {
        Ok(())
    } else {
        Err(AuthoringError::InvalidConfiguration)
    }
}

fn ensure_draft<R: EntryRepository>(
    entries: &R,
    revision_id: RevisionId,
) -> Result<Revision, AuthoringError> {
    let revision = entries
        .get_revision(revision_id)?
        .ok_or(AuthoringError::RevisionNotFound(revision_id))?;
    if !revision.is_mutable() {
        return Err(AuthoringError::RevisionFrozen(revision_id));
    }
    Ok(revision)
}
