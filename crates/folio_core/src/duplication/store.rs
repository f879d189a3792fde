//! Storage contract consumed by the duplication engine.
//!
//! The engine never opens transactions itself; the store it receives must be
//! bound to the transaction that wraps the whole run.

use crate::model::component::{Component, ComponentId, NewComponent};
use crate::model::entry::{EntryId, RevisionId};
use crate::repo::component_repo::{ComponentRepository, SqliteComponentRepository};
use crate::repo::RepoResult;
use serde_json::Value;

/// Minimal storage surface for deep copies.
pub trait ComponentStore {
    /// Persists one component; storage assigns the internal id.
    fn insert(&self, component: &NewComponent) -> RepoResult<Component>;
    /// Children of `parent` in one collection, in stored order.
    fn children(&self, parent: &Component, collection: &str) -> RepoResult<Vec<Component>>;
    fn component(&self, id: ComponentId) -> RepoResult<Option<Component>>;
    fn update_configuration(&self, id: ComponentId, configuration: &Value) -> RepoResult<()>;
    /// Identity scope (entry) of a revision.
    fn revision_scope(&self, revision_id: RevisionId) -> RepoResult<EntryId>;
    /// Position that appends to the end of a collection.
    fn next_position(
        &self,
        revision_id: RevisionId,
        parent_id: Option<ComponentId>,
        collection: &str,
    ) -> RepoResult<i64>;
}

impl ComponentStore for SqliteComponentRepository<'_> {
    fn insert(&self, component: &NewComponent) -> RepoResult<Component> {
        self.insert_component(component)
    }

    fn children(&self, parent: &Component, collection: &str) -> RepoResult<Vec<Component>> {
        self.list_children(parent.id, collection)
    }

    fn component(&self, id: ComponentId) -> RepoResult<Option<Component>> {
        self.get_component(id)
    }

    fn update_configuration(&self, id: ComponentId, configuration: &Value) -> RepoResult<()> {
        ComponentRepository::update_configuration(self, id, configuration)
    }

    fn revision_scope(&self, revision_id: RevisionId) -> RepoResult<EntryId> {
        self.revision_entry(revision_id)
    }

    fn next_position(
        &self,
        revision_id: RevisionId,
        parent_id: Option<ComponentId>,
        collection: &str,
    ) -> RepoResult<i64> {
        ComponentRepository::next_position(self, revision_id, parent_id, collection)
    }
}
