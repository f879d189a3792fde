//! Component repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist component nodes and their JSON configuration payloads.
//! - Keep SQL details and sibling ordering inside the repository boundary.
//!
//! # Invariants
//! - Child listing is deterministic: `position ASC, id ASC`.
//! - A child always lives in its parent's revision (enforced by trigger).
//! - Deleting a component cascades to its whole subtree.

use crate::model::component::{Component, ComponentId, NewComponent, PermaId};
use crate::model::entry::{EntryId, RevisionId};
use crate::repo::{ensure_connection_ready, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

const COMPONENT_SELECT_SQL: &str = "SELECT
    id,
    revision_id,
    parent_id,
    collection,
    component_type,
    perma_id,
    position,
    configuration
FROM components";

/// Repository interface for component persistence.
pub trait ComponentRepository {
    /// Inserts one component and returns it with its storage-assigned id.
    fn insert_component(&self, component: &NewComponent) -> RepoResult<Component>;
    fn get_component(&self, id: ComponentId) -> RepoResult<Option<Component>>;
    /// Finds a component by perma id within one revision.
    fn find_by_perma_id(
        &self,
        revision_id: RevisionId,
        perma_id: PermaId,
    ) -> RepoResult<Option<Component>>;
    /// Lists one named child collection of a parent, in stored order.
    fn list_children(&self, parent_id: ComponentId, collection: &str)
        -> RepoResult<Vec<Component>>;
    /// Lists root components of a revision, in stored order.
    fn list_roots(&self, revision_id: RevisionId) -> RepoResult<Vec<Component>>;
    /// Returns the position that appends to the end of one collection.
    fn next_position(
        &self,
        revision_id: RevisionId,
        parent_id: Option<ComponentId>,
        collection: &str,
    ) -> RepoResult<i64>;
    fn update_configuration(&self, id: ComponentId, configuration: &Value) -> RepoResult<()>;
    /// Deletes one component and its subtree.
    fn delete_component(&self, id: ComponentId) -> RepoResult<()>;
    /// Entry that owns a revision; the identity scope of its components.
    fn revision_entry(&self, revision_id: RevisionId) -> RepoResult<EntryId>;
    /// Total persisted component count.
    fn count_components(&self) -> RepoResult<i64>;
    fn count_in_revision(&self, revision_id: RevisionId) -> RepoResult<i64>;
}

/// SQLite-backed component repository.
pub struct SqliteComponentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteComponentRepository<'conn> {
    /// Creates a repository without schema checks. Used inside transactions
    /// on connections opened through `db::open_*`.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Creates a repository from a connection verified to be fully migrated.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn query_components(
        &self,
        sql: &str,
        bind: impl rusqlite::Params,
    ) -> RepoResult<Vec<Component>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(bind)?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_component_row(row)?);
        }
        Ok(items)
    }
}

impl ComponentRepository for SqliteComponentRepository<'_> {
    fn insert_component(&self, component: &NewComponent) -> RepoResult<Component> {
        let configuration = serde_json::to_string(&component.configuration).map_err(|err| {
            RepoError::InvalidData(format!("configuration is not serializable: {err}"))
        })?;

        self.conn.execute(
            "INSERT INTO components (
                revision_id,
                parent_id,
                collection,
                component_type,
                perma_id,
                position,
                configuration
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                component.revision_id,
                component.parent_id,
                component.collection.as_str(),
                component.component_type.as_str(),
                component.perma_id,
                component.position,
                configuration,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        self.get_component(id)?
            .ok_or(RepoError::ComponentNotFound(id))
    }

    fn get_component(&self, id: ComponentId) -> RepoResult<Option<Component>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{COMPONENT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_component_row(row)?));
        }
        Ok(None)
    }

    fn find_by_perma_id(
        &self,
        revision_id: RevisionId,
        perma_id: PermaId,
    ) -> RepoResult<Option<Component>> {
        let mut stmt = self.conn.prepare(&format!(
            "{COMPONENT_SELECT_SQL}
             WHERE revision_id = ?1
               AND perma_id = ?2;"
        ))?;
        let mut rows = stmt.query(params![revision_id, perma_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_component_row(row)?));
        }
        Ok(None)
    }

    fn list_children(
        &self,
        parent_id: ComponentId,
        collection: &str,
    ) -> RepoResult<Vec<Component>> {
        self.query_components(
            &format!(
                "{COMPONENT_SELECT_SQL}
                 WHERE parent_id = ?1
                   AND collection = ?2
                 ORDER BY position ASC, id ASC;"
            ),
            params![parent_id, collection],
        )
    }

    fn list_roots(&self, revision_id: RevisionId) -> RepoResult<Vec<Component>> {
        self.query_components(
            &format!(
                "{COMPONENT_SELECT_SQL}
                 WHERE revision_id = ?1
                   AND parent_id IS NULL
                 ORDER BY position ASC, id ASC;"
            ),
            [revision_id],
        )
    }

    fn next_position(
        &self,
        revision_id: RevisionId,
        parent_id: Option<ComponentId>,
        collection: &str,
    ) -> RepoResult<i64> {
        let next = if let Some(parent_id) = parent_id {
            self.conn.query_row(
                "SELECT COALESCE(MAX(position), -1) + 1
                 FROM components
                 WHERE parent_id = ?1
                   AND collection = ?2;",
                params![parent_id, collection],
                |row| row.get(0),
            )?
        } else {
            self.conn.query_row(
                "SELECT COALESCE(MAX(position), -1) + 1
                 FROM components
                 WHERE revision_id = ?1
                   AND parent_id IS NULL;",
                [revision_id],
                |row| row.get(0),
            )?
        };
        Ok(next)
    }

    fn update_configuration(&self, id: ComponentId, configuration: &Value) -> RepoResult<()> {
        let configuration = serde_json::to_string(configuration).map_err(|err| {
            RepoError::InvalidData(format!("configuration is not serializable: {err}"))
        })?;
        let changed = self.conn.execute(
            "UPDATE components
             SET configuration = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id, configuration],
        )?;
        if changed == 0 {
            return Err(RepoError::ComponentNotFound(id));
        }
        Ok(())
    }

    fn delete_component(&self, id: ComponentId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM components WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::ComponentNotFound(id));
        }
        Ok(())
    }

    fn revision_entry(&self, revision_id: RevisionId) -> RepoResult<EntryId> {
        self.conn
            .query_row(
                "SELECT entry_id FROM revisions WHERE id = ?1;",
                [revision_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(RepoError::RevisionNotFound(revision_id))
    }

    fn count_components(&self) -> RepoResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM components;", [], |row| row.get(0))?;
        Ok(count)
    }

    fn count_in_revision(&self, revision_id: RevisionId) -> RepoResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM components WHERE revision_id = ?1;",
            [revision_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn parse_component_row(row: &Row<'_>) -> RepoResult<Component> {
    let id: ComponentId = row.get("id")?;
    let configuration_text: String = row.get("configuration")?;
    let configuration = serde_json::from_str::<Value>(&configuration_text).map_err(|err| {
        RepoError::InvalidData(format!(
            "invalid configuration json for component {id} in components.configuration: {err}"
        ))
    })?;

    Ok(Component {
        id,
        revision_id: row.get("revision_id")?,
        parent_id: row.get("parent_id")?,
        collection: row.get("collection")?,
        component_type: row.get("component_type")?,
        perma_id: row.get("perma_id")?,
        position: row.get("position")?,
        configuration,
    })
}
