//! Entry and revision repository contracts and SQLite implementation.
//!
//! # Invariants
//! - Deleting an entry cascades to its revisions, components, and perma id
//!   counter; the counter row is the `entries` row itself.
//! - `draft_revision` returns the newest draft when several exist.

use crate::model::entry::{Entry, EntryId, Revision, RevisionId, RevisionState};
use crate::repo::{ensure_connection_ready, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const REVISION_SELECT_SQL: &str = "SELECT
    id,
    entry_id,
    state,
    published_at,
    created_at
FROM revisions";

/// Repository interface for entries and their revisions.
pub trait EntryRepository {
    fn create_entry(&self, title: &str) -> RepoResult<Entry>;
    fn get_entry(&self, id: EntryId) -> RepoResult<Option<Entry>>;
    /// Deletes one entry and, by cascade, everything it owns.
    fn delete_entry(&self, id: EntryId) -> RepoResult<()>;
    fn create_revision(&self, entry_id: EntryId, state: RevisionState) -> RepoResult<Revision>;
    fn get_revision(&self, id: RevisionId) -> RepoResult<Option<Revision>>;
    /// Newest draft revision of one entry.
    fn draft_revision(&self, entry_id: EntryId) -> RepoResult<Option<Revision>>;
    /// All revisions of one entry, oldest first.
    fn list_revisions(&self, entry_id: EntryId) -> RepoResult<Vec<Revision>>;
    fn delete_revision(&self, id: RevisionId) -> RepoResult<()>;
}

/// SQLite-backed entry repository.
pub struct SqliteEntryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEntryRepository<'conn> {
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
}

impl EntryRepository for SqliteEntryRepository<'_> {
    fn create_entry(&self, title: &str) -> RepoResult<Entry> {
        self.conn
            .execute("INSERT INTO entries (title) VALUES (?1);", [title])?;
        let id = self.conn.last_insert_rowid();
        self.get_entry(id)?.ok_or(RepoError::EntryNotFound(id))
    }

    fn get_entry(&self, id: EntryId) -> RepoResult<Option<Entry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT id, title, created_at
                 FROM entries
                 WHERE id = ?1;",
                [id],
                |row| {
                    Ok(Entry {
                        id: row.get("id")?,
                        title: row.get("title")?,
                        created_at: row.get("created_at")?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    fn delete_entry(&self, id: EntryId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM entries WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::EntryNotFound(id));
        }
        Ok(())
    }

    fn create_revision(&self, entry_id: EntryId, state: RevisionState) -> RepoResult<Revision> {
        if self.get_entry(entry_id)?.is_none() {
            return Err(RepoError::EntryNotFound(entry_id));
        }

        self.conn.execute(
            "INSERT INTO revisions (entry_id, state, published_at)
             VALUES (
                ?1,
                ?2,
                CASE WHEN ?2 = 'published' THEN (strftime('%s', 'now') * 1000) END
             );",
            params![entry_id, state.as_db()],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_revision(id)?.ok_or(RepoError::RevisionNotFound(id))
    }

    fn get_revision(&self, id: RevisionId) -> RepoResult<Option<Revision>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{REVISION_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_revision_row(row)?));
        }
        Ok(None)
    }

    fn draft_revision(&self, entry_id: EntryId) -> RepoResult<Option<Revision>> {
        let mut stmt = self.conn.prepare(&format!(
            "{REVISION_SELECT_SQL}
             WHERE entry_id = ?1
               AND state = 'draft'
             ORDER BY id DESC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query([entry_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_revision_row(row)?));
        }
        Ok(None)
    }

    fn list_revisions(&self, entry_id: EntryId) -> RepoResult<Vec<Revision>> {
        let mut stmt = self.conn.prepare(&format!(
            "{REVISION_SELECT_SQL}
             WHERE entry_id = ?1
             ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([entry_id])?;
        let mut revisions = Vec::new();
        while let Some(row) = rows.next()? {
            revisions.push(parse_revision_row(row)?);
        }
        Ok(revisions)
    }

    fn delete_revision(&self, id: RevisionId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM revisions WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::RevisionNotFound(id));
        }
        Ok(())
    }
}

fn parse_revision_row(row: &Row<'_>) -> RepoResult<Revision> {
    let state_text: String = row.get("state")?;
    let state = RevisionState::from_db(&state_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid revision state `{state_text}` in revisions.state"
        ))
    })?;

    Ok(Revision {
        id: row.get("id")?,
        entry_id: row.get("entry_id")?,
        state,
        published_at: row.get("published_at")?,
        created_at: row.get("created_at")?,
    })
}
