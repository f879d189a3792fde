//! Perma id allocation per identity scope.
//!
//! # Responsibility
//! - Issue perma ids that are strictly greater than any id ever issued (or
//!   reserved) in the same entry.
//!
//! # Invariants
//! - Counters only grow. Deleting components never frees an id.
//! - Serialization is per scope: the SQLite allocator relies on the write
//!   transaction holding the entry row, the in-memory allocator on one mutex
//!   per scope. Neither takes a process-wide lock around allocation.
//! - Gaps left by rolled-back transactions are fine; only uniqueness counts.

use crate::db::DbError;
use crate::model::component::PermaId;
use crate::model::entry::EntryId;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

pub type AllocationResult<T> = Result<T, AllocationError>;

/// Perma id allocation failures.
#[derive(Debug)]
pub enum AllocationError {
    /// The scope does not exist (never created or concurrently destroyed).
    ScopeNotFound(EntryId),
    /// The scope counter reached its maximum value.
    Exhausted(EntryId),
    Db(DbError),
}

impl Display for AllocationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScopeNotFound(scope) => write!(f, "perma id scope not found: entry {scope}"),
            Self::Exhausted(scope) => write!(f, "perma id scope exhausted: entry {scope}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AllocationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for AllocationError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Allocation context threaded through one duplication run.
pub trait PermaIdAllocator {
    /// Issues a fresh perma id in `scope`.
    fn allocate(&self, scope: EntryId) -> AllocationResult<PermaId>;

    /// Records that `perma_id` is in use in `scope` without issuing it, so
    /// later allocations stay above it. Used when ids are copied verbatim.
    fn reserve(&self, scope: EntryId, perma_id: PermaId) -> AllocationResult<()>;
}

/// Allocator backed by `entries.last_perma_id`.
///
/// Must run on the same connection/transaction as the inserts it feeds, so
/// a rollback voids the counter bump together with the rows.
pub struct SqlitePermaIdAllocator<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePermaIdAllocator<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Returns the last id issued or reserved in `scope`.
    pub fn last_issued(&self, scope: EntryId) -> AllocationResult<PermaId> {
        self.conn
            .query_row(
                "SELECT last_perma_id FROM entries WHERE id = ?1;",
                [scope],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(AllocationError::ScopeNotFound(scope))
    }
}

impl PermaIdAllocator for SqlitePermaIdAllocator<'_> {
    fn allocate(&self, scope: EntryId) -> AllocationResult<PermaId> {
        let issued: Option<PermaId> = self
            .conn
            .query_row(
                "UPDATE entries
                 SET last_perma_id = last_perma_id + 1
                 WHERE id = ?1
                   AND last_perma_id < ?2
                 RETURNING last_perma_id;",
                params![scope, PermaId::MAX],
                |row| row.get(0),
            )
            .optional()?;

        match issued {
            Some(perma_id) => Ok(perma_id),
            None => {
                // Distinguish a missing scope from a saturated counter.
                self.last_issued(scope)?;
                Err(AllocationError::Exhausted(scope))
            }
        }
    }

    fn reserve(&self, scope: EntryId, perma_id: PermaId) -> AllocationResult<()> {
        let changed = self.conn.execute(
            "UPDATE entries
             SET last_perma_id = MAX(last_perma_id, ?2)
             WHERE id = ?1;",
            params![scope, perma_id],
        )?;
        if changed == 0 {
            return Err(AllocationError::ScopeNotFound(scope));
        }
        Ok(())
    }
}

/// Process-local allocator with one counter and one lock per scope.
///
/// Scopes must be opened explicitly; allocating in an unknown or closed scope
/// fails with [`AllocationError::ScopeNotFound`].
#[derive(Debug, Default)]
pub struct InMemoryPermaIdAllocator {
    scopes: RwLock<HashMap<EntryId, Arc<Mutex<PermaId>>>>,
}

impl InMemoryPermaIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an allocator whose first id issued in `scope` is `first`.
    pub fn starting_at(scope: EntryId, first: PermaId) -> Self {
        let allocator = Self::new();
        allocator.open_scope(scope, first.saturating_sub(1).max(0));
        allocator
    }

    /// Opens `scope` with `last_issued` as its counter. Reopening an existing
    /// scope keeps the higher of both counters.
    pub fn open_scope(&self, scope: EntryId, last_issued: PermaId) {
        let mut scopes = self.scopes.write().unwrap_or_else(PoisonError::into_inner);
        let counter = scopes
            .entry(scope)
            .or_insert_with(|| Arc::new(Mutex::new(last_issued)));
        let mut value = counter.lock().unwrap_or_else(PoisonError::into_inner);
        *value = (*value).max(last_issued);
    }

    /// Destroys `scope`; later allocations in it fail.
    pub fn close_scope(&self, scope: EntryId) {
        self.scopes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&scope);
    }

    pub fn last_issued(&self, scope: EntryId) -> Option<PermaId> {
        let counter = self.counter(scope)?;
        let value = *counter.lock().unwrap_or_else(PoisonError::into_inner);
        Some(value)
    }

    fn counter(&self, scope: EntryId) -> Option<Arc<Mutex<PermaId>>> {
        self.scopes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&scope)
            .cloned()
    }
}

impl PermaIdAllocator for InMemoryPermaIdAllocator {
    fn allocate(&self, scope: EntryId) -> AllocationResult<PermaId> {
        let counter = self
            .counter(scope)
            .ok_or(AllocationError::ScopeNotFound(scope))?;
        let mut last = counter.lock().unwrap_or_else(PoisonError::into_inner);
        let next = last
            .checked_add(1)
            .ok_or(AllocationError::Exhausted(scope))?;
        *last = next;
        Ok(next)
    }

    fn reserve(&self, scope: EntryId, perma_id: PermaId) -> AllocationResult<()> {
        let counter = self
            .counter(scope)
            .ok_or(AllocationError::ScopeNotFound(scope))?;
        let mut last = counter.lock().unwrap_or_else(PoisonError::into_inner);
        *last = (*last).max(perma_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{AllocationError, InMemoryPermaIdAllocator, PermaIdAllocator};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starting_at_issues_consecutive_ids() {
        let allocator = InMemoryPermaIdAllocator::starting_at(7, 100);
        assert_eq!(allocator.allocate(7).expect("allocate"), 100);
        assert_eq!(allocator.allocate(7).expect("allocate"), 101);
        assert_eq!(allocator.last_issued(7), Some(101));
    }

    #[test]
    fn unknown_or_closed_scope_fails() {
        let allocator = InMemoryPermaIdAllocator::starting_at(1, 1);
        assert!(matches!(
            allocator.allocate(2),
            Err(AllocationError::ScopeNotFound(2))
        ));

        allocator.close_scope(1);
        assert!(matches!(
            allocator.allocate(1),
            Err(AllocationError::ScopeNotFound(1))
        ));
    }

    #[test]
    fn reserve_raises_counter_but_never_lowers_it() {
        let allocator = InMemoryPermaIdAllocator::starting_at(1, 1);
        allocator.reserve(1, 40).expect("reserve");
        allocator.reserve(1, 3).expect("reserve");
        assert_eq!(allocator.allocate(1).expect("allocate"), 41);
    }

    #[test]
    fn scopes_are_independent() {
        let allocator = InMemoryPermaIdAllocator::new();
        allocator.open_scope(1, 0);
        allocator.open_scope(2, 50);
        assert_eq!(allocator.allocate(1).expect("allocate"), 1);
        assert_eq!(allocator.allocate(2).expect("allocate"), 51);
    }

    #[test]
    fn concurrent_allocations_in_one_scope_are_unique() {
        let allocator = Arc::new(InMemoryPermaIdAllocator::starting_at(9, 1));
        let handles = (0..8)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                thread::spawn(move || {
                    (0..100)
                        .map(|_| allocator.allocate(9).expect("allocate"))
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("thread should not panic") {
                assert!(seen.insert(id), "perma id {id} issued twice");
            }
        }
        assert_eq!(seen.len(), 800);
        assert_eq!(allocator.last_issued(9), Some(800));
    }
}
