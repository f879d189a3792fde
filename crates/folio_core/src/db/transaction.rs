//! Transaction boundary for multi-statement core operations.
//!
//! # Responsibility
//! - Run one closure inside one `BEGIN IMMEDIATE` transaction.
//! - Commit only when the closure succeeds.
//!
//! # Invariants
//! - Any `Err` from the closure leaves zero rows of its work behind; rollback
//!   happens when the `Transaction` guard drops.
//! - `IMMEDIATE` takes the database write lock up front, so concurrent writers
//!   on other connections queue behind the busy timeout instead of
//!   interleaving with a half-built tree.
//! - Boundaries do not nest: calling this on a connection that is already
//!   inside a transaction fails with a SQLite error.

use super::DbError;
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Executes `operation` atomically against `conn`.
///
/// The closure receives the open transaction; it derefs to `Connection`, so
/// repositories are constructed from it directly.
pub fn run_in_transaction<T, E, F>(conn: &Connection, operation: F) -> Result<T, E>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    E: From<DbError>,
{
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(|err| E::from(DbError::Sqlite(err)))?;

    let value = operation(&tx)?;

    tx.commit().map_err(|err| E::from(DbError::Sqlite(err)))?;
    Ok(value)
}
