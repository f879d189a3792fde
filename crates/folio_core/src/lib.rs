//! Core domain logic for Folio.
//! Revisioned component trees and their transactional duplication engine.

pub mod config;
pub mod db;
pub mod duplication;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, open_db_with_timeout, run_in_transaction, DbError};
pub use duplication::{
    ComponentStore, ComponentTree, ComponentTypeRegistry, DuplicateOptions, DuplicationEngine,
    DuplicationError, DuplicationTarget, InMemoryPermaIdAllocator, PendingCopy, PermaIdAllocator,
    SqlitePermaIdAllocator,
};
pub use logging::{default_log_level, init_from_config};
pub use model::component::{Component, ComponentId, PermaId};
pub use model::entry::{Entry, EntryId, Revision, RevisionId, RevisionState};
pub use repo::{RepoError, RepoResult};
pub use rusqlite::Connection;
pub use service::authoring_service::{AuthoringError, AuthoringService};
pub use service::publication_service::{PublicationError, PublicationService};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
