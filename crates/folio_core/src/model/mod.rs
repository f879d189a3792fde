//! Domain model for entries, revisions, and their component trees.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//!
//! # Invariants
//! - Internal ids (`ComponentId`) are storage-assigned and never reused.
//! - Perma ids (`PermaId`) are unique within one entry's identity scope.
//! - Every component has exactly one owner: a parent component or, for
//!   roots, its revision.

pub mod component;
pub mod entry;
