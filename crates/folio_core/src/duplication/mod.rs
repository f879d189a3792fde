//! Duplication engine for revisioned component trees.
//!
//! # Responsibility
//! - Deep-copy component subtrees across revisions and entries.
//! - Keep perma id allocation, type metadata, and reference rewriting as
//!   separately testable parts threaded explicitly through each run.
//!
//! # Invariants
//! - One run executes inside one caller-provided transaction.
//! - The registry snapshot is read-only for the whole run.

pub mod allocator;
pub mod engine;
pub mod error;
pub mod registry;
pub mod remap;
pub mod store;
pub mod tree;

pub use allocator::{
    AllocationError, AllocationResult, InMemoryPermaIdAllocator, PermaIdAllocator,
    SqlitePermaIdAllocator,
};
pub use engine::{DuplicateOptions, DuplicationEngine, DuplicationTarget, NodeHook, PendingCopy};
pub use error::{DuplicationError, DuplicationResult, HookFailure};
pub use registry::{ChildCollection, ComponentTypeRegistry, RegistryError, RegistryResult};
pub use remap::{ReferencePath, ReferenceRemapper};
pub use store::ComponentStore;
pub use tree::{load_tree, CollectionTree, ComponentTree};
