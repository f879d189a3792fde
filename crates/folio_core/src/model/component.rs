//! Component records: persisted nodes and not-yet-persisted copies.
//!
//! # Responsibility
//! - Carry the two identities of a node: the internal `id` and the `perma_id`.
//! - Carry the opaque JSON configuration payload.
//!
//! # Invariants
//! - `parent_id = None` means the component is a root of its revision and
//!   lives in the [`ROOT_COLLECTION`].
//! - Siblings are ordered by `position ASC, id ASC`.

use crate::model::entry::RevisionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Storage-assigned internal id. Globally unique, never reused.
pub type ComponentId = i64;

/// Stable, externally addressable id, unique within one entry.
pub type PermaId = i64;

/// Collection name used for the root components of a revision.
pub const ROOT_COLLECTION: &str = "roots";

/// Persisted component node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub revision_id: RevisionId,
    /// Owning component. `None` for revision roots.
    pub parent_id: Option<ComponentId>,
    /// Name of the parent's child collection this node belongs to.
    pub collection: String,
    /// Type tag looked up in the component type registry.
    pub component_type: String,
    pub perma_id: PermaId,
    pub position: i64,
    /// Opaque key/value payload. May embed perma id references.
    pub configuration: Value,
}

impl Component {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Component record ready for insertion; storage assigns the internal id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewComponent {
    pub revision_id: RevisionId,
    pub parent_id: Option<ComponentId>,
    pub collection: String,
    pub component_type: String,
    pub perma_id: PermaId,
    pub position: i64,
    pub configuration: Value,
}
