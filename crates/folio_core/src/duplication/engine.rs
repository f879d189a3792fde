//! Deep copy of component subtrees.
//!
//! # Responsibility
//! - Copy a component and every descendant reachable through the registry's
//!   declared collections, depth-first, persisting each node before its
//!   children.
//! - Resolve perma ids per policy, run the caller's hook, and rewrite
//!   intra-subtree references once the whole tree exists.
//!
//! # Invariants
//! - The engine never commits. Atomicity comes from the transaction the
//!   store and allocator are bound to; any `Err` must roll that back.
//! - A copy's parent link always points at the new copy of its parent.
//! - Children are visited in stored order and keep their positions.
//! - A source collection that changes while being copied is a conflict.

use crate::duplication::allocator::PermaIdAllocator;
use crate::duplication::error::{DuplicationError, DuplicationResult, HookFailure};
use crate::duplication::registry::ComponentTypeRegistry;
use crate::duplication::remap::ReferenceRemapper;
use crate::duplication::store::ComponentStore;
use crate::duplication::tree::{CollectionTree, ComponentTree};
use crate::model::component::{Component, ComponentId, NewComponent, PermaId, ROOT_COLLECTION};
use crate::model::entry::{EntryId, RevisionId};
use crate::repo::RepoError;
use log::{debug, error, info};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::time::Instant;
use uuid::Uuid;

/// Per-node customization callback: `(original, pending copy)`.
pub type NodeHook<'h> = dyn FnMut(&Component, &mut PendingCopy) -> Result<(), HookFailure> + 'h;

/// Where the top-level copy is placed. Descendants always follow their
/// copied parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicationTarget {
    /// Next to the source: same revision, parent, and collection, appended
    /// at the end of the collection.
    SameParent,
    /// As a root of another revision, appended after existing roots.
    RevisionRoot(RevisionId),
    /// Inside a named collection of another component, appended.
    Child {
        parent_id: ComponentId,
        collection: String,
    },
}

/// Options for one duplication call.
pub struct DuplicateOptions<'h> {
    reset_perma_ids: bool,
    target: DuplicationTarget,
    on_each_node: Option<Box<NodeHook<'h>>>,
}

impl<'h> DuplicateOptions<'h> {
    /// Copies perma ids verbatim.
    ///
    /// Precondition: no component with one of the copied perma ids exists or
    /// appears in the target revision before commit. Publishing into a fresh
    /// revision satisfies this; a collision surfaces as a persistence error
    /// from the `(revision_id, perma_id)` unique index.
    pub fn preserve_perma_ids() -> Self {
        Self {
            reset_perma_ids: false,
            target: DuplicationTarget::SameParent,
            on_each_node: None,
        }
    }

    /// Issues a fresh perma id for every copy from the target entry's scope.
    pub fn reset_perma_ids() -> Self {
        Self {
            reset_perma_ids: true,
            ..Self::preserve_perma_ids()
        }
    }

    pub fn with_target(mut self, target: DuplicationTarget) -> Self {
        self.target = target;
        self
    }

    /// Installs a hook run on every node after its perma id is resolved and
    /// before it is persisted. A hook error aborts the whole duplication.
    pub fn on_each_node<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&Component, &mut PendingCopy) -> Result<(), HookFailure> + 'h,
    {
        self.on_each_node = Some(Box::new(hook));
        self
    }

    pub fn resets_perma_ids(&self) -> bool {
        self.reset_perma_ids
    }

    pub fn target(&self) -> &DuplicationTarget {
        &self.target
    }
}

impl Debug for DuplicateOptions<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplicateOptions")
            .field("reset_perma_ids", &self.reset_perma_ids)
            .field("target", &self.target)
            .field("on_each_node", &self.on_each_node.is_some())
            .finish()
    }
}

/// Copy under construction, handed to the hook before persistence.
///
/// Structural links are read-only: re-parenting is the engine's job.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCopy {
    pub perma_id: PermaId,
    pub position: i64,
    pub configuration: Value,
    revision_id: RevisionId,
    parent_id: Option<ComponentId>,
    collection: String,
    component_type: String,
}

impl PendingCopy {
    pub fn revision_id(&self) -> RevisionId {
        self.revision_id
    }

    pub fn parent_id(&self) -> Option<ComponentId> {
        self.parent_id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn component_type(&self) -> &str {
        &self.component_type
    }

    fn into_new_component(self) -> NewComponent {
        NewComponent {
            revision_id: self.revision_id,
            parent_id: self.parent_id,
            collection: self.collection,
            component_type: self.component_type,
            perma_id: self.perma_id,
            position: self.position,
            configuration: self.configuration,
        }
    }
}

#[derive(Debug, Clone)]
struct Placement {
    revision_id: RevisionId,
    parent_id: Option<ComponentId>,
    collection: String,
    position: i64,
    scope: EntryId,
}

struct Run<'h> {
    id: Uuid,
    reset_perma_ids: bool,
    target: DuplicationTarget,
    hook: Option<Box<NodeHook<'h>>>,
    remapper: ReferenceRemapper,
    created: HashSet<ComponentId>,
    copied: usize,
}

/// Duplication engine bound to one registry snapshot, store, and allocator.
pub struct DuplicationEngine<'a, S: ?Sized, A: ?Sized> {
    registry: &'a ComponentTypeRegistry,
    store: &'a S,
    allocator: &'a A,
}

impl<'a, S, A> DuplicationEngine<'a, S, A>
where
    S: ComponentStore + ?Sized,
    A: PermaIdAllocator + ?Sized,
{
    pub fn new(registry: &'a ComponentTypeRegistry, store: &'a S, allocator: &'a A) -> Self {
        Self {
            registry,
            store,
            allocator,
        }
    }

    /// Deep-copies `source` and returns the persisted copy with its subtree.
    pub fn duplicate(
        &self,
        source: &Component,
        options: DuplicateOptions<'_>,
    ) -> DuplicationResult<ComponentTree> {
        self.execute(1, options, |run| {
            let mut tree = self.copy_root(source, run)?;
            self.rewrite_references(std::slice::from_mut(&mut tree), &run.remapper)?;
            Ok(tree)
        })
    }

    /// Deep-copies several roots as one run.
    ///
    /// All copies share one reference mapping, so a payload in one copied
    /// root that points into another copied root is rewritten too.
    pub fn duplicate_all(
        &self,
        sources: &[Component],
        options: DuplicateOptions<'_>,
    ) -> DuplicationResult<Vec<ComponentTree>> {
        self.execute(sources.len(), options, |run| {
            let mut trees = sources
                .iter()
                .map(|source| self.copy_root(source, run))
                .collect::<DuplicationResult<Vec<_>>>()?;
            self.rewrite_references(&mut trees, &run.remapper)?;
            Ok(trees)
        })
    }

    fn execute<'h, T, F>(
        &self,
        roots: usize,
        options: DuplicateOptions<'h>,
        body: F,
    ) -> DuplicationResult<T>
    where
        F: FnOnce(&mut Run<'h>) -> DuplicationResult<T>,
    {
        let started_at = Instant::now();
        let mut run = Run {
            id: Uuid::new_v4(),
            reset_perma_ids: options.reset_perma_ids,
            target: options.target,
            hook: options.on_each_node,
            remapper: ReferenceRemapper::new(),
            created: HashSet::new(),
            copied: 0,
        };
        let policy = if run.reset_perma_ids {
            "reset"
        } else {
            "preserve"
        };
        info!(
            "event=duplicate module=duplication status=start run_id={} roots={} policy={}",
            run.id, roots, policy
        );

        let result = body(&mut run);
        match &result {
            Ok(_) => info!(
                "event=duplicate module=duplication status=ok run_id={} roots={} policy={} nodes={} duration_ms={}",
                run.id,
                roots,
                policy,
                run.copied,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=duplicate module=duplication status=error run_id={} roots={} policy={} nodes_before_abort={} duration_ms={} error_code={} error={}",
                run.id,
                roots,
                policy,
                run.copied,
                started_at.elapsed().as_millis(),
                err.code(),
                err
            ),
        }
        result
    }

    fn copy_root(&self, source: &Component, run: &mut Run<'_>) -> DuplicationResult<ComponentTree> {
        let placement = self.resolve_placement(source, &run.target)?;
        self.copy_node(source, placement, run)
    }

    fn resolve_placement(
        &self,
        source: &Component,
        target: &DuplicationTarget,
    ) -> DuplicationResult<Placement> {
        let (revision_id, parent_id, collection) = match target {
            DuplicationTarget::SameParent => (
                source.revision_id,
                source.parent_id,
                source.collection.clone(),
            ),
            DuplicationTarget::RevisionRoot(revision_id) => {
                (*revision_id, None, ROOT_COLLECTION.to_string())
            }
            DuplicationTarget::Child {
                parent_id,
                collection,
            } => {
                let parent = self
                    .store
                    .component(*parent_id)
                    .map_err(persistence(source.id))?
                    .ok_or_else(|| {
                        persistence(source.id)(RepoError::ComponentNotFound(*parent_id))
                    })?;
                self.ensure_outside_source(source, &parent)?;
                (parent.revision_id, Some(parent.id), collection.clone())
            }
        };

        let position = self
            .store
            .next_position(revision_id, parent_id, &collection)
            .map_err(persistence(source.id))?;
        let scope = self
            .store
            .revision_scope(revision_id)
            .map_err(persistence(source.id))?;

        Ok(Placement {
            revision_id,
            parent_id,
            collection,
            position,
            scope,
        })
    }

    fn ensure_outside_source(&self, source: &Component, parent: &Component) -> DuplicationResult<()> {
        let mut cursor = Some(parent.clone());
        while let Some(node) = cursor {
            if node.id == source.id {
                return Err(DuplicationError::InvalidTarget {
                    component_id: source.id,
                    target_parent_id: parent.id,
                });
            }
            cursor = match node.parent_id {
                Some(parent_id) => self
                    .store
                    .component(parent_id)
                    .map_err(persistence(source.id))?,
                None => None,
            };
        }
        Ok(())
    }

    fn copy_node(
        &self,
        original: &Component,
        placement: Placement,
        run: &mut Run<'_>,
    ) -> DuplicationResult<ComponentTree> {
        let issued = if run.reset_perma_ids {
            Some(
                self.allocator
                    .allocate(placement.scope)
                    .map_err(allocation(original.id))?,
            )
        } else {
            None
        };

        let mut pending = PendingCopy {
            perma_id: issued.unwrap_or(original.perma_id),
            position: placement.position,
            configuration: original.configuration.clone(),
            revision_id: placement.revision_id,
            parent_id: placement.parent_id,
            collection: placement.collection,
            component_type: original.component_type.clone(),
        };
        if let Some(hook) = run.hook.as_deref_mut() {
            hook(original, &mut pending).map_err(|source| DuplicationError::Hook {
                component_id: original.id,
                source,
            })?;
        }

        let copy = self
            .store
            .insert(&pending.into_new_component())
            .map_err(persistence(original.id))?;
        if issued != Some(copy.perma_id) {
            self.allocator
                .reserve(placement.scope, copy.perma_id)
                .map_err(allocation(original.id))?;
        }
        run.remapper.record(original.perma_id, copy.perma_id);
        run.created.insert(copy.id);
        run.copied += 1;
        debug!(
            "event=duplicate_node module=duplication status=ok run_id={} source_id={} copy_id={} perma_id={} type={}",
            run.id, original.id, copy.id, copy.perma_id, copy.component_type
        );

        let mut collections = Vec::new();
        for declared in self.registry.lookup(&original.component_type) {
            let snapshot = self.read_children(original, &declared.name, run)?;
            let mut items = Vec::with_capacity(snapshot.len());
            for child in &snapshot {
                let child_placement = Placement {
                    revision_id: copy.revision_id,
                    parent_id: Some(copy.id),
                    collection: declared.name.clone(),
                    position: child.position,
                    scope: placement.scope,
                };
                items.push(self.copy_node(child, child_placement, run)?);
            }
            self.verify_unchanged(original, &declared.name, &snapshot)?;
            collections.push(CollectionTree {
                name: declared.name.clone(),
                items,
            });
        }

        Ok(ComponentTree {
            component: copy,
            collections,
        })
    }

    fn read_children(
        &self,
        original: &Component,
        collection: &str,
        run: &Run<'_>,
    ) -> DuplicationResult<Vec<Component>> {
        let children = self
            .store
            .children(original, collection)
            .map_err(persistence(original.id))?;
        if let Some(own_copy) = children.iter().find(|child| run.created.contains(&child.id)) {
            return Err(DuplicationError::Conflict {
                parent_id: original.id,
                collection: collection.to_string(),
                detail: format!("copy {} created by this run appeared in the source", own_copy.id),
            });
        }
        Ok(children)
    }

    fn verify_unchanged(
        &self,
        original: &Component,
        collection: &str,
        snapshot: &[Component],
    ) -> DuplicationResult<()> {
        let current = self
            .store
            .children(original, collection)
            .map_err(persistence(original.id))?;
        let expected = snapshot.iter().map(|child| child.id).collect::<Vec<_>>();
        let found = current.iter().map(|child| child.id).collect::<Vec<_>>();
        if expected != found {
            return Err(DuplicationError::Conflict {
                parent_id: original.id,
                collection: collection.to_string(),
                detail: format!("read children {expected:?}, now {found:?}"),
            });
        }
        Ok(())
    }

    fn rewrite_references(
        &self,
        trees: &mut [ComponentTree],
        remapper: &ReferenceRemapper,
    ) -> DuplicationResult<()> {
        if remapper.is_identity() {
            return Ok(());
        }
        for tree in trees {
            self.rewrite_tree(tree, remapper)?;
        }
        Ok(())
    }

    fn rewrite_tree(
        &self,
        tree: &mut ComponentTree,
        remapper: &ReferenceRemapper,
    ) -> DuplicationResult<()> {
        let component = &mut tree.component;
        let paths = self.registry.reference_paths(&component.component_type);
        if !paths.is_empty() && remapper.rewrite_in_place(paths, &mut component.configuration) > 0 {
            self.store
                .update_configuration(component.id, &component.configuration)
                .map_err(persistence(component.id))?;
        }
        for collection in &mut tree.collections {
            for item in &mut collection.items {
                self.rewrite_tree(item, remapper)?;
            }
        }
        Ok(())
    }
}

fn persistence(component_id: ComponentId) -> impl Fn(RepoError) -> DuplicationError {
    move |source| DuplicationError::Persistence {
        component_id,
        source,
    }
}

fn allocation(
    component_id: ComponentId,
) -> impl Fn(crate::duplication::allocator::AllocationError) -> DuplicationError {
    move |source| DuplicationError::Allocation {
        component_id,
        source,
    }
}
