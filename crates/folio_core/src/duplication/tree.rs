//! Materialized component subtrees.

use crate::duplication::registry::ComponentTypeRegistry;
use crate::duplication::store::ComponentStore;
use crate::model::component::Component;
use crate::repo::RepoResult;

/// One component plus its declared child collections.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentTree {
    pub component: Component,
    /// One entry per declared collection, in declaration order. Empty
    /// collections are kept so two trees can be compared shape for shape.
    pub collections: Vec<CollectionTree>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionTree {
    pub name: String,
    pub items: Vec<ComponentTree>,
}

impl ComponentTree {
    /// Number of components in this subtree, root included.
    pub fn node_count(&self) -> usize {
        1 + self
            .collections
            .iter()
            .flat_map(|collection| collection.items.iter())
            .map(ComponentTree::node_count)
            .sum::<usize>()
    }

    /// Components in depth-first pre-order.
    pub fn components(&self) -> Vec<&Component> {
        let mut out = Vec::with_capacity(self.node_count());
        self.collect_preorder(&mut out);
        out
    }

    /// Items of one named collection, empty when absent.
    pub fn collection(&self, name: &str) -> &[ComponentTree] {
        self.collections
            .iter()
            .find(|collection| collection.name == name)
            .map(|collection| collection.items.as_slice())
            .unwrap_or(&[])
    }

    fn collect_preorder<'a>(&'a self, out: &mut Vec<&'a Component>) {
        out.push(&self.component);
        for collection in &self.collections {
            for item in &collection.items {
                item.collect_preorder(out);
            }
        }
    }
}

/// Reads the persisted subtree below `root` following the registry.
pub fn load_tree<S>(
    store: &S,
    registry: &ComponentTypeRegistry,
    root: Component,
) -> RepoResult<ComponentTree>
where
    S: ComponentStore + ?Sized,
{
    let mut collections = Vec::new();
    for declared in registry.lookup(&root.component_type) {
        let mut items = Vec::new();
        for child in store.children(&root, &declared.name)? {
            items.push(load_tree(store, registry, child)?);
        }
        collections.push(CollectionTree {
            name: declared.name.clone(),
            items,
        });
    }
    Ok(ComponentTree {
        component: root,
        collections,
    })
}
