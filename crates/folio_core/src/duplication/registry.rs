//! Declarative component type registry.
//!
//! # Responsibility
//! - Map each component type tag to its ordered child collections and its
//!   reference-bearing payload paths.
//! - Provide an optional process-wide snapshot installed once at startup.
//!
//! # Invariants
//! - A type is declared at most once.
//! - Collection order is declaration order; duplication walks it verbatim.
//! - Unknown types are leaves: `lookup` returns an empty slice, not an error.
//! - The global snapshot is immutable after installation.

use crate::duplication::remap::ReferencePath;
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid registry name regex"));

static GLOBAL_REGISTRY: OnceCell<ComponentTypeRegistry> = OnceCell::new();

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Declaration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Type or collection name is not `snake_case` ASCII.
    InvalidName(String),
    DuplicateType(String),
    DuplicateCollection {
        component_type: String,
        collection: String,
    },
    InvalidReferencePath(String),
    /// `install_global` was called twice.
    AlreadyInstalled,
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(value) => write!(f, "invalid component type or collection name: {value}"),
            Self::DuplicateType(value) => write!(f, "component type already declared: {value}"),
            Self::DuplicateCollection {
                component_type,
                collection,
            } => write!(
                f,
                "collection `{collection}` declared twice for component type `{component_type}`"
            ),
            Self::InvalidReferencePath(value) => write!(f, "invalid reference path: {value}"),
            Self::AlreadyInstalled => write!(f, "global component type registry already installed"),
        }
    }
}

impl Error for RegistryError {}

/// One named child collection of a component type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildCollection {
    pub name: String,
    /// Type tag authored children of this collection must carry.
    pub child_type: String,
}

#[derive(Debug, Clone, Default)]
struct TypeDeclaration {
    collections: Vec<ChildCollection>,
    reference_paths: Vec<ReferencePath>,
}

/// Flat table of per-type metadata.
#[derive(Debug, Clone, Default)]
pub struct ComponentTypeRegistry {
    types: BTreeMap<String, TypeDeclaration>,
}

impl ComponentTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the ordered child collections of `component_type`.
    pub fn declare<I, N, C>(&mut self, component_type: &str, collections: I) -> RegistryResult<()>
    where
        I: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: Into<String>,
    {
        self.declare_with_references(component_type, collections, Vec::<String>::new())
    }

    /// Declares child collections plus the payload paths holding perma id
    /// references (see [`ReferencePath`] for the path syntax).
    pub fn declare_with_references<I, N, C, R, P>(
        &mut self,
        component_type: &str,
        collections: I,
        reference_paths: R,
    ) -> RegistryResult<()>
    where
        I: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: Into<String>,
        R: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let type_name = validate_name(component_type)?;
        if self.types.contains_key(type_name.as_str()) {
            return Err(RegistryError::DuplicateType(type_name));
        }

        let mut declaration = TypeDeclaration::default();
        for (name, child_type) in collections {
            let name: String = name.into();
            let child_type: String = child_type.into();
            let name = validate_name(&name)?;
            let child_type = validate_name(&child_type)?;
            if declaration
                .collections
                .iter()
                .any(|existing| existing.name == name)
            {
                return Err(RegistryError::DuplicateCollection {
                    component_type: type_name,
                    collection: name,
                });
            }
            declaration
                .collections
                .push(ChildCollection { name, child_type });
        }
        for path in reference_paths {
            declaration
                .reference_paths
                .push(ReferencePath::parse(path.as_ref())?);
        }

        self.types.insert(type_name, declaration);
        Ok(())
    }

    /// Returns the ordered child collections of `component_type`.
    ///
    /// Unregistered types yield an empty slice and are copied as leaves.
    pub fn lookup(&self, component_type: &str) -> &[ChildCollection] {
        self.types
            .get(component_type)
            .map(|declaration| declaration.collections.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the reference-bearing payload paths of `component_type`.
    pub fn reference_paths(&self, component_type: &str) -> &[ReferencePath] {
        self.types
            .get(component_type)
            .map(|declaration| declaration.reference_paths.as_slice())
            .unwrap_or(&[])
    }

    /// Returns one declared collection of `component_type`, if any.
    pub fn collection(&self, component_type: &str, collection: &str) -> Option<&ChildCollection> {
        self.lookup(component_type)
            .iter()
            .find(|declared| declared.name == collection)
    }

    pub fn is_declared(&self, component_type: &str) -> bool {
        self.types.contains_key(component_type)
    }

    /// Returns declared type tags in sorted order.
    pub fn component_types(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Story layout: story → chapters → sections → content elements.
    pub fn story_defaults() -> RegistryResult<Self> {
        let mut registry = Self::new();
        registry.declare("story", [("chapters", "chapter")])?;
        registry.declare_with_references("chapter", [("sections", "section")], ["link"])?;
        registry.declare_with_references(
            "section",
            [("content_elements", "content_element")],
            ["link", "transition.target"],
        )?;
        registry.declare_with_references(
            "content_element",
            Vec::<(String, String)>::new(),
            ["link", "links.*.target", "hotspots.*.area.link"],
        )?;
        Ok(registry)
    }
}

/// Installs the process-wide registry snapshot.
///
/// Must run before the first duplication that reads [`global`].
pub fn install_global(
    registry: ComponentTypeRegistry,
) -> RegistryResult<&'static ComponentTypeRegistry> {
    GLOBAL_REGISTRY
        .set(registry)
        .map_err(|_| RegistryError::AlreadyInstalled)?;
    GLOBAL_REGISTRY.get().ok_or(RegistryError::AlreadyInstalled)
}

/// Returns the process-wide registry snapshot, if installed.
pub fn global() -> Option<&'static ComponentTypeRegistry> {
    GLOBAL_REGISTRY.get()
}

fn validate_name(value: &str) -> RegistryResult<String> {
    let trimmed = value.trim();
    if !NAME_RE.is_match(trimmed) {
        return Err(RegistryError::InvalidName(value.to_string()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::{ComponentTypeRegistry, RegistryError};
    use crate::duplication::remap::ReferenceRemapper;
    use serde_json::json;

    #[test]
    fn lookup_returns_collections_in_declaration_order() {
        let mut registry = ComponentTypeRegistry::new();
        registry
            .declare("section", [("backdrops", "backdrop"), ("items", "item")])
            .expect("declare section");

        let names = registry
            .lookup("section")
            .iter()
            .map(|collection| collection.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["backdrops", "items"]);
        assert_eq!(registry.lookup("section")[1].child_type, "item");
    }

    #[test]
    fn unknown_type_is_a_leaf() {
        let registry = ComponentTypeRegistry::new();
        assert!(registry.lookup("mystery").is_empty());
        assert!(registry.reference_paths("mystery").is_empty());
        assert!(!registry.is_declared("mystery"));
    }

    #[test]
    fn rejects_second_declaration_of_a_type() {
        let mut registry = ComponentTypeRegistry::new();
        registry
            .declare("story", [("chapters", "chapter")])
            .expect("first declaration");
        let err = registry
            .declare("story", [("sections", "section")])
            .expect_err("second declaration must fail");
        assert_eq!(err, RegistryError::DuplicateType("story".to_string()));
        assert_eq!(registry.lookup("story")[0].name, "chapters");
    }

    #[test]
    fn rejects_invalid_names_and_duplicate_collections() {
        let mut registry = ComponentTypeRegistry::new();
        assert!(matches!(
            registry.declare("Story", [("chapters", "chapter")]),
            Err(RegistryError::InvalidName(_))
        ));
        assert!(matches!(
            registry.declare("story", [("chapters", "chapter"), ("chapters", "section")]),
            Err(RegistryError::DuplicateCollection { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn rejects_invalid_reference_path() {
        let mut registry = ComponentTypeRegistry::new();
        let err = registry
            .declare_with_references("section", Vec::<(String, String)>::new(), ["links..target"])
            .expect_err("empty path segment must fail");
        assert!(matches!(err, RegistryError::InvalidReferencePath(_)));
    }

    #[test]
    fn overlapping_declared_paths_rewrite_a_permutation_once() {
        let mut registry = ComponentTypeRegistry::new();
        registry
            .declare_with_references(
                "gallery",
                Vec::<(String, String)>::new(),
                ["related", "related.*"],
            )
            .expect("declare gallery");
        let mut remapper = ReferenceRemapper::new();
        remapper.record(3, 2);
        remapper.record(2, 3);

        let rewritten = remapper.rewrite(
            registry.reference_paths("gallery"),
            &json!({ "related": [2] }),
        );
        assert_eq!(rewritten, json!({ "related": [3] }));
    }

    #[test]
    fn story_defaults_describe_four_levels() {
        let registry = ComponentTypeRegistry::story_defaults().expect("defaults are valid");
        assert_eq!(
            registry.component_types(),
            vec!["chapter", "content_element", "section", "story"]
        );
        assert_eq!(
            registry
                .collection("section", "content_elements")
                .map(|collection| collection.child_type.as_str()),
            Some("content_element")
        );
        assert!(registry.lookup("content_element").is_empty());
        assert_eq!(registry.reference_paths("content_element").len(), 3);
    }
}
