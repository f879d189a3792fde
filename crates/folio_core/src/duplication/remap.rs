//! Perma id reference rewriting for copied payloads.
//!
//! # Responsibility
//! - Record `old perma id → new perma id` for one duplication run.
//! - Rewrite reference-bearing payload values through that mapping.
//!
//! # Invariants
//! - Only values at declared reference paths are touched.
//! - Values without a recorded mapping are left exactly as they were.
//! - Each value is substituted at most once per rewrite; mappings never chain.

use crate::duplication::registry::{RegistryError, RegistryResult};
use crate::model::component::PermaId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};

static KEY_SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*$").expect("valid key segment regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    /// Every element of an array.
    Each,
}

/// Location of reference values inside a configuration payload.
///
/// Dotted object keys, with `*` matching every array element:
/// `link`, `transition.target`, `links.*.target`. The value found at the end
/// of the path may be an integer or an array of integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePath {
    segments: Vec<PathSegment>,
}

impl ReferencePath {
    pub fn parse(value: &str) -> RegistryResult<Self> {
        let mut segments = Vec::new();
        for raw in value.trim().split('.') {
            if raw == "*" {
                segments.push(PathSegment::Each);
            } else if KEY_SEGMENT_RE.is_match(raw) {
                segments.push(PathSegment::Key(raw.to_string()));
            } else {
                return Err(RegistryError::InvalidReferencePath(value.to_string()));
            }
        }
        if !matches!(segments.first(), Some(PathSegment::Key(_))) {
            return Err(RegistryError::InvalidReferencePath(value.to_string()));
        }
        Ok(Self { segments })
    }
}

impl Display for ReferencePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let rendered = self
            .segments
            .iter()
            .map(|segment| match segment {
                PathSegment::Key(key) => key.as_str(),
                PathSegment::Each => "*",
            })
            .collect::<Vec<_>>()
            .join(".");
        f.write_str(&rendered)
    }
}

/// Per-run perma id mapping.
#[derive(Debug, Clone, Default)]
pub struct ReferenceRemapper {
    mapping: HashMap<PermaId, PermaId>,
}

impl ReferenceRemapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, old_id: PermaId, new_id: PermaId) {
        self.mapping.insert(old_id, new_id);
    }

    pub fn get(&self, old_id: PermaId) -> Option<PermaId> {
        self.mapping.get(&old_id).copied()
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// True when every recorded id maps to itself (perma ids preserved).
    pub fn is_identity(&self) -> bool {
        self.mapping.iter().all(|(old_id, new_id)| old_id == new_id)
    }

    /// Returns a rewritten copy of `payload`.
    pub fn rewrite(&self, paths: &[ReferencePath], payload: &Value) -> Value {
        let mut rewritten = payload.clone();
        self.rewrite_in_place(paths, &mut rewritten);
        rewritten
    }

    /// Rewrites `payload` in place and returns the number of substituted values.
    ///
    /// Target locations are resolved against the unmodified payload first, so
    /// overlapping paths (`related`, `related.*`) still reach each value once.
    pub fn rewrite_in_place(&self, paths: &[ReferencePath], payload: &mut Value) -> usize {
        let mut targets = BTreeSet::new();
        for path in paths {
            collect_targets(payload, &path.segments, String::new(), &mut targets);
        }
        targets
            .iter()
            .map(|pointer| {
                payload
                    .pointer_mut(pointer)
                    .map_or(0, |value| self.substitute_scalar(value))
            })
            .sum()
    }

    fn substitute_scalar(&self, value: &mut Value) -> usize {
        let replacement = value
            .as_i64()
            .and_then(|old_id| self.get(old_id).filter(|new_id| *new_id != old_id));
        match replacement {
            Some(new_id) => {
                *value = Value::from(new_id);
                1
            }
            None => 0,
        }
    }
}

/// Collects JSON pointers of every value `segments` resolves to. A path
/// ending on an array targets each of its elements.
fn collect_targets(
    value: &Value,
    segments: &[PathSegment],
    pointer: String,
    targets: &mut BTreeSet<String>,
) {
    match segments.split_first() {
        None => match value {
            Value::Array(items) => {
                targets.extend((0..items.len()).map(|index| format!("{pointer}/{index}")));
            }
            _ => {
                targets.insert(pointer);
            }
        },
        Some((PathSegment::Key(key), rest)) => {
            if let Some(child) = value.get(key.as_str()) {
                collect_targets(child, rest, format!("{pointer}/{key}"), targets);
            }
        }
        Some((PathSegment::Each, rest)) => {
            if let Value::Array(items) = value {
                for (index, item) in items.iter().enumerate() {
                    collect_targets(item, rest, format!("{pointer}/{index}"), targets);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ReferencePath, ReferenceRemapper};
    use serde_json::json;

    fn paths(values: &[&str]) -> Vec<ReferencePath> {
        values
            .iter()
            .map(|value| ReferencePath::parse(value).expect("valid path"))
            .collect()
    }

    #[test]
    fn rewrites_top_level_reference() {
        let mut remapper = ReferenceRemapper::new();
        remapper.record(3, 102);

        let rewritten = remapper.rewrite(&paths(&["link"]), &json!({ "link": 3, "title": "Intro" }));
        assert_eq!(rewritten, json!({ "link": 102, "title": "Intro" }));
    }

    #[test]
    fn leaves_undeclared_fields_and_unknown_ids_untouched() {
        let mut remapper = ReferenceRemapper::new();
        remapper.record(3, 102);

        let payload = json!({ "link": 9, "imageId": 3, "caption": "3" });
        let mut rewritten = payload.clone();
        let count = remapper.rewrite_in_place(&paths(&["link"]), &mut rewritten);

        assert_eq!(count, 0);
        assert_eq!(rewritten, payload);
        assert_eq!(
            serde_json::to_string(&rewritten).expect("serialize"),
            serde_json::to_string(&payload).expect("serialize")
        );
    }

    #[test]
    fn rewrites_nested_and_array_paths() {
        let mut remapper = ReferenceRemapper::new();
        remapper.record(1, 10);
        remapper.record(2, 20);

        let payload = json!({
            "links": [{ "target": 1 }, { "target": 5 }, { "label": "none" }],
            "transition": { "target": 2 },
            "related": [1, 2, 7]
        });
        let rewritten = remapper.rewrite(
            &paths(&["links.*.target", "transition.target", "related"]),
            &payload,
        );

        assert_eq!(
            rewritten,
            json!({
                "links": [{ "target": 10 }, { "target": 5 }, { "label": "none" }],
                "transition": { "target": 20 },
                "related": [10, 20, 7]
            })
        );
    }

    #[test]
    fn mappings_do_not_chain() {
        let mut remapper = ReferenceRemapper::new();
        remapper.record(1, 2);
        remapper.record(2, 3);

        let rewritten = remapper.rewrite(&paths(&["a", "b"]), &json!({ "a": 1, "b": 2 }));
        assert_eq!(rewritten, json!({ "a": 2, "b": 3 }));
    }

    #[test]
    fn overlapping_paths_substitute_each_value_once() {
        let mut remapper = ReferenceRemapper::new();
        remapper.record(3, 2);
        remapper.record(2, 3);

        let mut payload = json!({ "related": [2, 3], "link": 2 });
        let count = remapper.rewrite_in_place(
            &paths(&["related", "related.*", "link", "link"]),
            &mut payload,
        );

        assert_eq!(count, 3);
        assert_eq!(payload, json!({ "related": [3, 2], "link": 3 }));
    }

    #[test]
    fn identity_mapping_is_a_no_op() {
        let mut remapper = ReferenceRemapper::new();
        remapper.record(1, 1);
        remapper.record(2, 2);
        assert!(remapper.is_identity());

        let mut payload = json!({ "link": 2 });
        assert_eq!(remapper.rewrite_in_place(&paths(&["link"]), &mut payload), 0);
        assert_eq!(payload, json!({ "link": 2 }));
    }

    #[test]
    fn parse_rejects_malformed_paths() {
        for value in ["", "*", "a..b", "a.b c", "*.target"] {
            assert!(ReferencePath::parse(value).is_err(), "{value} should be rejected");
        }
        assert_eq!(
            ReferencePath::parse("links.*.target")
                .expect("valid path")
                .to_string(),
            "links.*.target"
        );
    }
}
