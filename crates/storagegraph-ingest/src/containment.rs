//! Containment graph builder.
//!
//! Two passes over the run's objects:
//!
//! 1. [`ContainmentGraphBuilder::register`] fills the identifier map: normalized directory
//!    paths for the path-keyed strategy, native ids for the native-id-keyed one.
//! 2. [`ContainmentGraphBuilder::resolve`] freezes the map and translates each child's parent
//!    hint through it, emitting one mirrored `Contains` / `ContainedBy` pair per resolved
//!    parent/child relation.
//!
//! Both passes are linear with hash lookups. Problems are never fatal; they are returned as
//! [`GraphWarning`]s and logged.

use crate::builder::ParentHint;
use crate::identifier_map::{IdentifierMap, IdentifierMapBuilder};
use crate::path::PathStyle;
use crate::profile::ContainmentRule;
use serde::Serialize;
use storagegraph_model::{ContainmentEdge, ObjectId, Provenance, RelationshipTag, StorageObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// Directory paths → ids; a child's parent path is looked up.
    PathKeyed(PathStyle),
    /// Native provider ids → ids; a child's native parent id(s) are looked up.
    NativeIdKeyed,
}

impl From<&ContainmentRule> for ResolutionStrategy {
    fn from(rule: &ContainmentRule) -> Self {
        match rule {
            ContainmentRule::PathKeyed { style, .. } => ResolutionStrategy::PathKeyed(*style),
            ContainmentRule::NativeIdKeyed { .. } => ResolutionStrategy::NativeIdKeyed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum GraphWarning {
    #[error("orphan {child}: parent reference {hint} does not resolve in this run")]
    UnresolvableParent { child: ObjectId, hint: String },

    #[error("object {child} names itself as its parent; edges suppressed")]
    SelfReferenceGuard { child: ObjectId },

    #[error("object {child}: parent reference {hint} is ambiguous ({candidates} candidates), using {chosen}")]
    AmbiguousParentReference {
        child: ObjectId,
        hint: String,
        chosen: ObjectId,
        candidates: usize,
    },
}

/// Edges plus the diagnostics gathered while resolving them.
#[derive(Debug, Clone, Default)]
pub struct ContainmentGraph {
    pub edges: Vec<ContainmentEdge>,
    pub warnings: Vec<GraphWarning>,
}

impl ContainmentGraph {
    pub fn orphans(&self) -> usize {
        self.count(|w| matches!(w, GraphWarning::UnresolvableParent { .. }))
    }

    pub fn self_references(&self) -> usize {
        self.count(|w| matches!(w, GraphWarning::SelfReferenceGuard { .. }))
    }

    pub fn ambiguous(&self) -> usize {
        self.count(|w| matches!(w, GraphWarning::AmbiguousParentReference { .. }))
    }

    /// `(object1, object2, tag)` for every edge, in emission order.
    pub fn triples(&self) -> Vec<(ObjectId, ObjectId, RelationshipTag)> {
        self.edges.iter().map(ContainmentEdge::triple).collect()
    }

    fn count(&self, predicate: impl Fn(&GraphWarning) -> bool) -> usize {
        self.warnings.iter().filter(|w| predicate(w)).count()
    }
}

pub struct ContainmentGraphBuilder {
    strategy: ResolutionStrategy,
    ids: IdentifierMapBuilder,
}

impl ContainmentGraphBuilder {
    pub fn new(strategy: ResolutionStrategy) -> Self {
        Self {
            strategy,
            ids: IdentifierMapBuilder::new(),
        }
    }

    /// Pass 1: make `object` findable as a parent.
    pub fn register(&mut self, object: &StorageObject, native_id: Option<&str>) {
        let key = match self.strategy {
            ResolutionStrategy::PathKeyed(style) if object.is_directory() => {
                Some(style.normalize(&object.locator))
            }
            ResolutionStrategy::PathKeyed(_) => None,
            ResolutionStrategy::NativeIdKeyed => native_id.map(str::to_string),
        };

        if let Some(key) = key {
            if !self.ids.observe(key.clone(), object.id) {
                tracing::warn!(key = %key, object = %object.id, "identifier map key claimed twice; keeping the first");
            }
        }
    }

    /// Pass 2: resolve every child's hint against the frozen map, in input order.
    pub fn resolve<'a, I>(self, children: I, provenance: &Provenance) -> ContainmentGraph
    where
        I: IntoIterator<Item = (ObjectId, &'a ParentHint)>,
    {
        let strategy = self.strategy;
        let map = self.ids.freeze();
        let mut graph = ContainmentGraph::default();

        for (child, hint) in children {
            match resolve_one(strategy, &map, child, hint) {
                Resolution::Parent {
                    parent,
                    ambiguity,
                } => {
                    if let Some(warning) = ambiguity {
                        tracing::warn!(%warning);
                        graph.warnings.push(warning);
                    }
                    match ContainmentEdge::pair(parent, child, provenance) {
                        Some(pair) => graph.edges.extend(pair),
                        None => {
                            let warning = GraphWarning::SelfReferenceGuard { child };
                            tracing::warn!(%warning);
                            graph.warnings.push(warning);
                        }
                    }
                }
                Resolution::Orphan(warning) => {
                    tracing::warn!(%warning);
                    graph.warnings.push(warning);
                }
            }
        }

        tracing::info!(
            edges = graph.edges.len(),
            orphans = graph.orphans(),
            self_references = graph.self_references(),
            ambiguous = graph.ambiguous(),
            "containment graph resolved"
        );
        graph
    }
}

enum Resolution {
    Parent {
        parent: ObjectId,
        ambiguity: Option<GraphWarning>,
    },
    Orphan(GraphWarning),
}

fn resolve_one(
    strategy: ResolutionStrategy,
    map: &IdentifierMap,
    child: ObjectId,
    hint: &ParentHint,
) -> Resolution {
    let keys: Vec<String> = match (hint, strategy) {
        (ParentHint::None, _) => Vec::new(),
        (ParentHint::Path(path), ResolutionStrategy::PathKeyed(style)) => {
            vec![style.normalize(path)]
        }
        (ParentHint::Path(path), ResolutionStrategy::NativeIdKeyed) => vec![path.clone()],
        (ParentHint::NativeIds(ids), _) => ids.clone(),
    };

    let mut resolved = keys
        .iter()
        .filter_map(|key| map.get(key).map(|id| (key, id)));

    let Some((key, parent)) = resolved.next() else {
        return Resolution::Orphan(GraphWarning::UnresolvableParent {
            child,
            hint: hint.to_string(),
        });
    };

    let others = resolved.filter(|(_, id)| *id != parent).count();
    let ambiguity = (others > 0 || map.is_ambiguous(key)).then(|| {
        GraphWarning::AmbiguousParentReference {
            child,
            hint: hint.to_string(),
            chosen: parent,
            candidates: others + 1 + usize::from(map.is_ambiguous(key)),
        }
    });

    Resolution::Parent { parent, ambiguity }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use storagegraph_model::{ProviderKind, RawMetadata, TypeFlag, TypeFlags};
    use uuid::Uuid;

    fn provenance() -> Provenance {
        Provenance::new(Uuid::from_u128(1), "test")
    }

    fn object(locator: &str, flag: TypeFlag) -> StorageObject {
        StorageObject {
            id: ObjectId::new_random(),
            locator: locator.to_string(),
            label: locator.to_string(),
            size: 0,
            timestamps: Vec::new(),
            type_flags: TypeFlags::only(flag),
            attributes: Vec::new(),
            provenance: provenance(),
            raw: RawMetadata::new(ProviderKind::Posix, Utc::now(), serde_json::json!({})),
        }
    }

    #[test]
    fn only_directories_are_path_keyed_parents() {
        let dir = object("/data", TypeFlag::Directory);
        let file = object("/data/a.txt", TypeFlag::RegularFile);
        let nested = object("/data/a.txt/b", TypeFlag::RegularFile);

        let mut builder = ContainmentGraphBuilder::new(ResolutionStrategy::PathKeyed(PathStyle::POSIX));
        for o in [&dir, &file, &nested] {
            builder.register(o, None);
        }

        let file_hint = ParentHint::Path("/data/".to_string());
        let nested_hint = ParentHint::Path("/data/a.txt".to_string());
        let graph = builder.resolve(
            [(file.id, &file_hint), (nested.id, &nested_hint)],
            &provenance(),
        );

        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.edges[0].parent(), dir.id);
        assert_eq!(graph.edges[0].child(), file.id);
        assert_eq!(graph.orphans(), 1);
    }

    #[test]
    fn multi_parent_hint_takes_first_resolving_id() {
        let a = object("a", TypeFlag::Directory);
        let b = object("b", TypeFlag::Directory);
        let child = object("c", TypeFlag::RegularFile);

        let mut builder = ContainmentGraphBuilder::new(ResolutionStrategy::NativeIdKeyed);
        builder.register(&a, Some("A"));
        builder.register(&b, Some("B"));
        builder.register(&child, Some("C"));

        let hint = ParentHint::NativeIds(vec!["missing".into(), "B".into(), "A".into()]);
        let graph = builder.resolve([(child.id, &hint)], &provenance());

        assert_eq!(graph.edges.len(), 2);
        assert!(graph.edges.iter().all(|e| e.parent() == b.id));
        assert_eq!(
            graph.warnings,
            vec![GraphWarning::AmbiguousParentReference {
                child: child.id,
                hint: hint.to_string(),
                chosen: b.id,
                candidates: 2,
            }]
        );
    }

    #[test]
    fn missing_hint_is_an_orphan() {
        let root = object("/", TypeFlag::Directory);
        let mut builder = ContainmentGraphBuilder::new(ResolutionStrategy::PathKeyed(PathStyle::POSIX));
        builder.register(&root, None);
        let graph = builder.resolve([(root.id, &ParentHint::None)], &provenance());
        assert!(graph.edges.is_empty());
        assert_eq!(graph.orphans(), 1);
    }
}
