//! Property tests for the containment graph over generated trees.

use chrono::Utc;
use proptest::prelude::*;
use proptest::sample::Index;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use storagegraph_ingest::{
    ContainmentGraphBuilder, ParentHint, PathStyle, Pipeline, PipelineConfig, ResolutionStrategy,
};
use storagegraph_model::{
    ObjectId, Provenance, ProviderKind, RawMetadata, RelationshipTag, StorageObject, TypeFlag,
    TypeFlags,
};
use uuid::Uuid;

// ============================================================================
// Strategies
// ============================================================================

/// `parents[i]` is the parent of node `i + 1`; node 0 is the root.
fn tree_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(any::<Index>(), 0..48).prop_map(|picks| {
        picks
            .iter()
            .enumerate()
            .map(|(i, pick)| pick.index(i + 1))
            .collect()
    })
}

fn posix_records(parents: &[usize]) -> Vec<Value> {
    let n = parents.len() + 1;
    let has_children: HashSet<usize> = parents.iter().copied().collect();

    let mut paths = vec!["/r".to_string()];
    for (i, parent) in parents.iter().enumerate() {
        let path = format!("{}/n{}", paths[*parent], i + 1);
        paths.push(path);
    }

    (0..n)
        .map(|i| {
            let mode = if i == 0 || has_children.contains(&i) {
                0o040755
            } else {
                0o100644
            };
            json!({ "path": paths[i], "st_mode": mode, "st_size": i })
        })
        .collect()
}

/// Cloud items whose parent may be missing, themselves, or several ids.
fn cloud_records_strategy() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(
        (0u8..4, prop::collection::vec(0usize..24, 0..3)),
        1..24,
    )
    .prop_map(|items| {
        items
            .iter()
            .enumerate()
            .map(|(i, (shape, parents))| {
                let mut parents: Vec<String> = parents.iter().map(|p| format!("id{p}")).collect();
                if *shape == 0 {
                    parents.push(format!("id{i}"));
                }
                let mime = if shape % 2 == 0 {
                    "application/vnd.google-apps.folder"
                } else {
                    "text/plain"
                };
                json!({
                    "id": format!("id{i}"),
                    "name": format!("item{i}"),
                    "mimeType": mime,
                    "size": "7",
                    "parents": parents,
                })
            })
            .collect()
    })
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
        provenance: Provenance::new(Uuid::nil(), "prop"),
        raw: RawMetadata::new(ProviderKind::Posix, Utc::now(), json!({})),
    }
}

fn assert_mirrored(edges: &[storagegraph_model::ContainmentEdge]) -> Result<(), TestCaseError> {
    let mut contains = HashSet::new();
    let mut contained_by = HashSet::new();
    for edge in edges {
        prop_assert_ne!(edge.object1, edge.object2);
        match edge.tag {
            RelationshipTag::Contains => contains.insert((edge.parent(), edge.child())),
            RelationshipTag::ContainedBy => contained_by.insert((edge.parent(), edge.child())),
        };
    }
    prop_assert_eq!(contains.len() * 2, edges.len());
    prop_assert_eq!(contains, contained_by);
    Ok(())
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn every_tree_edge_is_emitted_once_in_both_directions(parents in tree_strategy()) {
        let records = posix_records(&parents);
        let pipeline = Pipeline::new(PipelineConfig::for_provider(ProviderKind::Posix, "prop")).unwrap();
        let run = pipeline.run(records, Utc::now()).unwrap();

        prop_assert_eq!(run.objects.len(), parents.len() + 1);
        prop_assert!(run.objects.iter().all(|o| !o.id.is_nil()));
        prop_assert_eq!(run.edges.len(), parents.len() * 2);
        prop_assert_eq!(run.report.orphans, 1);
        assert_mirrored(&run.edges)?;

        let index: HashMap<ObjectId, usize> =
            run.objects.iter().enumerate().map(|(i, o)| (o.id, i)).collect();
        for edge in run.edges.iter().filter(|e| e.tag == RelationshipTag::Contains) {
            let child = index[&edge.child()];
            let parent = index[&edge.parent()];
            prop_assert_eq!(parents[child - 1], parent);
        }
    }

    #[test]
    fn cloud_graphs_never_self_loop(records in cloud_records_strategy()) {
        let pipeline =
            Pipeline::new(PipelineConfig::for_provider(ProviderKind::GoogleDrive, "prop")).unwrap();
        let run = pipeline.run(records, Utc::now()).unwrap();

        assert_mirrored(&run.edges)?;
        // Each child has at most one parent pair.
        let children: HashSet<ObjectId> = run.edges.iter().map(|e| e.child()).collect();
        prop_assert_eq!(children.len() * 2, run.edges.len());
        prop_assert_eq!(
            children.len() + run.report.orphans + run.report.self_references,
            run.objects.len()
        );
    }

    #[test]
    fn resolution_is_idempotent(parents in tree_strategy()) {
        let mut paths = vec!["/r".to_string()];
        for (i, parent) in parents.iter().enumerate() {
            let path = format!("{}/n{}", paths[*parent], i + 1);
            paths.push(path);
        }
        let objects: Vec<StorageObject> =
            paths.iter().map(|p| object(p, TypeFlag::Directory)).collect();
        let hints: Vec<ParentHint> = paths
            .iter()
            .map(|p| PathStyle::POSIX.parent(p).map(ParentHint::Path).unwrap_or(ParentHint::None))
            .collect();

        let resolve = || {
            let mut builder =
                ContainmentGraphBuilder::new(ResolutionStrategy::PathKeyed(PathStyle::POSIX));
            for o in &objects {
                builder.register(o, None);
            }
            builder.resolve(
                objects.iter().map(|o| o.id).zip(hints.iter()),
                &Provenance::new(Uuid::nil(), "prop"),
            )
        };

        let first = resolve();
        let second = resolve();
        prop_assert_eq!(first.triples(), second.triples());
        prop_assert_eq!(first.warnings, second.warnings);
    }
}
