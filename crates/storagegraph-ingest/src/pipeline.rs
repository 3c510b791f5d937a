//! Run pipeline.
//!
//! Phases run strictly in order: the record source is already drained into a `Vec`, then
//! every record is built (pass 1, filling the identifier map), then the containment graph is
//! resolved (pass 2). Serialization is left to the caller, which only sees a completed
//! [`IngestRun`].

use crate::builder::{BuiltObject, ObjectBuilder, ParentHint};
use crate::containment::{ContainmentGraphBuilder, GraphWarning, ResolutionStrategy};
use crate::error::{IngestError, Result};
use crate::profile::ProviderProfile;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use storagegraph_model::{ContainmentEdge, ObjectId, Provenance, ProviderKind, StorageObject};

/// Immutable inputs of one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub profile: ProviderProfile,
    pub provenance: Provenance,
}

impl PipelineConfig {
    /// Built-in profile for `kind`, stamped with that profile's service id.
    pub fn for_provider(kind: ProviderKind, version: impl Into<String>) -> Self {
        let profile = ProviderProfile::builtin(kind);
        let provenance = Provenance::new(profile.service_id, version);
        Self {
            profile,
            provenance,
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }
}

/// Counts printed at the end of every run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub records_seen: usize,
    pub objects_built: usize,
    pub edges_built: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub orphans: usize,
    pub self_references: usize,
    pub ambiguous: usize,
    /// Timestamp values present in kept records but unparseable, and so omitted.
    pub dropped_timestamps: usize,
    /// Skips per missing field.
    pub skip_reasons: BTreeMap<String, usize>,
}

/// Everything a completed run produced, ready for serialization.
#[derive(Debug, Clone)]
pub struct IngestRun {
    pub provider: ProviderKind,
    pub provenance: Provenance,
    pub collected_at: DateTime<Utc>,
    pub objects: Vec<StorageObject>,
    pub edges: Vec<ContainmentEdge>,
    pub warnings: Vec<GraphWarning>,
    pub report: RunReport,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.profile.validate()?;
        Ok(Self { config })
    }

    pub fn run(&self, records: Vec<Value>, collected_at: DateTime<Utc>) -> Result<IngestRun> {
        let PipelineConfig {
            profile,
            provenance,
        } = &self.config;
        let builder = ObjectBuilder::new(profile, provenance.clone(), collected_at)?;
        let mut report = RunReport {
            records_seen: records.len(),
            ..Default::default()
        };

        tracing::info!(
            provider = %profile.kind,
            records = records.len(),
            "building objects"
        );

        // Pass 1: objects.
        let mut graph = ContainmentGraphBuilder::new(ResolutionStrategy::from(&profile.containment));
        let mut seen: HashSet<ObjectId> = HashSet::with_capacity(records.len());
        let mut objects = Vec::with_capacity(records.len());
        let mut hints: Vec<ParentHint> = Vec::with_capacity(records.len());

        for (index, record) in records.into_iter().enumerate() {
            let built = builder.build(record).and_then(|built| {
                if seen.insert(built.object.id) {
                    Ok(built)
                } else {
                    Err(IngestError::DuplicateObject(built.object.id))
                }
            });

            match built {
                Ok(BuiltObject {
                    object,
                    native_id,
                    parent_hint,
                    dropped_timestamps,
                    ..
                }) => {
                    report.dropped_timestamps += dropped_timestamps;
                    graph.register(&object, native_id.as_deref());
                    objects.push(object);
                    hints.push(parent_hint);
                }
                Err(IngestError::DuplicateObject(id)) => {
                    tracing::warn!(record = index, object = %id, "skipping duplicate listing");
                    report.duplicates += 1;
                }
                Err(IngestError::MissingRequiredField { field, detail }) => {
                    tracing::warn!(record = index, %field, %detail, "skipping record");
                    report.skipped += 1;
                    *report.skip_reasons.entry(field.to_string()).or_default() += 1;
                }
                Err(fatal) => return Err(fatal),
            }
        }

        if objects.is_empty() {
            return Err(IngestError::EmptyInput {
                skipped: report.skipped + report.duplicates,
            });
        }

        // Pass 2: containment.
        let children = objects.iter().map(|o| o.id).zip(hints.iter());
        let graph = graph.resolve(children, provenance);

        report.objects_built = objects.len();
        report.edges_built = graph.edges.len();
        report.orphans = graph.orphans();
        report.self_references = graph.self_references();
        report.ambiguous = graph.ambiguous();

        tracing::info!(
            objects = report.objects_built,
            edges = report.edges_built,
            skipped = report.skipped,
            duplicates = report.duplicates,
            dropped_timestamps = report.dropped_timestamps,
            "run complete"
        );

        Ok(IngestRun {
            provider: profile.kind,
            provenance: provenance.clone(),
            collected_at,
            objects,
            edges: graph.edges,
            warnings: graph.warnings,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pipeline(kind: ProviderKind) -> Pipeline {
        Pipeline::new(PipelineConfig::for_provider(kind, "test")).unwrap()
    }

    #[test]
    fn skips_bad_records_and_counts_them() {
        let records = vec![
            json!({ "path": "/srv", "st_mode": 0o040755, "st_size": 4096 }),
            json!({ "path": "/srv/a", "st_mode": 0o100644 }),
            json!("not a record"),
            json!({ "path": "/srv/b", "st_mode": 0o100644, "st_size": 3 }),
        ];
        let run = pipeline(ProviderKind::Posix).run(records, Utc::now()).unwrap();

        assert_eq!(run.report.records_seen, 4);
        assert_eq!(run.report.objects_built, 2);
        assert_eq!(run.report.skipped, 2);
        assert_eq!(run.report.skip_reasons.get("size"), Some(&1));
        assert_eq!(run.report.skip_reasons.get("record"), Some(&1));
        assert_eq!(run.report.edges_built, 2);
        // `/srv` has parent `/`, which is not part of the run.
        assert_eq!(run.report.orphans, 1);
    }

    #[test]
    fn unparseable_timestamps_are_counted() {
        let records = vec![
            json!({ "id": "1", "name": "a", "mimeType": "text/plain", "size": "1",
                    "createdTime": "yesterday", "modifiedTime": "2024-01-01T00:00:00Z" }),
            json!({ "id": "2", "name": "b", "mimeType": "text/plain", "size": "1",
                    "createdTime": "never", "modifiedTime": "soon" }),
        ];
        let run = pipeline(ProviderKind::GoogleDrive).run(records, Utc::now()).unwrap();
        assert_eq!(run.report.objects_built, 2);
        assert_eq!(run.report.dropped_timestamps, 3);
    }

    #[test]
    fn empty_input_is_fatal() {
        let err = pipeline(ProviderKind::Dropbox).run(Vec::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, IngestError::EmptyInput { skipped: 0 }));

        let err = pipeline(ProviderKind::Dropbox)
            .run(vec![json!({ ".tag": "file" })], Utc::now())
            .unwrap_err();
        assert!(matches!(err, IngestError::EmptyInput { skipped: 1 }));
    }

    #[test]
    fn duplicate_recovered_ids_are_skipped() {
        let item = json!({
            "id": "X1",
            "name": "a.txt",
            "size": 1,
            "file": {},
            "eTag": "\"{6B29FC40-CA47-1067-B31D-00DD010662DA},1\"",
        });
        let run = pipeline(ProviderKind::OneDrive)
            .run(vec![item.clone(), item], Utc::now())
            .unwrap();
        assert_eq!(run.objects.len(), 1);
        assert_eq!(run.report.duplicates, 1);
    }

    #[test]
    fn provenance_is_stamped_everywhere() {
        let records = vec![
            json!({ "path_display": "/A", ".tag": "folder", "name": "A" }),
            json!({ "path_display": "/a/B.txt", ".tag": "file", "name": "B.txt", "size": 9 }),
        ];
        let run = pipeline(ProviderKind::Dropbox).run(records, Utc::now()).unwrap();
        assert_eq!(run.edges.len(), 2);
        assert!(run.objects.iter().all(|o| o.provenance == run.provenance));
        assert!(run.edges.iter().all(|e| e.provenance == run.provenance));
        assert_eq!(run.provenance.ingester, crate::profile::DROPBOX_SERVICE_ID);
    }
}
