//! Normalization and containment pipeline for storagegraph
//!
//! Converts flat, provider-native listings (local `stat` records, Google Drive / OneDrive /
//! Dropbox items) into canonical [`storagegraph_model::StorageObject`]s plus the mirrored
//! containment edges between them.
//!
//! ```text
//! records ──▶ ObjectBuilder (+ attribute mapper) ──▶ IdentifierMap ──▶ ContainmentGraph
//!                         pass 1                          frozen           pass 2
//! ```

pub mod attributes;
pub mod builder;
pub mod collect;
pub mod containment;
pub mod error;
pub mod identifier_map;
pub mod path;
pub mod pipeline;
pub mod profile;
pub mod records;

pub use attributes::{map_type, MarkerVocabulary, TypeIndicator, TypeMapping};
pub use builder::{BuiltObject, ObjectBuilder, ParentHint};
pub use collect::{local_provider, scan_local, LocalScanOptions};
pub use containment::{ContainmentGraph, ContainmentGraphBuilder, GraphWarning, ResolutionStrategy};
pub use error::{IngestError, RequiredField, Result};
pub use identifier_map::{IdentifierMap, IdentifierMapBuilder};
pub use path::PathStyle;
pub use pipeline::{IngestRun, Pipeline, PipelineConfig, RunReport};
pub use profile::{ContainmentRule, IndicatorRule, LocatorSource, ProviderProfile};
pub use records::load_records;
