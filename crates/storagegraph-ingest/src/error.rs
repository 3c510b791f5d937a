//! Error taxonomy for the ingestion pipeline.
//!
//! Per-record problems (`MissingRequiredField`, `DuplicateObject`) are recovered by the
//! pipeline: the record is skipped and counted. Everything else aborts the run before any
//! output is written.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use storagegraph_model::ObjectId;

/// Fields every record must resolve before it can become a canonical object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RequiredField {
    /// The record itself (must be a key/value object).
    Record,
    Size,
    Locator,
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequiredField::Record => "record",
            RequiredField::Size => "size",
            RequiredField::Locator => "locator",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("missing required field `{field}`: {detail}")]
    MissingRequiredField { field: RequiredField, detail: String },

    #[error("object {0} was already built earlier in this run")]
    DuplicateObject(ObjectId),

    #[error("no usable records in input ({skipped} skipped)")]
    EmptyInput { skipped: usize },

    #[error("invalid provider profile `{profile}`: {message}")]
    InvalidProfile { profile: String, message: String },

    #[error("failed to read records from {path}: {message}")]
    RecordSource { path: PathBuf, message: String },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IngestError {
    pub(crate) fn missing(field: RequiredField, detail: impl Into<String>) -> Self {
        IngestError::MissingRequiredField {
            field,
            detail: detail.into(),
        }
    }

    /// Whether the pipeline should skip the record and keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IngestError::MissingRequiredField { .. } | IngestError::DuplicateObject(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
