//! Output serializer for storagegraph
//!
//! A run is written as two JSON-lines streams that share a structured file name:
//!
//! - **Objects**: one [`ObjectRecord`] per canonical object, raw metadata CBOR+base64 encoded,
//! - **Relationships**: one [`RelationshipRecord`] per edge, both halves of every pair.
//!
//! Either both streams appear in the destination directory or neither does.

pub mod records;
pub mod writer;

pub use records::{ObjectRecord, RelationshipRecord};
pub use writer::{CommittedRun, RunTarget, RunWriter};

use serde::de::DeserializeOwned;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use storagegraph_model::{FileNameError, ObjectId, RawMetadataError};

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("refusing to commit a run with no objects")]
    EmptyInput,

    #[error("failed to write {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to encode raw metadata of {object}: {source}")]
    RawMetadata {
        object: ObjectId,
        #[source]
        source: RawMetadataError,
    },

    #[error("cannot name run files: {0}")]
    FileName(#[from] FileNameError),

    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),

    #[error("{path}:{line}: {message}")]
    Read {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, OutputError>;

/// Read back an Objects stream.
pub fn read_objects(path: &Path) -> Result<Vec<ObjectRecord>> {
    read_stream(path)
}

/// Read back a Relationships stream.
pub fn read_relationships(path: &Path) -> Result<Vec<RelationshipRecord>> {
    read_stream(path)
}

fn read_stream<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let read_error = |line: usize, message: String| OutputError::Read {
        path: path.to_path_buf(),
        line,
        message,
    };

    let file = std::fs::File::open(path).map_err(|e| read_error(0, e.to_string()))?;
    let mut records = Vec::new();
    for (index, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| read_error(index + 1, e.to_string()))?;
        if line.is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line).map_err(|e| read_error(index + 1, e.to_string()))?);
    }
    Ok(records)
}
