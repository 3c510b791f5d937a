//! Atomic paired-stream commit.
//!
//! Both streams are written to temporary files next to their final names, flushed and synced,
//! then persisted without clobbering. A temporary file that is dropped before it is persisted
//! deletes itself, so a failed or interrupted run never leaves a partial `.jsonl` behind. If
//! the second stream cannot be persisted the first one is removed again.

use crate::records::{ObjectRecord, RelationshipRecord};
use crate::{OutputError, Result};
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use storagegraph_ingest::IngestRun;
use storagegraph_model::{RelationshipVocabulary, RunFileName, StreamKind, DEFAULT_FILE_PREFIX};
use tempfile::NamedTempFile;

/// Where a run was collected; the rest of the file name comes from the run itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTarget {
    pub platform: String,
    pub machine: String,
    pub storage: Option<String>,
}

/// Paths and line counts of a committed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedRun {
    pub objects_path: PathBuf,
    pub relationships_path: PathBuf,
    pub objects: usize,
    pub relationships: usize,
}

#[derive(Debug, Clone)]
pub struct RunWriter {
    dir: PathBuf,
    prefix: String,
    vocabulary: RelationshipVocabulary,
}

impl RunWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: DEFAULT_FILE_PREFIX.to_string(),
            vocabulary: RelationshipVocabulary::default(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_vocabulary(mut self, vocabulary: RelationshipVocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    /// Objects file name for `run`; its pair is [`RunFileName::paired`].
    pub fn file_name(&self, run: &IngestRun, target: &RunTarget) -> RunFileName {
        RunFileName::new(
            target.platform.clone(),
            run.provenance.ingester.to_string(),
            target.machine.clone(),
            target.storage.clone(),
            run.collected_at,
        )
        .with_prefix(self.prefix.clone())
    }

    pub fn commit(&self, run: &IngestRun, target: &RunTarget) -> Result<CommittedRun> {
        if run.objects.is_empty() {
            return Err(OutputError::EmptyInput);
        }

        let objects_name = self.file_name(run, target).with_kind(StreamKind::Objects);
        let objects_path = self.dir.join(objects_name.encode()?);
        let relationships_path = self.dir.join(objects_name.paired().encode()?);
        for path in [&objects_path, &relationships_path] {
            if path.exists() {
                return Err(OutputError::AlreadyExists(path.clone()));
            }
        }

        // Encode everything before touching the filesystem.
        let objects = run
            .objects
            .iter()
            .map(|object| {
                ObjectRecord::from_object(object).map_err(|source| OutputError::RawMetadata {
                    object: object.id,
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let relationships: Vec<RelationshipRecord> = run
            .edges
            .iter()
            .map(|edge| RelationshipRecord::from_edge(edge, &self.vocabulary))
            .collect();

        std::fs::create_dir_all(&self.dir).map_err(|source| OutputError::Serialization {
            path: self.dir.clone(),
            source,
        })?;

        let objects_tmp = self.write_stream(&objects_path, &objects)?;
        let relationships_tmp = self.write_stream(&relationships_path, &relationships)?;

        persist_pair(
            (objects_tmp, &objects_path),
            (relationships_tmp, &relationships_path),
        )?;

        tracing::info!(
            objects = %objects_path.display(),
            relationships = %relationships_path.display(),
            "committed run"
        );

        Ok(CommittedRun {
            objects_path,
            relationships_path,
            objects: objects.len(),
            relationships: relationships.len(),
        })
    }

    fn write_stream<T: Serialize>(&self, target: &Path, records: &[T]) -> Result<NamedTempFile> {
        let io_error = |source: std::io::Error| OutputError::Serialization {
            path: target.to_path_buf(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_error)?;
        {
            let mut out = BufWriter::new(&mut tmp);
            for record in records {
                serde_json::to_writer(&mut out, record).map_err(|e| classify(target, e))?;
                out.write_all(b"\n").map_err(io_error)?;
            }
            out.flush().map_err(io_error)?;
        }
        tmp.as_file().sync_all().map_err(io_error)?;
        Ok(tmp)
    }
}

/// Persist `first`, then `second`; if `second` fails, `first` is removed again.
fn persist_pair(first: (NamedTempFile, &Path), second: (NamedTempFile, &Path)) -> Result<()> {
    let (first_tmp, first_path) = first;
    let (second_tmp, second_path) = second;

    persist(first_tmp, first_path)?;
    if let Err(err) = persist(second_tmp, second_path) {
        if let Err(cleanup) = std::fs::remove_file(first_path) {
            tracing::error!(
                path = %first_path.display(),
                error = %cleanup,
                "failed to remove first stream after the second could not be committed"
            );
        }
        return Err(err);
    }
    Ok(())
}

fn persist(tmp: NamedTempFile, path: &Path) -> Result<()> {
    tmp.persist_noclobber(path).map_err(|err| {
        if err.error.kind() == std::io::ErrorKind::AlreadyExists {
            OutputError::AlreadyExists(path.to_path_buf())
        } else {
            OutputError::Serialization {
                path: path.to_path_buf(),
                source: err.error,
            }
        }
    })?;
    Ok(())
}

fn classify(path: &Path, err: serde_json::Error) -> OutputError {
    if err.is_io() {
        OutputError::Serialization {
            path: path.to_path_buf(),
            source: err.into(),
        }
    } else {
        OutputError::Encode(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged(dir: &Path, contents: &str) -> NamedTempFile {
        let mut tmp = NamedTempFile::new_in(dir).unwrap();
        tmp.write_all(contents.as_bytes()).unwrap();
        tmp
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn persists_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.jsonl");
        let second = dir.path().join("b.jsonl");

        persist_pair(
            (staged(dir.path(), "a\n"), &first),
            (staged(dir.path(), "b\n"), &second),
        )
        .unwrap();

        assert_eq!(names(dir.path()), vec!["a.jsonl", "b.jsonl"]);
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "b\n");
    }

    #[test]
    fn failed_second_persist_removes_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.jsonl");
        let second = dir.path().join("b.jsonl");
        // Appears after the pre-commit existence check, e.g. a concurrent writer.
        std::fs::write(&second, "other run\n").unwrap();

        let err = persist_pair(
            (staged(dir.path(), "a\n"), &first),
            (staged(dir.path(), "b\n"), &second),
        )
        .unwrap_err();

        assert!(matches!(err, OutputError::AlreadyExists(ref path) if path == &second));
        assert!(!first.exists());
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "other run\n");
        // Both staged temporaries are gone as well.
        assert_eq!(names(dir.path()), vec!["b.jsonl"]);
    }
}
