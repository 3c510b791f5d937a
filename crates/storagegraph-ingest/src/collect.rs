//! Local filesystem collector.
//!
//! Walks a directory tree (symlinks are reported, never followed) and emits one `stat`-shaped
//! JSON record per entry, the same shape the `posix` / `windows` profiles read. Entries that
//! cannot be read are skipped with a warning; only an unreadable root is an error.

use crate::error::{IngestError, Result};
use serde_json::{json, Map, Value};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use storagegraph_model::ProviderKind;
use walkdir::WalkDir;

/// Options controlling a local scan.
#[derive(Debug, Clone, Default)]
pub struct LocalScanOptions {
    /// Maximum depth below the root (the root itself is depth 0).
    pub max_depth: Option<usize>,
    /// Directory names to skip entirely (exact match).
    pub exclude_dir_names: Vec<String>,
    /// Stop after this many records.
    pub max_entries: Option<usize>,
}

/// The profile family matching records produced on this platform.
pub fn local_provider() -> ProviderKind {
    if cfg!(windows) {
        ProviderKind::Windows
    } else {
        ProviderKind::Posix
    }
}

pub fn scan_local(root: &Path, options: &LocalScanOptions) -> Result<Vec<Value>> {
    let root = canonical_root(root)?;

    let mut walker = WalkDir::new(&root).follow_links(false);
    if let Some(depth) = options.max_depth {
        walker = walker.max_depth(depth);
    }

    let walker = walker.into_iter().filter_entry(|entry| {
        entry.depth() == 0
            || !entry.file_type().is_dir()
            || !options
                .exclude_dir_names
                .iter()
                .any(|name| entry.file_name().to_string_lossy() == name.as_str())
    });

    let mut records = Vec::new();
    for entry in walker {
        if options.max_entries.is_some_and(|max| records.len() >= max) {
            tracing::info!(max = records.len(), "scan stopped at entry limit");
            break;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(path = ?err.path(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::warn!(path = %entry.path().display(), error = %err, "skipping entry without metadata");
                continue;
            }
        };

        records.push(stat_record(entry.path(), &metadata));
    }

    tracing::info!(root = %root.display(), records = records.len(), "local scan complete");
    Ok(records)
}

fn stat_record(path: &Path, metadata: &Metadata) -> Value {
    let mut record = Map::new();
    record.insert("path".into(), json!(path.to_string_lossy()));
    if let Some(parent) = path.parent() {
        record.insert("directory".into(), json!(parent.to_string_lossy()));
    }
    if let Some(name) = path.file_name() {
        record.insert("name".into(), json!(name.to_string_lossy()));
    }
    record.insert("st_size".into(), json!(metadata.len()));
    if let Some(ns) = epoch_nanos(metadata.created()) {
        record.insert("st_birthtime_ns".into(), json!(ns));
    }
    platform_fields(&mut record, metadata);
    Value::Object(record)
}

#[cfg(unix)]
fn platform_fields(record: &mut Map<String, Value>, metadata: &Metadata) {
    use std::os::unix::fs::MetadataExt;

    record.insert("st_mode".into(), json!(metadata.mode()));
    record.insert("st_ino".into(), json!(metadata.ino()));
    record.insert("st_dev".into(), json!(metadata.dev()));
    record.insert("st_nlink".into(), json!(metadata.nlink()));
    record.insert("st_uid".into(), json!(metadata.uid()));
    record.insert("st_gid".into(), json!(metadata.gid()));
    record.insert(
        "st_atime_ns".into(),
        json!(combine(metadata.atime(), metadata.atime_nsec())),
    );
    record.insert(
        "st_mtime_ns".into(),
        json!(combine(metadata.mtime(), metadata.mtime_nsec())),
    );
    record.insert(
        "st_ctime_ns".into(),
        json!(combine(metadata.ctime(), metadata.ctime_nsec())),
    );
}

#[cfg(windows)]
fn platform_fields(record: &mut Map<String, Value>, metadata: &Metadata) {
    use std::os::windows::fs::MetadataExt;

    record.insert("st_file_attributes".into(), json!(metadata.file_attributes()));
    common_times(record, metadata);
}

#[cfg(not(any(unix, windows)))]
fn platform_fields(record: &mut Map<String, Value>, metadata: &Metadata) {
    use crate::attributes::{S_IFDIR, S_IFLNK, S_IFREG};

    let file_type = metadata.file_type();
    let mode = if file_type.is_dir() {
        S_IFDIR | 0o755
    } else if file_type.is_symlink() {
        S_IFLNK | 0o777
    } else {
        S_IFREG | 0o644
    };
    record.insert("st_mode".into(), json!(mode));
    common_times(record, metadata);
}

#[cfg(not(unix))]
fn common_times(record: &mut Map<String, Value>, metadata: &Metadata) {
    if let Some(ns) = epoch_nanos(metadata.accessed()) {
        record.insert("st_atime_ns".into(), json!(ns));
    }
    if let Some(ns) = epoch_nanos(metadata.modified()) {
        record.insert("st_mtime_ns".into(), json!(ns));
    }
}

#[cfg(unix)]
fn combine(seconds: i64, nanos: i64) -> i64 {
    seconds.saturating_mul(1_000_000_000).saturating_add(nanos)
}

fn epoch_nanos(time: std::io::Result<SystemTime>) -> Option<i64> {
    let time = time.ok()?;
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_nanos()).ok(),
        Err(before) => i64::try_from(before.duration().as_nanos()).ok().map(|ns| -ns),
    }
}

/// Root path as it will appear in records (canonicalized).
pub fn canonical_root(root: &Path) -> Result<PathBuf> {
    root.canonicalize().map_err(|source| IngestError::Walk {
        path: root.to_path_buf(),
        source,
    })
}
