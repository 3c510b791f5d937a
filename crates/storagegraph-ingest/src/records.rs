//! Record loader for dumps written by external collectors.
//!
//! Accepted shapes:
//!
//! - `.jsonl`: one record per line, blank lines ignored,
//! - `.json`: an array of records, or a single listing page whose records sit under
//!   `value` (Microsoft Graph), `files` (Google Drive) or `entries` (Dropbox).
//!
//! A line or document that is not valid JSON makes the whole dump unusable.

use crate::error::{IngestError, Result};
use serde_json::Value;
use std::io::BufRead;
use std::path::Path;

/// Keys under which listing APIs return their page of items.
const PAGE_KEYS: &[&str] = &["value", "files", "entries"];

pub fn load_records(path: &Path) -> Result<Vec<Value>> {
    let file = std::fs::File::open(path).map_err(|e| source_error(path, e))?;
    let reader = std::io::BufReader::new(file);

    let is_lines = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jsonl") || ext.eq_ignore_ascii_case("ndjson"));

    let records = if is_lines {
        read_json_lines(reader).map_err(|message| IngestError::RecordSource {
            path: path.to_path_buf(),
            message,
        })?
    } else {
        let document: Value =
            serde_json::from_reader(reader).map_err(|e| source_error(path, e))?;
        records_from_document(document).map_err(|message| IngestError::RecordSource {
            path: path.to_path_buf(),
            message,
        })?
    };

    tracing::info!(path = %path.display(), records = records.len(), "loaded records");
    Ok(records)
}

pub fn read_json_lines(reader: impl BufRead) -> std::result::Result<Vec<Value>, String> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| e.to_string())?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .map_err(|e| format!("line {}: {e}", index + 1))?;
        records.push(record);
    }
    Ok(records)
}

pub fn records_from_document(document: Value) -> std::result::Result<Vec<Value>, String> {
    match document {
        Value::Array(items) => Ok(items),
        Value::Object(mut page) => PAGE_KEYS
            .iter()
            .find_map(|key| match page.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| {
                format!(
                    "expected an array of records or a page with one of {}",
                    PAGE_KEYS.join(", ")
                )
            }),
        _ => Err("expected an array of records".to_string()),
    }
}

fn source_error(path: &Path, err: impl std::fmt::Display) -> IngestError {
    IngestError::RecordSource {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn reads_json_lines_skipping_blanks() {
        let input = "{\"a\":1}\n\n  \n{\"a\":2}\n";
        let records = read_json_lines(input.as_bytes()).unwrap();
        assert_eq!(records, vec![json!({"a": 1}), json!({"a": 2})]);
    }

    #[test]
    fn malformed_line_is_fatal() {
        let err = read_json_lines("{\"a\":1}\n{oops\n".as_bytes()).unwrap_err();
        assert!(err.starts_with("line 2:"));
    }

    #[test]
    fn unwraps_listing_pages() {
        let graph = json!({ "@odata.nextLink": "https://x", "value": [{"id": "1"}] });
        assert_eq!(records_from_document(graph).unwrap().len(), 1);

        let drive = json!({ "kind": "drive#fileList", "files": [{"id": "a"}, {"id": "b"}] });
        assert_eq!(records_from_document(drive).unwrap().len(), 2);

        let dropbox = json!({ "entries": [], "cursor": "c", "has_more": false });
        assert!(records_from_document(dropbox).unwrap().is_empty());

        assert!(records_from_document(json!({ "items": [] })).is_err());
        assert!(records_from_document(json!(3)).is_err());
    }

    #[test]
    fn loads_files_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let lines = dir.path().join("dump.jsonl");
        let mut file = std::fs::File::create(&lines).unwrap();
        writeln!(file, "{{\"id\":\"1\"}}").unwrap();
        writeln!(file, "{{\"id\":\"2\"}}").unwrap();
        assert_eq!(load_records(&lines).unwrap().len(), 2);

        let array = dir.path().join("dump.json");
        std::fs::write(&array, b"[{\"id\":\"1\"}]").unwrap();
        assert_eq!(load_records(&array).unwrap().len(), 1);

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, b"[{").unwrap();
        assert!(matches!(
            load_records(&broken),
            Err(IngestError::RecordSource { .. })
        ));
    }
}
