// 📦 Snapshots - object ids, object storage, newline-delimited JSON
// A snapshot is one full export of one record type for one state.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::record::{RawRecord, StateCode};
use crate::validator::ValidationError;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("object id `{0}` is not of the form STATE/file.json")]
    InvalidObjectId(String),

    #[error("object {bucket}/{object} not found")]
    NotFound { bucket: String, object: String },

    #[error("reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// OBJECT ID
// ============================================================================

/// `{stateCode}/{fileName}`, e.g. `US_ID/sentencing_case_record.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectId {
    pub state: StateCode,
    pub file_name: String,
    raw: String,
}

impl ObjectId {
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for ObjectId {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SnapshotError::InvalidObjectId(s.to_string());
        let (state, file_name) = s.split_once('/').ok_or_else(invalid)?;
        if file_name.is_empty() || file_name.contains('/') || !file_name.ends_with(".json") {
            return Err(invalid());
        }
        let state = state.parse::<StateCode>().map_err(|_| invalid())?;
        Ok(ObjectId {
            state,
            file_name: file_name.to_string(),
            raw: s.to_string(),
        })
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ============================================================================
// OBJECT STORAGE
// ============================================================================

pub trait ObjectStore: Send + Sync {
    fn open(&self, bucket: &str, object: &str) -> Result<Box<dyn BufRead + Send>, SnapshotError>;
}

/// Buckets are directories under `root`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        LocalObjectStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, bucket: &str, object: &str) -> Option<PathBuf> {
        let relative = Path::new(bucket).join(object);
        // no absolute paths, no `..`
        if relative.components().all(|c| matches!(c, Component::Normal(_))) {
            Some(self.root.join(relative))
        } else {
            None
        }
    }
}

impl ObjectStore for LocalObjectStore {
    fn open(&self, bucket: &str, object: &str) -> Result<Box<dyn BufRead + Send>, SnapshotError> {
        let not_found = || SnapshotError::NotFound {
            bucket: bucket.to_string(),
            object: object.to_string(),
        };
        let path = self.resolve(bucket, object).ok_or_else(not_found)?;
        match File::open(&path) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(not_found()),
            Err(source) => Err(SnapshotError::Io { path, source }),
        }
    }
}

/// In-memory buckets, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<HashMap<(String, String), String>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, object: &str, contents: impl Into<String>) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert((bucket.to_string(), object.to_string()), contents.into());
        }
    }
}

impl ObjectStore for MemoryObjectStore {
    fn open(&self, bucket: &str, object: &str) -> Result<Box<dyn BufRead + Send>, SnapshotError> {
        let contents = self
            .objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(&(bucket.to_string(), object.to_string())).cloned())
            .ok_or_else(|| SnapshotError::NotFound {
                bucket: bucket.to_string(),
                object: object.to_string(),
            })?;
        Ok(Box::new(Cursor::new(contents.into_bytes())))
    }
}

// ============================================================================
// NDJSON
// ============================================================================

/// One non-blank snapshot line. `line` is 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotLine {
    pub line: usize,
    pub record: Result<RawRecord, ValidationError>,
}

/// Lines that are not UTF-8 JSON objects become `MalformedLine` row errors;
/// only read failures end the stream with an `Err`.
pub fn read_ndjson<R: BufRead>(reader: R, source: &str) -> impl Iterator<Item = Result<SnapshotLine, SnapshotError>> {
    let source = PathBuf::from(source);
    reader
        .split(b'\n')
        .enumerate()
        .filter_map(move |(index, line)| {
            let line_number = index + 1;
            let bytes = match line {
                Ok(bytes) => bytes,
                Err(source_err) => {
                    return Some(Err(SnapshotError::Io {
                        path: source.clone(),
                        source: source_err,
                    }))
                }
            };
            let text = match std::str::from_utf8(&bytes) {
                Ok(text) => text.trim_end_matches('\r'),
                Err(e) => {
                    return Some(Ok(SnapshotLine {
                        line: line_number,
                        record: Err(ValidationError::malformed_line(format!(
                            "line {} is not valid UTF-8: {}",
                            line_number, e
                        ))),
                    }))
                }
            };
            if text.trim().is_empty() {
                return None;
            }
            let record = match serde_json::from_str::<serde_json::Value>(text) {
                Ok(serde_json::Value::Object(map)) => Ok(map),
                Ok(other) => Err(ValidationError::malformed_line(format!(
                    "line {} is a JSON {}, not an object",
                    line_number,
                    crate::coercion::json_kind(&other)
                ))),
                Err(e) => Err(ValidationError::malformed_line(format!(
                    "line {} is not valid JSON: {}",
                    line_number, e
                ))),
            };
            Some(Ok(SnapshotLine {
                line: line_number,
                record,
            }))
        })
}
