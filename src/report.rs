// 🚨 Import Error Reporter - one structured report per job
// The report is the only thing handed to the error tracker.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::error;

use crate::error::ImportError;
use crate::record::{RecordType, StateCode};
use crate::sync::ImportJobResult;

pub const DEFAULT_EXAMPLE_LIMIT: usize = 5;

/// Where the snapshot came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSource {
    pub bucket: String,
    pub object: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportKind {
    /// Some rows were rejected
    MalformedRows,
    /// Stored reference rows absent from the snapshot
    MissingReferenceRows,
    /// The job itself failed
    JobFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub kind: ReportKind,
    pub record_type: String,
    pub state_code: String,
    pub source: ImportSource,
    pub message: String,
    /// Total problems, which may exceed `examples.len()`
    pub count: usize,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ErrorReporter {
    example_limit: usize,
}

impl Default for ErrorReporter {
    fn default() -> Self {
        ErrorReporter {
            example_limit: DEFAULT_EXAMPLE_LIMIT,
        }
    }
}

impl ErrorReporter {
    pub fn new(example_limit: usize) -> Self {
        ErrorReporter { example_limit }
    }

    /// Missing reference rows lead the report, since they are the reason
    /// nothing was written; rejected rows from the same job are appended.
    pub fn report(&self, job: &ImportJobResult, source: &ImportSource) -> Option<ImportReport> {
        let noun = job.record_type.plural_noun();

        if !job.missing_reference_keys.is_empty() {
            let names: Vec<String> = job.missing_reference_keys.iter().map(|k| k.to_string()).collect();
            let mut message = format!(
                "These {} exist in the database but are missing from the data import: {}",
                noun,
                names.join(", ")
            );
            if !job.row_errors.is_empty() {
                message.push_str(&format!(
                    ". {} of {} rows could not be imported",
                    job.row_errors.len(),
                    job.rows_read
                ));
            }
            let count = names.len() + job.row_errors.len();
            let mut examples = names;
            examples.extend(self.row_examples(job));
            return Some(ImportReport {
                kind: ReportKind::MissingReferenceRows,
                record_type: job.record_type.id(),
                state_code: job.state.to_string(),
                source: source.clone(),
                message,
                count,
                examples,
            });
        }

        if job.row_errors.is_empty() {
            return None;
        }

        let count = job.row_errors.len();
        let examples = self.row_examples(job);
        let kind = if job.is_failed() {
            ReportKind::JobFailed
        } else {
            ReportKind::MalformedRows
        };
        Some(ImportReport {
            kind,
            record_type: job.record_type.id(),
            state_code: job.state.to_string(),
            source: source.clone(),
            message: format!(
                "{} of {} {} rows in {}/{} could not be imported",
                count, job.rows_read, job.record_type, source.bucket, source.object
            ),
            count,
            examples,
        })
    }

    fn row_examples(&self, job: &ImportJobResult) -> Vec<String> {
        job.row_errors
            .iter()
            .take(self.example_limit)
            .map(|e| e.to_string())
            .collect()
    }

    /// Report for a job that never produced a result. `target` is the
    /// record type and state when the object was already resolved.
    pub fn report_failure(
        &self,
        err: &ImportError,
        source: &ImportSource,
        target: Option<(RecordType, StateCode)>,
    ) -> ImportReport {
        let (record_type, state_code) = match target {
            Some((record_type, state)) => (record_type.id(), state.to_string()),
            None => (String::new(), String::new()),
        };
        ImportReport {
            kind: ReportKind::JobFailed,
            record_type,
            state_code,
            source: source.clone(),
            message: format!("Import of {}/{} failed: {}", source.bucket, source.object, err),
            count: 1,
            examples: Vec::new(),
        }
    }
}

// ============================================================================
// ERROR TRACKER
// ============================================================================

/// External error-tracking collaborator.
pub trait ErrorTracker: Send + Sync {
    fn capture(&self, report: &ImportReport);
}

/// Default tracker: one structured `error!` event per report.
#[derive(Debug, Clone, Default)]
pub struct TracingErrorTracker;

impl ErrorTracker for TracingErrorTracker {
    fn capture(&self, report: &ImportReport) {
        error!(
            kind = ?report.kind,
            record_type = %report.record_type,
            state_code = %report.state_code,
            bucket = %report.source.bucket,
            object = %report.source.object,
            count = report.count,
            examples = ?report.examples,
            "{}",
            report.message
        );
    }
}

/// Keeps every captured report; used by tests and the CLI summary.
#[derive(Debug, Clone, Default)]
pub struct MemoryErrorTracker {
    reports: Arc<Mutex<Vec<ImportReport>>>,
}

impl MemoryErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ImportReport> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ErrorTracker for MemoryErrorTracker {
    fn capture(&self, report: &ImportReport) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::db::Store;
    use crate::entities::{case, offense};
    use crate::error::InfrastructureError;
    use crate::record::ImportRecordKey;
    use crate::snapshot::read_ndjson;
    use crate::sync::SyncEngine;
    use std::io::Cursor;

    fn source() -> ImportSource {
        ImportSource {
            bucket: "exports".into(),
            object: "US_ID/sentencing_case_record.json".into(),
        }
    }

    #[test]
    fn test_clean_job_has_no_report() {
        let store = SqliteStore::open_in_memory().unwrap();
        let job = SyncEngine::new(&store)
            .reconcile(&case::spec(), StateCode::UsId, read_ndjson(Cursor::new(""), "t"))
            .unwrap();
        assert!(ErrorReporter::default().report(&job, &source()).is_none());
    }

    #[test]
    fn test_examples_are_capped() {
        let store = SqliteStore::open_in_memory().unwrap();
        let input = "1\n2\n3\n4\n";
        let job = SyncEngine::new(&store)
            .reconcile(&case::spec(), StateCode::UsId, read_ndjson(Cursor::new(input), "t"))
            .unwrap();

        let report = ErrorReporter::new(2).report(&job, &source()).unwrap();
        assert_eq!(report.kind, ReportKind::JobFailed);
        assert_eq!(report.count, 4);
        assert_eq!(report.examples.len(), 2);
        assert!(report.message.contains("exports/US_ID/sentencing_case_record.json"));

        let tracker = MemoryErrorTracker::new();
        tracker.capture(&report);
        assert_eq!(tracker.reports().len(), 1);
    }

    #[test]
    fn test_reference_report_keeps_row_errors() {
        let store = SqliteStore::open_in_memory().unwrap();
        for name in ["THEFT", "ARSON"] {
            let key = ImportRecordKey::single("name", name);
            store
                .upsert(RecordType::Offense, StateCode::UsId, &key, &Default::default())
                .unwrap();
        }
        let input = "{\"state_code\": \"US_ID\", \"charge\": \"THEFT\"}\n{\"charge\": 7}\n";
        let job = SyncEngine::new(&store)
            .reconcile(&offense::spec(), StateCode::UsId, read_ndjson(Cursor::new(input), "t"))
            .unwrap();
        assert_eq!(job.row_errors.len(), 1);

        let report = ErrorReporter::default().report(&job, &source()).unwrap();
        assert_eq!(report.kind, ReportKind::MissingReferenceRows);
        assert_eq!(report.count, 2);
        assert_eq!(report.examples[0], "ARSON");
        assert!(report.examples[1].contains("line 2"));
        assert!(report.message.ends_with("1 of 2 rows could not be imported"));
    }

    #[test]
    fn test_failure_report_names_resolved_target() {
        let err = ImportError::Infrastructure(InfrastructureError::Store(crate::db::StoreError::Other(
            "disk full".into(),
        )));
        let report = ErrorReporter::default().report_failure(&err, &source(), Some((RecordType::Case, StateCode::UsId)));
        assert_eq!(report.record_type, "case");
        assert_eq!(report.state_code, "US_ID");

        let report = ErrorReporter::default().report_failure(&err, &source(), None);
        assert!(report.record_type.is_empty());
    }
}
