// 📥 Import Service - object id -> record type -> sync job -> status
// Status contract: 200 job completed (row errors reported on the side),
// 400 unknown object, 401 auth failure, 500 job-fatal failure.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::ImportAuthorizer;
use crate::db::{SqliteConnector, StoreConnector, StoreError};
use crate::entities::{RecordTypeRegistry, RecordTypeSpec};
use crate::error::ImportError;
use crate::report::{ErrorReporter, ErrorTracker, ImportSource};
use crate::snapshot::{read_ndjson, ObjectId, ObjectStore};
use crate::sync::{ImportJobResult, SyncEngine, SyncOptions};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub bucket_id: String,
    pub object_id: String,
}

impl ImportRequest {
    pub fn new(bucket_id: impl Into<String>, object_id: impl Into<String>) -> Self {
        ImportRequest {
            bucket_id: bucket_id.into(),
            object_id: object_id.into(),
        }
    }

    fn source(&self) -> ImportSource {
        ImportSource {
            bucket: self.bucket_id.clone(),
            object: self.object_id.clone(),
        }
    }
}

/// Response to one trigger.
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<ImportJobResult>,
}

/// Each run opens its own store from `connector`, so jobs for different
/// record types only meet at SQLite's write lock.
pub struct ImportService<C: StoreConnector = SqliteConnector> {
    registry: Arc<RecordTypeRegistry>,
    connector: Arc<C>,
    objects: Arc<dyn ObjectStore>,
    authorizer: Arc<dyn ImportAuthorizer>,
    tracker: Arc<dyn ErrorTracker>,
    reporter: ErrorReporter,
    options: SyncOptions,
}

impl<C: StoreConnector> Clone for ImportService<C> {
    fn clone(&self) -> Self {
        ImportService {
            registry: Arc::clone(&self.registry),
            connector: Arc::clone(&self.connector),
            objects: Arc::clone(&self.objects),
            authorizer: Arc::clone(&self.authorizer),
            tracker: Arc::clone(&self.tracker),
            reporter: self.reporter.clone(),
            options: self.options,
        }
    }
}

impl<C: StoreConnector> ImportService<C> {
    pub fn new(
        registry: Arc<RecordTypeRegistry>,
        connector: Arc<C>,
        objects: Arc<dyn ObjectStore>,
        authorizer: Arc<dyn ImportAuthorizer>,
        tracker: Arc<dyn ErrorTracker>,
    ) -> Self {
        ImportService {
            registry,
            connector,
            objects,
            authorizer,
            tracker,
            reporter: ErrorReporter::default(),
            options: SyncOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn registry(&self) -> &RecordTypeRegistry {
        &self.registry
    }

    /// A fresh store on the same database, for queries outside a job.
    pub fn connect(&self) -> Result<C::Store, StoreError> {
        self.connector.connect()
    }

    /// Authenticate, run, and map the verdict to a status.
    pub fn handle(&self, authorization: Option<&str>, request: &ImportRequest) -> ImportOutcome {
        let authorized = self
            .authorizer
            .authorize(authorization)
            .map_err(ImportError::from)
            .and_then(|actor| {
                info!(actor = %actor, bucket = %request.bucket_id, object = %request.object_id, "import triggered");
                self.run(request)
            });

        match authorized {
            Ok(job) => ImportOutcome {
                status: 200,
                message: format!(
                    "Imported {}: {} inserted, {} updated, {} deleted",
                    request.object_id, job.inserted, job.updated, job.deleted
                ),
                job: Some(job),
            },
            Err(err) => {
                if !matches!(err, ImportError::NoValidRows { .. }) {
                    // NoValidRows was already reported with its row errors
                    let target = self
                        .resolve(request)
                        .ok()
                        .map(|(object, spec)| (spec.record_type, object.state));
                    self.tracker
                        .capture(&self.reporter.report_failure(&err, &request.source(), target));
                }
                warn!(status = err.status_code(), error = %err, "import rejected");
                ImportOutcome {
                    status: err.status_code(),
                    message: err.to_string(),
                    job: None,
                }
            }
        }
    }

    /// Resolve the object to a record type, then run its sync job. Row
    /// problems go to the tracker; the job result is returned either way
    /// unless the job failed.
    pub fn run(&self, request: &ImportRequest) -> Result<ImportJobResult, ImportError> {
        let (object, spec) = self.resolve(request)?;
        let reader = self.objects.open(&request.bucket_id, &request.object_id)?;
        let lines = read_ndjson(reader, object.as_str());

        let store = self.connector.connect()?;
        let job = SyncEngine::new(&store)
            .with_options(self.options)
            .reconcile(spec, object.state, lines)?;

        if let Some(report) = self.reporter.report(&job, &request.source()) {
            self.tracker.capture(&report);
        }

        if job.is_failed() {
            return Err(ImportError::NoValidRows {
                rows: job.rows_read,
                valid: job.valid_rows,
                min_ratio: self.options.min_valid_ratio,
            });
        }
        Ok(job)
    }

    fn resolve(&self, request: &ImportRequest) -> Result<(ObjectId, &RecordTypeSpec), ImportError> {
        let unsupported = || ImportError::UnsupportedObject {
            bucket: request.bucket_id.clone(),
            object: request.object_id.clone(),
        };
        let object: ObjectId = request.object_id.parse().map_err(|_| unsupported())?;
        let spec = self
            .registry
            .resolve(object.state, &object.file_name)
            .ok_or_else(unsupported)?;
        Ok((object, spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AllowAll;
    use crate::db::Store;
    use crate::record::{RecordType, StateCode};
    use crate::report::{MemoryErrorTracker, ReportKind};
    use crate::snapshot::MemoryObjectStore;

    fn service(objects: MemoryObjectStore, tracker: MemoryErrorTracker) -> ImportService {
        ImportService::new(
            Arc::new(RecordTypeRegistry::builtin().unwrap()),
            Arc::new(SqliteConnector::in_memory().unwrap()),
            Arc::new(objects),
            Arc::new(AllowAll),
            Arc::new(tracker),
        )
    }

    #[test]
    fn test_unknown_object_is_400() {
        let tracker = MemoryErrorTracker::new();
        let service = service(MemoryObjectStore::new(), tracker.clone());

        let outcome = service.handle(None, &ImportRequest::new("exports", "US_TN/sentencing_case_record.json"));
        assert_eq!(outcome.status, 400);
        assert_eq!(
            outcome.message,
            "Unsupported bucket + object pair: exports/US_TN/sentencing_case_record.json"
        );
        assert_eq!(tracker.reports().len(), 1);
    }

    #[test]
    fn test_missing_object_is_500() {
        let tracker = MemoryErrorTracker::new();
        let service = service(MemoryObjectStore::new(), tracker.clone());
        let outcome = service.handle(None, &ImportRequest::new("exports", "US_ID/sentencing_charge_record.json"));
        assert_eq!(outcome.status, 500);

        let reports = tracker.reports();
        assert_eq!(reports[0].record_type, "offense");
        assert_eq!(reports[0].state_code, "US_ID");
    }

    #[test]
    fn test_open_store_does_not_block_imports() {
        let objects = MemoryObjectStore::new();
        objects.put(
            "exports",
            "US_ID/sentencing_charge_record.json",
            "{\"state_code\": \"US_ID\", \"charge\": \"THEFT\"}\n",
        );
        let service = service(objects, MemoryErrorTracker::new());
        let held = service.connect().unwrap();

        let outcome = service.handle(None, &ImportRequest::new("exports", "US_ID/sentencing_charge_record.json"));
        assert_eq!(outcome.status, 200);
        assert_eq!(held.count(RecordType::Offense, StateCode::UsId).unwrap(), 1);
    }

    #[test]
    fn test_all_invalid_rows_is_500_with_row_report() {
        let objects = MemoryObjectStore::new();
        objects.put("exports", "US_ID/sentencing_charge_record.json", "{\"charge\": 7}\n");
        let tracker = MemoryErrorTracker::new();
        let service = service(objects, tracker.clone());

        let outcome = service.handle(None, &ImportRequest::new("exports", "US_ID/sentencing_charge_record.json"));
        assert_eq!(outcome.status, 500);

        let reports = tracker.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, ReportKind::JobFailed);
        assert_eq!(reports[0].count, 1);
    }
}
