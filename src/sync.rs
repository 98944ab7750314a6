// 🔄 Sync Engine - validate -> upsert -> prune, one record type per job
//
// Row problems are recorded on the job result and never abort the job.
// Store or snapshot failures roll the job back and surface as ImportError.
// Deletes are computed from the complete valid key set, after every upsert.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::{Store, StoreError, UpsertOutcome};
use crate::entities::RecordTypeSpec;
use crate::error::ImportError;
use crate::record::{ImportRecordKey, RecordType, StateCode, ValidatedRecord};
use crate::snapshot::{SnapshotError, SnapshotLine};
use crate::validator::{validate, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobPhase {
    Idle,
    Validating,
    Upserting,
    Pruning,
    Done,
    Failed,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobPhase::Idle => "idle",
            JobPhase::Validating => "validating",
            JobPhase::Upserting => "upserting",
            JobPhase::Pruning => "pruning",
            JobPhase::Done => "done",
            JobPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SyncOptions {
    /// Job fails when valid / read falls below this. With 0.0 the job only
    /// fails when every row of a non-empty snapshot is invalid.
    pub min_valid_ratio: f64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions { min_valid_ratio: 0.0 }
    }
}

// ============================================================================
// JOB RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RowFailure {
    Invalid(ValidationError),
    /// The store rejected this one row; the others still went through
    UpsertFailed { key: String, detail: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    pub line: usize,
    pub failure: RowFailure,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            RowFailure::Invalid(err) => write!(f, "line {}: {}", self.line, err),
            RowFailure::UpsertFailed { key, detail } => {
                write!(f, "line {}: upsert of `{}` failed: {}", self.line, key, detail)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportJobResult {
    pub record_type: RecordType,
    pub state: StateCode,
    pub phase: JobPhase,
    pub rows_read: usize,
    pub valid_rows: usize,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Valid rows not written: superseded duplicates, or the whole set when
    /// a reference check failed
    pub skipped: usize,
    pub row_errors: Vec<RowError>,
    /// Stored reference keys absent from the snapshot
    pub missing_reference_keys: Vec<ImportRecordKey>,
}

impl ImportJobResult {
    fn new(record_type: RecordType, state: StateCode) -> Self {
        ImportJobResult {
            record_type,
            state,
            phase: JobPhase::Idle,
            rows_read: 0,
            valid_rows: 0,
            inserted: 0,
            updated: 0,
            deleted: 0,
            skipped: 0,
            row_errors: Vec::new(),
            missing_reference_keys: Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.phase == JobPhase::Failed
    }

    /// Anything an operator should hear about.
    pub fn has_problems(&self) -> bool {
        !self.row_errors.is_empty() || !self.missing_reference_keys.is_empty()
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub type CancelFlag = Arc<AtomicBool>;

pub struct SyncEngine<'a, S: Store + ?Sized> {
    store: &'a S,
    options: SyncOptions,
    cancel: Option<CancelFlag>,
}

impl<'a, S: Store + ?Sized> SyncEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        SyncEngine {
            store,
            options: SyncOptions::default(),
            cancel: None,
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Checked between rows and between phases.
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Reconcile one snapshot of `spec` for `state` into the store.
    ///
    /// `Ok` covers every job that ran to a verdict, including `Failed` jobs
    /// whose rows were all invalid; `Err` is reserved for cancellation and
    /// infrastructure failures, after which the store is as it was.
    pub fn reconcile<I>(
        &self,
        spec: &RecordTypeSpec,
        state: StateCode,
        lines: I,
    ) -> Result<ImportJobResult, ImportError>
    where
        I: IntoIterator<Item = Result<SnapshotLine, SnapshotError>>,
    {
        let mut result = ImportJobResult::new(spec.record_type, state);
        info!(
            record_type = %spec.record_type,
            state_code = %state,
            "import job started"
        );

        // ====================================================================
        // VALIDATING
        // ====================================================================
        result.phase = JobPhase::Validating;
        let working = self.validate_rows(spec, lines, &mut result)?;
        result.valid_rows = working.len();

        let valid_seen = working.len() + result.skipped;
        if result.rows_read > 0 && !self.meets_threshold(valid_seen, result.rows_read) {
            result.phase = JobPhase::Failed;
            warn!(
                record_type = %spec.record_type,
                state_code = %state,
                rows = result.rows_read,
                valid = valid_seen,
                "import job failed validation threshold"
            );
            return Ok(result);
        }

        // Reference data never shrinks: a missing stored key blocks every write
        if spec.is_reference() {
            let stored = self.store.find_keys(spec.record_type, state, &spec.key_shape())?;
            result.missing_reference_keys = stored
                .into_iter()
                .filter(|key| !working.contains_key(key))
                .collect();
            if !result.missing_reference_keys.is_empty() {
                result.skipped += working.len();
                result.phase = JobPhase::Done;
                warn!(
                    record_type = %spec.record_type,
                    state_code = %state,
                    missing = result.missing_reference_keys.len(),
                    "stored reference rows missing from snapshot, nothing written"
                );
                return Ok(result);
            }
        }

        self.store.begin_job()?;
        match self.write(spec, state, &working, &mut result) {
            Ok(()) => {
                if let Err(e) = self.store.commit_job() {
                    let _ = self.store.rollback_job();
                    return Err(e.into());
                }
            }
            Err(e) => {
                if let Err(rollback) = self.store.rollback_job() {
                    warn!(error = %rollback, "rollback after failed job also failed");
                }
                return Err(e);
            }
        }

        result.phase = JobPhase::Done;
        info!(
            record_type = %spec.record_type,
            state_code = %state,
            rows = result.rows_read,
            inserted = result.inserted,
            updated = result.updated,
            deleted = result.deleted,
            skipped = result.skipped,
            errors = result.row_errors.len(),
            "import job finished"
        );
        Ok(result)
    }

    fn meets_threshold(&self, valid: usize, rows: usize) -> bool {
        valid > 0 && (valid as f64 / rows as f64) >= self.options.min_valid_ratio
    }

    /// Working set keyed by business key. A repeated key keeps its first
    /// position but takes the later row.
    fn validate_rows<I>(
        &self,
        spec: &RecordTypeSpec,
        lines: I,
        result: &mut ImportJobResult,
    ) -> Result<IndexMap<ImportRecordKey, (usize, ValidatedRecord)>, ImportError>
    where
        I: IntoIterator<Item = Result<SnapshotLine, SnapshotError>>,
    {
        let mut working: IndexMap<ImportRecordKey, (usize, ValidatedRecord)> = IndexMap::new();

        for line in lines {
            if self.cancelled() {
                return Err(ImportError::Cancelled(JobPhase::Validating));
            }
            let SnapshotLine { line, record } = line?;
            result.rows_read += 1;

            let validated = record.and_then(|raw| validate(&spec.schema, &raw));
            match validated {
                Ok(record) => {
                    let key = spec.key_of(&record);
                    if working.insert(key, (line, record)).is_some() {
                        debug!(line, "duplicate key, later row wins");
                        result.skipped += 1;
                    }
                }
                Err(err) => {
                    warn!(
                        record_type = %spec.record_type,
                        line,
                        kind = err.kind.label(),
                        field = %err.field,
                        "row rejected"
                    );
                    result.row_errors.push(RowError {
                        line,
                        failure: RowFailure::Invalid(err),
                    });
                }
            }
        }

        Ok(working)
    }

    fn write(
        &self,
        spec: &RecordTypeSpec,
        state: StateCode,
        working: &IndexMap<ImportRecordKey, (usize, ValidatedRecord)>,
        result: &mut ImportJobResult,
    ) -> Result<(), ImportError> {
        // ====================================================================
        // UPSERTING
        // ====================================================================
        result.phase = JobPhase::Upserting;
        for (key, (line, record)) in working {
            if self.cancelled() {
                return Err(ImportError::Cancelled(JobPhase::Upserting));
            }

            let fields = match self.store.get(spec.record_type, state, key)? {
                Some(stored) => spec.merge_for_update(&stored.fields, record.fields()),
                None => record.fields().clone(),
            };

            match self.store.upsert(spec.record_type, state, key, &fields) {
                Ok(UpsertOutcome::Inserted) => result.inserted += 1,
                Ok(UpsertOutcome::Updated) => result.updated += 1,
                Err(e) if is_row_level(&e) => {
                    warn!(record_type = %spec.record_type, line = *line, error = %e, "upsert failed");
                    result.row_errors.push(RowError {
                        line: *line,
                        failure: RowFailure::UpsertFailed {
                            key: key.to_string(),
                            detail: e.to_string(),
                        },
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        // ====================================================================
        // PRUNING
        // ====================================================================
        if self.cancelled() {
            return Err(ImportError::Cancelled(JobPhase::Pruning));
        }
        result.phase = JobPhase::Pruning;
        if !spec.is_reference() {
            let keep: HashSet<ImportRecordKey> = working.keys().cloned().collect();
            let deleted = self
                .store
                .delete_where_key_not_in(spec.record_type, state, &spec.key_shape(), &keep)?;
            for key in &deleted {
                debug!(record_type = %spec.record_type, key = %key, "pruned");
            }
            result.deleted = deleted.len();
        }
        Ok(())
    }
}

/// Failures confined to one row's data; anything else means the store
/// itself is unusable.
fn is_row_level(err: &StoreError) -> bool {
    match err {
        StoreError::Json(_) => true,
        StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
            matches!(e.code, rusqlite::ErrorCode::ConstraintViolation | rusqlite::ErrorCode::TooBig)
        }
        _ => false,
    }
}
