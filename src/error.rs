// Job-level errors. Row-level problems never end up here: they are
// collected on the job result and reported separately.

use thiserror::Error;

use crate::auth::AuthError;
use crate::db::StoreError;
use crate::schema::SchemaError;
use crate::snapshot::SnapshotError;
use crate::sync::JobPhase;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Unsupported bucket + object pair: {bucket}/{object}")]
    UnsupportedObject { bucket: String, object: String },

    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("infrastructure failure: {0}")]
    Infrastructure(#[from] InfrastructureError),

    #[error("{valid} of {rows} rows passed validation, below the required ratio of {min_ratio}")]
    NoValidRows { rows: usize, valid: usize, min_ratio: f64 },

    #[error("import job cancelled during {0}")]
    Cancelled(JobPhase),
}

/// Backend failures that abort the whole job.
#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("object storage: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("record type configuration: {0}")]
    Schema(#[from] SchemaError),
}

impl From<StoreError> for ImportError {
    fn from(err: StoreError) -> Self {
        ImportError::Infrastructure(err.into())
    }
}

impl From<SnapshotError> for ImportError {
    fn from(err: SnapshotError) -> Self {
        ImportError::Infrastructure(err.into())
    }
}

impl From<SchemaError> for ImportError {
    fn from(err: SchemaError) -> Self {
        ImportError::Infrastructure(err.into())
    }
}

impl ImportError {
    /// HTTP-style status for the trigger response.
    pub fn status_code(&self) -> u16 {
        match self {
            ImportError::UnsupportedObject { .. } => 400,
            ImportError::Unauthorized(_) => 401,
            ImportError::Infrastructure(_) | ImportError::NoValidRows { .. } | ImportError::Cancelled(_) => 500,
        }
    }
}
