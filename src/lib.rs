// Eligibility Sync - Core Library
// Schema-driven eligibility records plus snapshot import reconciliation.
// Exposes all modules for use in CLI, API server, and tests

pub mod coercion;     // wire scalars -> domain values
pub mod record;       // raw / validated rows, business keys
pub mod attributes;   // field types and rules
pub mod schema;       // composable schema definitions
pub mod validator;    // schema + raw row -> validated row
pub mod rules;        // criteria copy tables
pub mod eligibility;  // requirement derivation
pub mod opportunities;
pub mod entities;     // import record types
pub mod db;
pub mod snapshot;
pub mod sync;
pub mod report;
pub mod auth;
pub mod config;
pub mod error;
pub mod import;
#[cfg(feature = "server")]
pub mod server;

// Re-export commonly used types
pub use attributes::{FieldRule, FieldType};
pub use coercion::CoercionError;
pub use db::{Event, SqliteConnector, SqliteStore, Store, StoreConnector, StoreError, StoredRecord, UpsertOutcome};
pub use eligibility::{derive_requirements, EligibilitySummary};
pub use entities::{PrunePolicy, RecordTypeRegistry, RecordTypeSpec};
pub use error::{ImportError, InfrastructureError};
pub use import::{ImportOutcome, ImportRequest, ImportService};
pub use opportunities::{OpportunityConfig, OpportunityType};
pub use record::{FieldValue, Fields, ImportRecordKey, RawRecord, RecordType, StateCode, ValidatedRecord};
pub use report::{ErrorReporter, ErrorTracker, ImportReport};
pub use rules::{CriteriaCopy, CriterionCopy, OpportunityRequirement};
pub use schema::{SchemaDefinition, SchemaError};
pub use snapshot::{LocalObjectStore, ObjectId, ObjectStore};
pub use sync::{ImportJobResult, JobPhase, SyncEngine, SyncOptions};
pub use validator::{validate, ValidationError, ValidationErrorKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
