// 📁 Case - one pre-sentence investigation assignment

use super::{PrunePolicy, RecordTypeSpec};
use crate::attributes::{external_id_field, state_code_field, FieldRule, FieldType};
use crate::record::{FieldValue, RecordType};
use crate::schema::SchemaDefinition;

pub const FILE_NAME: &str = "sentencing_case_record.json";

/// External report type strings and the internal enum they map to.
pub const REPORT_TYPES: [(&str, &str); 3] = [
    ("PSI Assigned Full", "FullPSI"),
    ("PSI File Review Assigned", "FileReview"),
    ("PSI File Review w/LSI Assigned", "FileReviewWithUpdatedLSIRScore"),
];

pub fn schema() -> SchemaDefinition {
    SchemaDefinition::new("case")
        .field(external_id_field())
        .field(state_code_field())
        .field(FieldRule::required("staffId", FieldType::String).from_source("staff_id"))
        .field(FieldRule::required("clientId", FieldType::String).from_source("client_id"))
        .field(FieldRule::optional("dueDate", FieldType::Date).from_source("due_date"))
        .field(FieldRule::optional("completionDate", FieldType::Date).from_source("completion_date"))
        .field(FieldRule::required("sentenceDate", FieldType::Date).from_source("sentence_date"))
        .field(FieldRule::required("assignedDate", FieldType::Date).from_source("assigned_date"))
        .field(FieldRule::required("county", FieldType::String))
        // omitted => keep whatever staff entered
        .field(FieldRule::optional("lsirScore", FieldType::NumberFromString).from_source("lsir_score"))
        .field(FieldRule::optional("lsirLevel", FieldType::String).from_source("lsir_level"))
        .field(FieldRule::optional("reportType", FieldType::mapped(REPORT_TYPES)).from_source("report_type"))
        .with_transform("lockImportedValues", |mut record| {
            let lsir_locked = record.get("lsirScore").is_some();
            let report_locked = record.get("reportType").is_some();
            record.insert("isLsirScoreLocked", FieldValue::Bool(lsir_locked));
            record.insert("isReportTypeLocked", FieldValue::Bool(report_locked));
            Ok(record)
        })
}

pub fn spec() -> RecordTypeSpec {
    RecordTypeSpec::new(RecordType::Case, FILE_NAME, &["externalId"], PrunePolicy::FullReplace, schema())
}
