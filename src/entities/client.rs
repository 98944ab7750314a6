// 👤 Client - person a case is about

use super::{collapse_full_name, full_name_schema, PrunePolicy, RecordTypeSpec};
use crate::attributes::{external_id_field, state_code_field, FieldRule, FieldType};
use crate::record::{FieldValue, RecordType};
use crate::schema::SchemaDefinition;

pub const FILE_NAME: &str = "sentencing_client_record.json";

pub const GENDERS: [&str; 6] = ["MALE", "FEMALE", "NON_BINARY", "TRANS", "INTERNAL_UNKNOWN", "EXTERNAL_UNKNOWN"];
pub const UNKNOWN_GENDERS: &[&str] = &["INTERNAL_UNKNOWN", "EXTERNAL_UNKNOWN"];

pub fn schema() -> SchemaDefinition {
    let base = SchemaDefinition::new("client")
        .field(external_id_field())
        .field(FieldRule::required("pseudonymizedId", FieldType::String).from_source("pseudonymized_id"))
        .field(
            FieldRule::required("caseIds", FieldType::json_string(FieldType::array_of(FieldType::String)))
                .from_source("case_ids"),
        )
        .field(state_code_field())
        .field(
            FieldRule::required("fullName", FieldType::json_string(FieldType::object(full_name_schema())))
                .from_source("full_name"),
        )
        .field(FieldRule::required("gender", FieldType::enumeration(GENDERS)))
        .field(FieldRule::optional("county", FieldType::String).with_default(FieldValue::text("UNKNOWN")))
        .field(FieldRule::required("birthDate", FieldType::Date).from_source("birth_date"))
        .field(FieldRule::optional("district", FieldType::String));

    collapse_full_name(&base).with_transform("lockKnownGender", |mut record| {
        let known = record
            .get_str("gender")
            .map(|g| !UNKNOWN_GENDERS.contains(&g))
            .unwrap_or(false);
        record.insert("isGenderLocked", FieldValue::Bool(known));
        Ok(record)
    })
}

pub fn spec() -> RecordTypeSpec {
    RecordTypeSpec::new(RecordType::Client, FILE_NAME, &["externalId"], PrunePolicy::FullReplace, schema())
        .keep_stored_when("gender", UNKNOWN_GENDERS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{validate, ValidationErrorKind};
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_client_name_and_case_ids() {
        let raw = json!({
            "external_id": "client-1",
            "pseudonymized_id": "p-1",
            "case_ids": "[\"case-1\", \"case-2\"]",
            "state_code": "US_ID",
            "full_name": "{\"given_names\": \"Ann\", \"middle_names\": \"\", \"surname\": \"Lee\", \"name_suffix\": \"\"}",
            "gender": "FEMALE",
            "birth_date": "1990-02-03"
        });
        let record = validate(&schema(), raw.as_object().unwrap()).unwrap();
        assert_eq!(record.get_str("fullName"), Some("Ann Lee"));
        assert_eq!(record.get_str("county"), Some("UNKNOWN"));
        assert_eq!(record.get("caseIds").and_then(|v| v.as_list()).map(|l| l.len()), Some(2));
        assert_eq!(record.get("isGenderLocked"), Some(&FieldValue::Bool(true)));
    }

    #[test]
    fn test_malformed_case_ids_is_row_error() {
        let raw = json!({
            "external_id": "client-1",
            "pseudonymized_id": "p-1",
            "case_ids": "[not json",
            "state_code": "US_ID",
            "full_name": "{}",
            "gender": "MALE",
            "birth_date": "1990-02-03"
        });
        let err = validate(&schema(), raw.as_object().unwrap()).unwrap_err();
        assert_eq!(err.field, "caseIds");
        assert_matches!(err.kind, ValidationErrorKind::TypeMismatch { .. });
    }
}
