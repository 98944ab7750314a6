// 🧑‍💼 Staff - investigator assigned to cases

use super::{collapse_full_name, full_name_schema, PrunePolicy, RecordTypeSpec};
use crate::attributes::{external_id_field, state_code_field, FieldRule, FieldType};
use crate::record::RecordType;
use crate::schema::SchemaDefinition;

pub const FILE_NAME: &str = "sentencing_staff_record.json";

pub fn schema() -> SchemaDefinition {
    collapse_full_name(
        &SchemaDefinition::new("staff")
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
            .field(FieldRule::required("email", FieldType::String)),
    )
}

pub fn spec() -> RecordTypeSpec {
    RecordTypeSpec::new(RecordType::Staff, FILE_NAME, &["externalId"], PrunePolicy::FullReplace, schema())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::validate;
    use serde_json::json;

    #[test]
    fn test_staff_row() {
        let raw = json!({
            "external_id": "staff-1",
            "pseudonymized_id": "ps-1",
            "case_ids": "[]",
            "state_code": "US_ND",
            "full_name": "{\"given_names\": \"Sam\", \"middle_names\": \"Q\", \"surname\": \"Ray\", \"name_suffix\": \"\"}",
            "email": "sam@example.com"
        });
        let record = validate(&schema(), raw.as_object().unwrap()).unwrap();
        assert_eq!(record.get_str("fullName"), Some("Sam Q Ray"));
        assert_eq!(record.get_str("email"), Some("sam@example.com"));
    }
}
