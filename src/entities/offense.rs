// ⚖️ Offense - charge catalog (reference data: never pruned)

use super::{PrunePolicy, RecordTypeSpec};
use crate::attributes::{state_code_field, FieldRule, FieldType};
use crate::record::{FieldValue, RecordType};
use crate::schema::SchemaDefinition;

pub const FILE_NAME: &str = "sentencing_charge_record.json";

pub fn schema() -> SchemaDefinition {
    SchemaDefinition::new("offense")
        .field(state_code_field())
        .field(FieldRule::required("name", FieldType::String).from_source("charge"))
        // omitted flags are written as explicit nulls so stale values are cleared
        .field(
            FieldRule::optional("isSexOffense", FieldType::Boolean)
                .from_source("is_sex_offense")
                .nullable()
                .with_default(FieldValue::Null),
        )
        .field(
            FieldRule::optional("isViolentOffense", FieldType::Boolean)
                .from_source("is_violent")
                .nullable()
                .with_default(FieldValue::Null),
        )
}

pub fn spec() -> RecordTypeSpec {
    RecordTypeSpec::new(RecordType::Offense, FILE_NAME, &["name"], PrunePolicy::Reference, schema())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::validate;
    use serde_json::json;

    #[test]
    fn test_omitted_flags_are_explicit_null() {
        let raw = json!({"state_code": "US_ID", "charge": "THEFT", "is_violent": false});
        let record = validate(&schema(), raw.as_object().unwrap()).unwrap();
        assert_eq!(record.get_str("name"), Some("THEFT"));
        assert_eq!(record.get("isSexOffense"), Some(&FieldValue::Null));
        assert_eq!(record.get("isViolentOffense"), Some(&FieldValue::Bool(false)));
    }
}
