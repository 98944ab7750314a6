// 🤝 Community Opportunity - program a client can be recommended to
// Export uses provider-spreadsheet capitalisation (`OpportunityName`).

use super::{PrunePolicy, RecordTypeSpec};
use crate::attributes::{FieldRule, FieldType};
use crate::record::{FieldValue, RecordType};
use crate::schema::SchemaDefinition;

pub const FILE_NAME: &str = "sentencing_community_opportunity_record.json";
pub const UNKNOWN_PROVIDER_NAME: &str = "No Provider Name";

const CRITERIA_FLAGS: [&str; 6] = [
    "developmentalDisabilityDiagnosisCriterion",
    "noCurrentOrPriorSexOffenseCriterion",
    "noCurrentOrPriorViolentOffenseCriterion",
    "noPendingFelonyChargesInAnotherCountyOrStateCriterion",
    "entryOfGuiltyPleaCriterion",
    "veteranStatusCriterion",
];

pub fn schema() -> SchemaDefinition {
    let mut schema = SchemaDefinition::new("opportunity")
        .field(FieldRule::required("opportunityName", FieldType::String).from_source("OpportunityName"))
        .field(FieldRule::optional("description", FieldType::String).from_source("Description"))
        .field(
            FieldRule::optional("providerName", FieldType::String)
                .from_source("ProviderName")
                .null_as(FieldValue::text(UNKNOWN_PROVIDER_NAME))
                .with_default(FieldValue::text(UNKNOWN_PROVIDER_NAME)),
        )
        .field(FieldRule::optional("providerPhoneNumber", FieldType::String).from_source("CleanedProviderPhoneNumber"))
        .field(FieldRule::optional("providerWebsite", FieldType::String).from_source("ProviderWebsite"))
        .field(FieldRule::optional("providerAddress", FieldType::String).from_source("ProviderAddress"))
        // integers arrive as strings
        .field(FieldRule::optional("totalCapacity", FieldType::NumberFromString).from_source("CapacityTotal"))
        .field(FieldRule::optional("availableCapacity", FieldType::NumberFromString).from_source("CapacityAvailable"))
        .field(
            FieldRule::required("needsAddressed", FieldType::array_of(FieldType::String)).from_source("NeedsAddressed"),
        );
    for flag in CRITERIA_FLAGS {
        schema = schema.field(FieldRule::required(flag, FieldType::Boolean));
    }
    schema
        .field(FieldRule::optional("priorCriminalHistoryCriterion", FieldType::String))
        .field(FieldRule::required(
            "diagnosedMentalHealthDiagnosisCriterion",
            FieldType::array_of(FieldType::String),
        ))
        .field(FieldRule::optional("asamLevelOfCareRecommendationCriterion", FieldType::String))
        .field(FieldRule::optional("diagnosedSubstanceUseDisorderCriterion", FieldType::String))
        .field(FieldRule::optional("minLsirScoreCriterion", FieldType::NumberFromString))
        .field(FieldRule::optional("maxLsirScoreCriterion", FieldType::NumberFromString))
        .field(FieldRule::optional("minAge", FieldType::NumberFromString))
        .field(FieldRule::optional("maxAge", FieldType::NumberFromString))
        .field(FieldRule::optional("district", FieldType::String))
        .field(FieldRule::required("lastUpdatedAt", FieldType::Date).from_source("lastUpdatedDate"))
        .field(FieldRule::optional("additionalNotes", FieldType::String))
        .field(
            FieldRule::optional(
                "genders",
                FieldType::array_of(FieldType::mapped([("Women", "FEMALE"), ("Men", "MALE")])),
            )
            .with_default(FieldValue::List(Vec::new())),
        )
        .field(FieldRule::optional("genericDescription", FieldType::String))
}

pub fn spec() -> RecordTypeSpec {
    RecordTypeSpec::new(
        RecordType::Opportunity,
        FILE_NAME,
        &["opportunityName", "providerPhoneNumber"],
        PrunePolicy::FullReplace,
        schema(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::validate;
    use serde_json::json;

    fn raw_opportunity(name: &str, phone: &str) -> serde_json::Value {
        json!({
            "OpportunityName": name,
            "CleanedProviderPhoneNumber": phone,
            "CapacityTotal": "10",
            "NeedsAddressed": ["EDUCATION"],
            "developmentalDisabilityDiagnosisCriterion": false,
            "noCurrentOrPriorSexOffenseCriterion": false,
            "noCurrentOrPriorViolentOffenseCriterion": false,
            "noPendingFelonyChargesInAnotherCountyOrStateCriterion": false,
            "entryOfGuiltyPleaCriterion": false,
            "veteranStatusCriterion": false,
            "diagnosedMentalHealthDiagnosisCriterion": [],
            "lastUpdatedDate": "2024-06-01",
            "genders": ["Women"]
        })
    }

    #[test]
    fn test_defaults_and_coercions() {
        let record = validate(&schema(), raw_opportunity("GED Prep", "555-0100").as_object().unwrap()).unwrap();
        assert_eq!(record.get_str("providerName"), Some(UNKNOWN_PROVIDER_NAME));
        assert_eq!(record.get("totalCapacity"), Some(&FieldValue::Int(10)));
        assert_eq!(
            record.get("genders"),
            Some(&FieldValue::List(vec![FieldValue::text("FEMALE")]))
        );
    }

    #[test]
    fn test_composite_key() {
        let record = validate(&schema(), raw_opportunity("GED Prep", "555-0100").as_object().unwrap()).unwrap();
        let key = spec().key_of(&record);
        assert_eq!(key.shape(), "opportunityName+providerPhoneNumber");
        assert_eq!(key.to_string(), "opportunityName=GED Prep, providerPhoneNumber=555-0100");
    }
}
