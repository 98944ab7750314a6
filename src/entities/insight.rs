// 📊 Insight - historical outcome rates for one cohort bucket
// Series and rollup arrive as stringified JSON.

use super::client::GENDERS;
use super::{PrunePolicy, RecordTypeSpec};
use crate::attributes::{state_code_field, state_code_type, FieldRule, FieldType};
use crate::record::{FieldValue, Fields, RecordType};
use crate::schema::SchemaDefinition;

pub const FILE_NAME: &str = "sentencing_insight_record.json";

const RECOMMENDATION_TYPES: [(&str, &str, &str); 3] = [
    ("Probation", "recidivismProbationSeries", "dispositionProbationPc"),
    ("Rider", "recidivismRiderSeries", "dispositionRiderPc"),
    ("Term", "recidivismTermSeries", "dispositionTermPc"),
];

fn series() -> FieldType {
    let point = SchemaDefinition::new("dataPoint")
        .field(FieldRule::required("cohortMonths", FieldType::Number).from_source("cohort_months"))
        .field(FieldRule::required("eventRate", FieldType::Number).from_source("event_rate"))
        .field(FieldRule::required("lowerCI", FieldType::Number).from_source("lower_ci"))
        .field(FieldRule::required("upperCI", FieldType::Number).from_source("upper_ci"));
    FieldType::json_string(FieldType::array_of(FieldType::object(point)))
}

fn rollup() -> FieldType {
    let rollup = SchemaDefinition::new("recidivismRollup")
        .field(FieldRule::required("stateCode", state_code_type()).from_source("state_code"))
        .field(FieldRule::optional("gender", FieldType::enumeration(GENDERS)))
        .field(
            FieldRule::optional("assessmentScoreBucketStart", FieldType::Number)
                .from_source("assessment_score_bucket_start"),
        )
        .field(
            FieldRule::optional("assessmentScoreBucketEnd", FieldType::Number).from_source("assessment_score_bucket_end"),
        )
        .field(FieldRule::optional("offense", FieldType::String).from_source("most_severe_description"))
        .field(
            FieldRule::optional("ncicCategory", FieldType::String).from_source("most_severe_ncic_category_uniform"),
        )
        .field(
            FieldRule::optional("combinedOffenseCategory", FieldType::String).from_source("combined_offense_category"),
        )
        .field(FieldRule::optional("violentOffense", FieldType::Boolean).from_source("violent_offense"));
    FieldType::json_string(FieldType::object(rollup))
}

pub fn schema() -> SchemaDefinition {
    SchemaDefinition::new("insight")
        .field(state_code_field())
        .field(FieldRule::required("gender", FieldType::enumeration(GENDERS)))
        .field(
            FieldRule::required("assessmentScoreBucketStart", FieldType::NumberFromString)
                .from_source("assessment_score_bucket_start"),
        )
        .field(
            FieldRule::required("assessmentScoreBucketEnd", FieldType::NumberFromString)
                .from_source("assessment_score_bucket_end"),
        )
        .field(FieldRule::required("offense", FieldType::String).from_source("most_severe_description"))
        .field(FieldRule::required("recidivismRollup", rollup()).from_source("recidivism_rollup"))
        .field(
            FieldRule::required("recidivismNumRecords", FieldType::NumberFromString).from_source("recidivism_num_records"),
        )
        .field(FieldRule::optional("recidivismProbationSeries", series()).from_source("recidivism_probation_series"))
        .field(FieldRule::optional("recidivismRiderSeries", series()).from_source("recidivism_rider_series"))
        .field(FieldRule::optional("recidivismTermSeries", series()).from_source("recidivism_term_series"))
        .field(
            FieldRule::required("dispositionNumRecords", FieldType::NumberFromString)
                .from_source("disposition_num_records"),
        )
        .field(FieldRule::required("dispositionProbationPc", FieldType::Number).from_source("disposition_probation_pc"))
        .field(FieldRule::required("dispositionRiderPc", FieldType::Number).from_source("disposition_rider_pc"))
        .field(FieldRule::required("dispositionTermPc", FieldType::Number).from_source("disposition_term_pc"))
        .with_transform("groupByRecommendation", |mut record| {
            let mut series = Vec::new();
            let mut dispositions = Vec::new();
            for (recommendation, series_field, disposition_field) in RECOMMENDATION_TYPES {
                if let Some(points) = record.remove(series_field) {
                    let mut entry = Fields::new();
                    entry.insert("recommendationType".into(), FieldValue::text(recommendation));
                    entry.insert("dataPoints".into(), points);
                    series.push(FieldValue::Record(entry));
                }
                if let Some(percentage) = record.remove(disposition_field) {
                    let mut entry = Fields::new();
                    entry.insert("recommendationType".into(), FieldValue::text(recommendation));
                    entry.insert("percentage".into(), percentage);
                    dispositions.push(FieldValue::Record(entry));
                }
            }
            record.insert("rollupRecidivismSeries", FieldValue::List(series));
            record.insert("dispositionData", FieldValue::List(dispositions));
            Ok(record)
        })
}

pub fn spec() -> RecordTypeSpec {
    RecordTypeSpec::new(
        RecordType::Insight,
        FILE_NAME,
        &["gender", "assessmentScoreBucketStart", "assessmentScoreBucketEnd", "offense"],
        PrunePolicy::FullReplace,
        schema(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::validate;
    use serde_json::json;

    #[test]
    fn test_series_grouped_by_recommendation() {
        let raw = json!({
            "state_code": "US_ID",
            "gender": "MALE",
            "assessment_score_bucket_start": "0",
            "assessment_score_bucket_end": "22",
            "most_severe_description": "THEFT",
            "recidivism_rollup": "{\"state_code\": \"US_IX\", \"gender\": \"MALE\"}",
            "recidivism_num_records": "120",
            "recidivism_probation_series": "[{\"cohort_months\": 12, \"event_rate\": 0.12, \"lower_ci\": 0.1, \"upper_ci\": 0.14}]",
            "disposition_num_records": "300",
            "disposition_probation_pc": 0.5,
            "disposition_rider_pc": 0.3,
            "disposition_term_pc": 0.2
        });
        let record = validate(&schema(), raw.as_object().unwrap()).unwrap();

        let series = record.get("rollupRecidivismSeries").and_then(|v| v.as_list()).unwrap();
        assert_eq!(series.len(), 1);
        let dispositions = record.get("dispositionData").and_then(|v| v.as_list()).unwrap();
        assert_eq!(dispositions.len(), 3);
        assert!(record.get("dispositionTermPc").is_none());

        let rollup = record.get_record("recidivismRollup").unwrap();
        assert_eq!(rollup["stateCode"], FieldValue::text("US_ID"));

        let key = spec().key_of(&record);
        assert_eq!(key.to_string(), "gender=MALE, assessmentScoreBucketStart=0, assessmentScoreBucketEnd=22, offense=THEFT");
    }
}
