// Opportunity Schemas - per-state eligibility record definitions
// Each opportunity is a value: schema + copy table + eligibility date source.

pub mod us_az;
pub mod us_id;
pub mod us_me;
pub mod us_mi;
pub mod us_tn;

use crate::attributes::{state_code_type, FieldRule, FieldType};
use crate::eligibility::{self, EligibilitySummary};
use crate::record::{FieldValue, Fields, RawRecord, StateCode, ValidatedRecord};
use crate::rules::CriteriaCopy;
use crate::schema::{SchemaDefinition, SchemaError};
use crate::validator::{self, ValidationError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// OPPORTUNITY TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpportunityType {
    #[serde(rename = "earnedDischarge")]
    UsIdEarnedDischarge,
    #[serde(rename = "LSU")]
    UsIdLsu,
    #[serde(rename = "usMeSCCP")]
    UsMeSccp,
    #[serde(rename = "usMiEarlyDischarge")]
    UsMiEarlyDischarge,
    #[serde(rename = "usTnCustodyLevelDowngrade")]
    UsTnCustodyLevelDowngrade,
    #[serde(rename = "usAzTransitionRelease")]
    UsAzTransitionRelease,
}

impl OpportunityType {
    pub const ALL: [OpportunityType; 6] = [
        OpportunityType::UsIdEarnedDischarge,
        OpportunityType::UsIdLsu,
        OpportunityType::UsMeSccp,
        OpportunityType::UsMiEarlyDischarge,
        OpportunityType::UsTnCustodyLevelDowngrade,
        OpportunityType::UsAzTransitionRelease,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityType::UsIdEarnedDischarge => "earnedDischarge",
            OpportunityType::UsIdLsu => "LSU",
            OpportunityType::UsMeSccp => "usMeSCCP",
            OpportunityType::UsMiEarlyDischarge => "usMiEarlyDischarge",
            OpportunityType::UsTnCustodyLevelDowngrade => "usTnCustodyLevelDowngrade",
            OpportunityType::UsAzTransitionRelease => "usAzTransitionRelease",
        }
    }

    pub fn state_code(&self) -> StateCode {
        match self {
            OpportunityType::UsIdEarnedDischarge | OpportunityType::UsIdLsu => StateCode::UsId,
            OpportunityType::UsMeSccp => StateCode::UsMe,
            OpportunityType::UsMiEarlyDischarge => StateCode::UsMi,
            OpportunityType::UsTnCustodyLevelDowngrade => StateCode::UsTn,
            OpportunityType::UsAzTransitionRelease => StateCode::UsAz,
        }
    }

    /// Snapshot file carrying referral records for this opportunity.
    pub fn file_name(&self) -> &'static str {
        match self {
            OpportunityType::UsIdEarnedDischarge => "us_id_earned_discharge_record.json",
            OpportunityType::UsIdLsu => "us_id_lsu_record.json",
            OpportunityType::UsMeSccp => "us_me_sccp_record.json",
            OpportunityType::UsMiEarlyDischarge => "us_mi_early_discharge_record.json",
            OpportunityType::UsTnCustodyLevelDowngrade => "us_tn_custody_level_downgrade_record.json",
            OpportunityType::UsAzTransitionRelease => "us_az_transition_release_record.json",
        }
    }

    pub fn config(&self) -> Result<OpportunityConfig, SchemaError> {
        match self {
            OpportunityType::UsIdEarnedDischarge => us_id::earned_discharge(),
            OpportunityType::UsIdLsu => us_id::lsu(),
            OpportunityType::UsMeSccp => us_me::sccp(),
            OpportunityType::UsMiEarlyDischarge => us_mi::early_discharge(),
            OpportunityType::UsTnCustodyLevelDowngrade => us_tn::custody_level_downgrade(),
            OpportunityType::UsAzTransitionRelease => us_az::transition_release(),
        }
    }
}

impl fmt::Display for OpportunityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpportunityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpportunityType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown opportunity type `{}`", s))
    }
}

// ============================================================================
// OPPORTUNITY CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpportunityConfig {
    pub opportunity_type: OpportunityType,
    pub label: &'static str,
    pub schema: SchemaDefinition,
    pub copy: CriteriaCopy,
    /// Field holding the eligibility date, if the record carries one
    pub eligibility_date_path: Option<&'static str>,
}

impl OpportunityConfig {
    pub fn parse(&self, raw: &RawRecord) -> Result<ValidatedRecord, ValidationError> {
        validator::validate(&self.schema, raw)
    }

    pub fn summarize(&self, record: &ValidatedRecord, today: NaiveDate) -> EligibilitySummary {
        eligibility::summarize(record, &self.copy, self.eligibility_date_path, today)
    }

    /// Replace parts of the built-in copy, e.g. from a JSON file.
    pub fn with_copy_overrides(mut self, overrides: CriteriaCopy) -> Self {
        self.copy = self.copy.overlay(overrides);
        self
    }
}

// ============================================================================
// SHARED SCHEMA PIECES
// ============================================================================

pub fn case_note_schema() -> SchemaDefinition {
    SchemaDefinition::new("caseNote")
        .field(FieldRule::optional("noteTitle", FieldType::String).nullable())
        .field(FieldRule::optional("noteBody", FieldType::String).nullable())
        .field(FieldRule::optional("eventDate", FieldType::Date).nullable())
}

/// `caseNotes`: section title -> notes. Absent means no notes.
pub fn case_notes_field() -> FieldRule {
    FieldRule::optional(
        "caseNotes",
        FieldType::map_of(FieldType::array_of(FieldType::object(case_note_schema()))),
    )
    .with_default(FieldValue::Record(Fields::new()))
}

/// Criterion payload `{eligibleDate?, sentenceType?}`.
pub fn sentence_date_payload(name: &str) -> SchemaDefinition {
    SchemaDefinition::new(name)
        .field(FieldRule::optional("eligibleDate", FieldType::Date))
        .field(FieldRule::optional(
            "sentenceType",
            FieldType::enumeration(["PROBATION", "PAROLE", "DUAL"]),
        ))
}

/// Common shape of every referral record. `ineligible` is made strict.
pub fn referral_schema(
    name: &str,
    eligible: SchemaDefinition,
    ineligible: SchemaDefinition,
) -> SchemaDefinition {
    SchemaDefinition::new(name)
        .field(FieldRule::required("stateCode", state_code_type()))
        .field(FieldRule::required("externalId", FieldType::String))
        .field(FieldRule::required("eligibleCriteria", FieldType::object(eligible)))
        .field(
            FieldRule::optional("ineligibleCriteria", FieldType::object(ineligible.strict()))
                .with_default(FieldValue::Record(Fields::new())),
        )
        .field(case_notes_field())
}

/// Transform appending the notes at `metadata.<source>` to
/// `caseNotes[<title>]`, then dropping them from metadata.
pub fn merge_metadata_case_notes(
    schema: &SchemaDefinition,
    source: &'static str,
    title: &'static str,
) -> SchemaDefinition {
    schema.with_transform("mergeMetadataCaseNotes", move |mut record| {
        let notes: Vec<FieldValue> = match record.fields_mut().get_mut("metadata") {
            Some(FieldValue::Record(metadata)) => match metadata.shift_remove(source) {
                Some(FieldValue::List(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        if notes.is_empty() {
            return Ok(record);
        }

        let fields = record.fields_mut();
        let case_notes = fields
            .entry("caseNotes".to_string())
            .or_insert_with(|| FieldValue::Record(Fields::new()));
        if let FieldValue::Record(sections) = case_notes {
            match sections
                .entry(title.to_string())
                .or_insert_with(|| FieldValue::List(Vec::new()))
            {
                FieldValue::List(existing) => existing.extend(notes),
                other => *other = FieldValue::List(notes),
            }
        }
        Ok(record)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_opportunity_config_builds() {
        for t in OpportunityType::ALL {
            let config = t.config().unwrap();
            assert_eq!(config.opportunity_type, t);
            assert_eq!(t.as_str().parse::<OpportunityType>().unwrap(), t);
        }
    }

    #[test]
    fn test_metadata_case_notes_are_merged() {
        let metadata = SchemaDefinition::new("metadata").field(FieldRule::optional(
            "disciplinaries",
            FieldType::array_of(FieldType::object(case_note_schema())),
        ));
        let schema = SchemaDefinition::new("record")
            .field(case_notes_field())
            .field(FieldRule::optional("metadata", FieldType::object(metadata)));
        let schema = merge_metadata_case_notes(&schema, "disciplinaries", "ASSAULTIVE DISCIPLINARIES");

        let raw = json!({
            "caseNotes": {"Education": [{"noteTitle": "Graduated"}]},
            "metadata": {"disciplinaries": [{"noteTitle": "Fight", "eventDate": "2024-01-05"}]}
        });
        let record = validator::validate(&schema, raw.as_object().unwrap()).unwrap();

        let notes = record.get_record("caseNotes").unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes["ASSAULTIVE DISCIPLINARIES"].as_list().unwrap().len(), 1);
        assert!(record.get_record("metadata").unwrap().get("disciplinaries").is_none());
    }

    #[test]
    fn test_ineligible_criteria_default_to_empty() {
        let schema = referral_schema(
            "minimal",
            SchemaDefinition::new("eligible").field(FieldRule::optional("a", FieldType::Any)),
            SchemaDefinition::new("ineligible").field(FieldRule::optional("a", FieldType::Any)),
        );
        let raw = json!({"stateCode": "US_ID", "externalId": "1", "eligibleCriteria": {}});
        let record = validator::validate(&schema, raw.as_object().unwrap()).unwrap();
        assert_eq!(record.get_record("ineligibleCriteria").map(|c| c.len()), Some(0));
        assert_eq!(record.get_record("caseNotes").map(|c| c.len()), Some(0));
    }
}
