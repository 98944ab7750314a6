// US_ID - Earned Discharge and Limited Supervision Unit (LSU)
// Both share the UA / felony / income criteria.

use super::{referral_schema, sentence_date_payload, OpportunityConfig, OpportunityType};
use crate::attributes::{FieldRule, FieldType};
use crate::eligibility::format_value;
use crate::entities::{full_name_schema, full_name_to_string};
use crate::record::{FieldValue, Fields};
use crate::rules::{CriteriaCopy, CriterionCopy};
use crate::schema::{SchemaDefinition, SchemaError, TransformError};

const PAROLE_PAST_EARLY_DISCHARGE: &str = "usIdParoleDualSupervisionPastEarlyDischargeDate";
const PROBATION_ONE_YEAR: &str = "onProbationAtLeastOneYear";
const PAST_EARNED_DISCHARGE: &str = "pastEarnedDischargeEligibleDate";

/// Parallel arrays flattened into per-index form fields.
pub const CRIME_TABLE_KEYS: [&str; 8] = [
    "judgeNames",
    "countyNames",
    "dateImposed",
    "caseNumbers",
    "chargeDescriptions",
    "sentenceMin",
    "sentenceMax",
    "fullTermReleaseDates",
];

const INCOME_TOOLTIP: &str = "Policy requirement: Verified employment status, full-time student, or adequate lawful \
     income from non-employment sources have been confirmed within past 3 months.";
const PAST_EARNED_DISCHARGE_TOOLTIP: &str = "Policy requirement: If on probation, served minimum sentence according to the court; \
     if on parole for a nonviolent crime, served at least one year; if on parole for a sex/violent \
     offense, served at least one-third of remaining sentence; if on parole for a life sentence, \
     served at least five years on parole.";

// ============================================================================
// SHARED CRITERIA
// ============================================================================

fn shared_eligible_criteria(name: &str) -> SchemaDefinition {
    SchemaDefinition::new(name)
        .field(FieldRule::required(
            "negativeUaWithin90Days",
            FieldType::object(
                SchemaDefinition::new("negativeUaWithin90Days")
                    .field(
                        FieldRule::optional("latestUaDates", FieldType::array_of(FieldType::Date))
                            .with_default(FieldValue::List(Vec::new())),
                    )
                    .field(
                        FieldRule::optional("latestUaResults", FieldType::array_of(FieldType::Boolean))
                            .with_default(FieldValue::List(Vec::new())),
                    ),
            ),
        ))
        .field(FieldRule::required(
            "noFelonyWithin24Months",
            FieldType::object(
                SchemaDefinition::new("noFelonyWithin24Months").field(
                    FieldRule::optional("latestFelonyConvictions", FieldType::array_of(FieldType::Date))
                        .with_default(FieldValue::List(Vec::new())),
                ),
            ),
        ))
        .field(income_verified_field())
}

fn income_verified_field() -> FieldRule {
    FieldRule::optional(
        "usIdIncomeVerifiedWithin3Months",
        FieldType::object(
            SchemaDefinition::new("usIdIncomeVerifiedWithin3Months")
                .field(FieldRule::optional("incomeVerifiedDate", FieldType::Date)),
        ),
    )
    .null_as(FieldValue::Record(Fields::new()))
}

fn shared_copy() -> CriteriaCopy {
    CriteriaCopy::new()
        .eligible(
            "negativeUaWithin90Days",
            CriterionCopy::new("Negative UA within past 90 days").with_tooltip(
                "Policy requirement: Negative UA within past 90 days, unless the client lacks a history of \
                 drug/alcohol abuse or has been supervised at low risk for more than one year",
            ),
        )
        .eligible(
            "noFelonyWithin24Months",
            CriterionCopy::new("No felony convictions in past 24 months").with_tooltip(
                "Policy requirement: Has not committed a felony while on probation or parole in past 24 months",
            ),
        )
        .eligible(
            "usIdIncomeVerifiedWithin3Months",
            CriterionCopy::new("Verified compliant employment").with_tooltip(INCOME_TOOLTIP),
        )
        .ineligible(
            "onSupervisionAtLeastOneYear",
            CriterionCopy::new("Needs $TIME_REMAINING on supervision")
                .with_tooltip("Policy requirement: Has been on supervision for at least 1 year"),
        )
        .ineligible(
            "usIdIncomeVerifiedWithin3Months",
            CriterionCopy::new("Needs employment verification").with_tooltip(INCOME_TOOLTIP),
        )
}

fn shared_denial_reasons(copy: CriteriaCopy) -> CriteriaCopy {
    copy.denial_reason("SCNC", "Not compliant with special conditions")
        .denial_reason(
            "FFR",
            "Failure to make payments towards fines, fees, and restitution despite ability to pay",
        )
        .denial_reason("INTERLOCK", "Has an active interlock device")
        .denial_reason("NCIC", "Did not pass NCIC check")
}

// ============================================================================
// EARNED DISCHARGE
// ============================================================================

/// Moves whichever of the parole / probation criteria is present into
/// `pastEarnedDischargeEligibleDate`.
fn collapse_past_earned_discharge(fields: &mut Fields) {
    let parole = fields.shift_remove(PAROLE_PAST_EARLY_DISCHARGE);
    let probation = fields.shift_remove(PROBATION_ONE_YEAR);
    if let Some(payload) = parole.or(probation) {
        fields.insert(PAST_EARNED_DISCHARGE.to_string(), payload);
    }
}

fn earned_discharge_form() -> SchemaDefinition {
    let judge_name = full_name_schema().renamed("judgeName");

    let numbers = || FieldType::array_of(FieldType::NumberFromString);
    let dates = || FieldType::array_of(FieldType::Date);
    let strings = || FieldType::array_of(FieldType::String);

    SchemaDefinition::new("earnedDischargeForm")
        .field(FieldRule::optional("ncicCheckDate", FieldType::Date))
        .field(FieldRule::optional("fullTermReleaseDates", dates()))
        .field(FieldRule::optional("chargeDescriptions", strings()))
        .field(FieldRule::optional(
            "judgeNames",
            FieldType::array_of(FieldType::json_string(FieldType::object(judge_name))),
        ))
        .field(FieldRule::optional("countyNames", strings()))
        .field(FieldRule::optional("sentenceMax", numbers()))
        .field(FieldRule::optional("sentenceMin", numbers()))
        .field(FieldRule::optional("caseNumbers", strings()))
        .field(FieldRule::optional("dateImposed", dates()))
        .field(FieldRule::optional("initialRestitution", FieldType::NumberFromString))
        .field(FieldRule::optional("lastRestitutionPaymentDate", FieldType::Date))
        .field(FieldRule::optional("currentRestitutionBalance", FieldType::NumberFromString))
        .field(FieldRule::optional("initialFines", FieldType::NumberFromString))
        .field(FieldRule::optional("lastFinesPaymentDate", FieldType::Date))
        .field(FieldRule::optional("currentFinesBalance", FieldType::NumberFromString))
        .field(FieldRule::optional("firstAssessmentScore", FieldType::NumberFromString))
        .field(FieldRule::optional("firstAssessmentDate", FieldType::Date))
        .field(FieldRule::optional("latestAssessmentScore", FieldType::NumberFromString))
        .field(FieldRule::optional("latestAssessmentDate", FieldType::Date))
        .with_transform("flattenCrimeTable", |mut record| {
            flatten_crime_table(record.fields_mut())?;
            Ok(record)
        })
}

/// `judgeNames: [a, b]` becomes `judgeNames0`, `judgeNames1`, ... and
/// `numCrimeEntries` holds the longest array length.
pub fn flatten_crime_table(form: &mut Fields) -> Result<(), TransformError> {
    let mut entries = 0usize;
    let mut flattened = Vec::new();
    for key in CRIME_TABLE_KEYS {
        let items = match form.get(key) {
            Some(FieldValue::List(items)) => items,
            Some(FieldValue::Null) | None => continue,
            Some(other) => {
                return Err(TransformError::new(format!(
                    "`{}` should be a list, found {}",
                    key,
                    other.kind()
                )))
            }
        };
        entries = entries.max(items.len());
        for (i, item) in items.iter().enumerate() {
            let rendered = match item {
                FieldValue::Record(name) => full_name_to_string(name),
                other => format_value(other),
            };
            flattened.push((format!("{}{}", key, i), FieldValue::Text(rendered)));
        }
    }
    form.extend(flattened);
    form.insert("numCrimeEntries".to_string(), FieldValue::Int(entries as i64));
    Ok(())
}

pub fn earned_discharge_schema() -> Result<SchemaDefinition, SchemaError> {
    let parole = SchemaDefinition::new("parole").field(FieldRule::required(
        PAROLE_PAST_EARLY_DISCHARGE,
        FieldType::object(sentence_date_payload(PAROLE_PAST_EARLY_DISCHARGE)),
    ));
    let probation = SchemaDefinition::new("probation").field(FieldRule::required(
        PROBATION_ONE_YEAR,
        FieldType::object(sentence_date_payload(PROBATION_ONE_YEAR)),
    ));

    let eligible = shared_eligible_criteria("earnedDischargeEligibleCriteria")
        .field(FieldRule::required(
            "usIdLsirLevelLowModerateForXDays",
            FieldType::object(
                SchemaDefinition::new("usIdLsirLevelLowModerateForXDays")
                    .field(FieldRule::required("eligibleDate", FieldType::Date))
                    .field(FieldRule::required(
                        "riskLevel",
                        FieldType::enumeration(["LOW", "MODERATE"]),
                    )),
            ),
        ))
        .field(FieldRule::optional("supervisionNotPastFullTermCompletionDate", FieldType::Any))
        .with_union("pastEarnedDischargeEligibleDate", vec![parole, probation])?
        .with_transform("collapsePastEarnedDischarge", |mut record| {
            let fields = record.fields_mut();
            collapse_past_earned_discharge(fields);
            fields.shift_remove("supervisionNotPastFullTermCompletionDate");
            // risk level reads after the time-served line
            if let Some(lsir) = fields.shift_remove("usIdLsirLevelLowModerateForXDays") {
                fields.insert("usIdLsirLevelLowModerateForXDays".to_string(), lsir);
            }
            Ok(record)
        });

    let payload = |name: &str| FieldRule::optional(name, FieldType::object(sentence_date_payload(name)));
    let ineligible = SchemaDefinition::new("earnedDischargeIneligibleCriteria")
        .field(payload("onSupervisionAtLeastOneYear"))
        .field(payload(PAST_EARNED_DISCHARGE))
        .field(payload(PAROLE_PAST_EARLY_DISCHARGE))
        .field(payload(PROBATION_ONE_YEAR))
        .field(income_verified_field())
        .with_transform("collapsePastEarnedDischarge", |mut record| {
            collapse_past_earned_discharge(record.fields_mut());
            Ok(record)
        });

    Ok(referral_schema("earnedDischarge", eligible, ineligible)
        .field(
            FieldRule::optional("formInformation", FieldType::object(earned_discharge_form()))
                .with_default(FieldValue::Record(Fields::new())),
        )
        .field(FieldRule::optional("eligibleStartDate", FieldType::Date))
        .field(FieldRule::optional("metadata", FieldType::Any)))
}

pub fn earned_discharge_copy() -> CriteriaCopy {
    let copy = shared_copy()
        .eligible(
            PAST_EARNED_DISCHARGE,
            CriterionCopy::new("Minimum time has been served for eligibility")
                .with_tooltip(PAST_EARNED_DISCHARGE_TOOLTIP),
        )
        .eligible(
            "usIdLsirLevelLowModerateForXDays",
            CriterionCopy::new("")
                .with_tooltip(
                    "Policy requirement: Assessed at low risk level on LSI-R with no risk increase in past 90 days \
                     or moderate risk level on LSI-R with no risk increase in past 360 days",
                )
                .varying_by("riskLevel")
                .with_variant("LOW", "Currently low risk with no increase in risk level in past 90 days", None)
                .with_variant(
                    "MODERATE",
                    "Currently moderate risk with no increase in risk level in past 360 days",
                    None,
                ),
        )
        .ineligible(
            PAST_EARNED_DISCHARGE,
            CriterionCopy::new("Needs $TIME_REMAINING on supervision").with_tooltip(PAST_EARNED_DISCHARGE_TOOLTIP),
        );

    shared_denial_reasons(copy)
        .denial_reason("PCD", "Parole Commission permanently denied early discharge request")
        .denial_reason("CD", "Court permanently denied early discharge request")
        .denial_reason("MIS", "Has had a violent misdemeanor conviction in the past 12 months")
        .with_other_reason()
}

pub fn earned_discharge() -> Result<OpportunityConfig, SchemaError> {
    Ok(OpportunityConfig {
        opportunity_type: OpportunityType::UsIdEarnedDischarge,
        label: "Earned Discharge",
        schema: earned_discharge_schema()?,
        copy: earned_discharge_copy(),
        eligibility_date_path: Some("eligibleStartDate"),
    })
}

// ============================================================================
// LIMITED SUPERVISION UNIT
// ============================================================================

pub fn lsu_schema() -> SchemaDefinition {
    let eligible = shared_eligible_criteria("lsuEligibleCriteria")
        .field(FieldRule::required(
            "usIdNoActiveNco",
            FieldType::object(
                SchemaDefinition::new("usIdNoActiveNco").field(
                    FieldRule::optional("activeNco", FieldType::Boolean).with_default(FieldValue::Bool(false)),
                ),
            ),
        ))
        .field(
            FieldRule::required(
                "usIdLsirLevelLowFor90Days",
                FieldType::object(
                    SchemaDefinition::new("usIdLsirLevelLowFor90Days")
                        .field(FieldRule::required("eligibleDate", FieldType::Date))
                        .field(FieldRule::required("riskLevel", FieldType::enumeration(["LOW", "MODERATE"]))),
                ),
            )
            .with_alias("usIdLsirLevelLowModerateForXDays"),
        )
        .field(FieldRule::optional(
            "onSupervisionAtLeastOneYear",
            FieldType::object(sentence_date_payload("onSupervisionAtLeastOneYear")),
        ))
        .field(FieldRule::optional("supervisionNotPastFullTermCompletionDate", FieldType::Any))
        .with_transform("dropVestigialCriteria", |mut record| {
            record.remove("supervisionNotPastFullTermCompletionDate");
            Ok(record)
        });

    let ineligible = SchemaDefinition::new("lsuIneligibleCriteria")
        .field(FieldRule::optional(
            "onSupervisionAtLeastOneYear",
            FieldType::object(sentence_date_payload("onSupervisionAtLeastOneYear")),
        ))
        .field(income_verified_field());

    let form = SchemaDefinition::new("lsuForm")
        .field(FieldRule::optional("chargeDescriptions", FieldType::array_of(FieldType::String)))
        .field(FieldRule::optional("currentAddress", FieldType::String))
        .field(FieldRule::optional("currentPhoneNumber", FieldType::String))
        .field(FieldRule::optional("emailAddress", FieldType::String))
        .field(FieldRule::optional("employerName", FieldType::String))
        .field(FieldRule::optional("employerAddress", FieldType::String))
        .field(FieldRule::optional("employmentStartDate", FieldType::Date))
        .field(FieldRule::optional("assessmentDate", FieldType::Date))
        .field(FieldRule::optional("assessmentScore", FieldType::NumberFromString))
        .field(FieldRule::optional("latestNegativeDrugScreenDate", FieldType::Date))
        .field(FieldRule::optional("ncicReviewDate", FieldType::Date))
        .field(FieldRule::optional("txDischargeDate", FieldType::Date))
        .field(FieldRule::optional("caseNumbers", FieldType::array_of(FieldType::String)));

    referral_schema("LSU", eligible, ineligible)
        .field(
            FieldRule::optional("formInformation", FieldType::object(form))
                .with_default(FieldValue::Record(Fields::new())),
        )
        .field(FieldRule::optional("eligibleStartDate", FieldType::Date))
        .field(FieldRule::optional("metadata", FieldType::Any))
}

pub fn lsu_copy() -> CriteriaCopy {
    let copy = shared_copy()
        .eligible(
            "usIdNoActiveNco",
            CriterionCopy::new("")
                .with_tooltip("Policy requirement: Does not have an active NCO, CPO, or restraining order")
                .varying_by("activeNco")
                .with_variant("false", "No active NCO, CPO, or restraining order", None),
        )
        .eligible(
            "usIdLsirLevelLowFor90Days",
            CriterionCopy::new("")
                .with_tooltip(
                    "Policy requirement: Assessed at low risk level on LSI-R with no risk increase in past 90 days",
                )
                .varying_by("riskLevel")
                .with_variant("LOW", "Currently low risk with no increase in risk level in past 90 days", None),
        )
        .eligible(
            "onSupervisionAtLeastOneYear",
            CriterionCopy::new("On supervision at least 1 year")
                .with_tooltip("Has been on supervision for at least 1 year"),
        );
    shared_denial_reasons(copy).with_other_reason()
}

pub fn lsu() -> Result<OpportunityConfig, SchemaError> {
    Ok(OpportunityConfig {
        opportunity_type: OpportunityType::UsIdLsu,
        label: "Limited Supervision Unit",
        schema: lsu_schema(),
        copy: lsu_copy(),
        eligibility_date_path: Some("eligibleStartDate"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::validate;
    use serde_json::json;

    #[test]
    fn test_judge_names_and_crime_table() {
        let mut form = Fields::new();
        let mut judge = Fields::new();
        judge.insert("givenNames".into(), FieldValue::text("Ann"));
        judge.insert("middleNames".into(), FieldValue::text(""));
        judge.insert("surname".into(), FieldValue::text("Smith"));
        form.insert("judgeNames".into(), FieldValue::List(vec![FieldValue::Record(judge)]));
        form.insert(
            "caseNumbers".into(),
            FieldValue::List(vec![FieldValue::text("C1"), FieldValue::text("C2")]),
        );

        flatten_crime_table(&mut form).unwrap();
        assert_eq!(form["judgeNames0"], FieldValue::text("Ann Smith"));
        assert_eq!(form["caseNumbers1"], FieldValue::text("C2"));
        assert_eq!(form["numCrimeEntries"], FieldValue::Int(2));
    }

    #[test]
    fn test_lsu_accepts_legacy_risk_key() {
        let raw = json!({
            "stateCode": "US_ID",
            "externalId": "001",
            "eligibleCriteria": {
                "negativeUaWithin90Days": {},
                "noFelonyWithin24Months": {},
                "usIdNoActiveNco": {},
                "usIdLsirLevelLowModerateForXDays": {"eligibleDate": "2022-01-03", "riskLevel": "LOW"},
                "supervisionNotPastFullTermCompletionDate": {}
            },
            "eligibleStartDate": "2022-01-03"
        });
        let record = validate(&lsu_schema(), raw.as_object().unwrap()).unwrap();
        let criteria = record.get_record("eligibleCriteria").unwrap();
        assert!(criteria.contains_key("usIdLsirLevelLowFor90Days"));
        assert!(!criteria.contains_key("supervisionNotPastFullTermCompletionDate"));
        let nco = criteria["usIdNoActiveNco"].as_record().unwrap();
        assert_eq!(nco["activeNco"], FieldValue::Bool(false));
    }
}
