// US_MI - Early Discharge from parole or probation
// Copy for several criteria depends on metadata.supervisionType.

use super::{referral_schema, OpportunityConfig, OpportunityType};
use crate::attributes::{FieldRule, FieldType};
use crate::rules::{CriteriaCopy, CriterionCopy};
use crate::schema::{SchemaDefinition, SchemaError};

const SUPERVISION_TYPE: &str = "metadata.supervisionType";
const PAROLE_TERM_TOOLTIP: &str = "A parolee is eligible for early discharge consideration prior to the expiration of the \
     original term of parole if they have completed at least one-half of an original parole term of 12 months or more";

fn marker(name: &str) -> FieldType {
    FieldType::object(SchemaDefinition::new(name).field(FieldRule::optional("eligibleDate", FieldType::Date)))
}

fn criterion(name: &str) -> FieldRule {
    FieldRule::optional(name, marker(name)).nullable()
}

pub fn early_discharge_schema() -> Result<SchemaDefinition, SchemaError> {
    let parole = SchemaDefinition::new("parole")
        .field(FieldRule::required(
            "usMiNotServingIneligibleOffensesForEarlyDischargeFromParoleDualSupervision",
            marker("usMiNotServingIneligibleOffensesForEarlyDischargeFromParoleDualSupervision"),
        ))
        .field(criterion("servingAtLeastOneYearOnParoleSupervisionOrSupervisionOutOfState"))
        .field(criterion("usMiParoleDualSupervisionPastEarlyDischargeDate"))
        .field(criterion("usMiNoOwiViolationOnParoleDualSupervision"));
    let probation = SchemaDefinition::new("probation").field(FieldRule::required(
        "usMiNotServingIneligibleOffensesForEarlyDischargeFromProbationSupervision",
        marker("usMiNotServingIneligibleOffensesForEarlyDischargeFromProbationSupervision"),
    ));

    let eligible = SchemaDefinition::new("earlyDischargeEligibleCriteria")
        .field(criterion("supervisionOrSupervisionOutOfStatePastHalfFullTermReleaseDate"))
        .field(criterion("supervisionNotPastFullTermCompletionDate"))
        .field(criterion("usMiNoActivePpo"))
        .field(criterion("usMiNoNewIneligibleOffensesForEarlyDischargeFromSupervision"))
        .field(criterion("usMiSupervisionOrSupervisionOutOfStateLevelIsNotSai"))
        .field(criterion("supervisionOrSupervisionOutOfStateLevelIsNotHigh"))
        .field(criterion("usMiNoPendingDetainer"))
        .with_union("supervisionType", vec![parole, probation])?;

    let metadata = SchemaDefinition::new("metadata")
        .field(FieldRule::required(
            "supervisionType",
            FieldType::enumeration(["Parole", "Probation"]),
        ))
        .field(FieldRule::optional("eligibleDate", FieldType::Date))
        .field(FieldRule::optional("interstateFlag", FieldType::String).nullable())
        .field(FieldRule::optional("supervisionLevel", FieldType::String).nullable());

    Ok(
        referral_schema("usMiEarlyDischarge", eligible, SchemaDefinition::new("earlyDischargeIneligibleCriteria"))
            .field(FieldRule::required("metadata", FieldType::object(metadata))),
    )
}

pub fn early_discharge_copy() -> CriteriaCopy {
    CriteriaCopy::new()
        .eligible(
            "supervisionOrSupervisionOutOfStatePastHalfFullTermReleaseDate",
            CriterionCopy::new("")
                .varying_by(SUPERVISION_TYPE)
                .with_variant("Parole", "Completed at least half of parole term", Some(PAROLE_TERM_TOOLTIP))
                .with_variant(
                    "Probation",
                    "Completed at least half of probation term",
                    Some(
                        "An offender may be considered for discharge prior to the expiration of the original \
                         term of probation if they have completed at least one-half of the probation term",
                    ),
                ),
        )
        .eligible(
            "servingAtLeastOneYearOnParoleSupervisionOrSupervisionOutOfState",
            CriterionCopy::new("Serving a parole term of 12 months or more").with_tooltip(PAROLE_TERM_TOOLTIP),
        )
        .eligible(
            "usMiParoleDualSupervisionPastEarlyDischargeDate",
            CriterionCopy::new("Served mandatory period of parole").with_tooltip(
                "The parolee has served any mandatory period of parole as set forth in Paragraph F.",
            ),
        )
        .eligible(
            "usMiNoActivePpo",
            CriterionCopy::new("")
                .varying_by(SUPERVISION_TYPE)
                .with_variant(
                    "Parole",
                    "No active PPO ordered during the parole term",
                    Some("The parolee does not have an active PPO that was ordered against him/her during the parole term."),
                )
                .with_variant(
                    "Probation",
                    "No active PPO ordered during the probation term",
                    Some(
                        "The offender does not have an active PPO that was ordered against him/her during the \
                         probation term.",
                    ),
                ),
        )
        .eligible(
            "usMiNoNewIneligibleOffensesForEarlyDischargeFromSupervision",
            CriterionCopy::new("")
                .varying_by(SUPERVISION_TYPE)
                .with_variant(
                    "Parole",
                    "Not involved in a felony, assaultive misdemeanor, or offense requiring SORA registration while on parole",
                    None,
                )
                .with_variant(
                    "Probation",
                    "Not involved in a felony, assaultive misdemeanor, or offense requiring SORA registration while on probation",
                    None,
                ),
        )
        .eligible(
            "usMiNotServingIneligibleOffensesForEarlyDischargeFromParoleDualSupervision",
            CriterionCopy::new("Not serving for an offense excluded from early discharge eligibility by policy.")
                .with_tooltip(
                    "The parolee is not serving for an offense required to be registered under the Sex Offender \
                     Registration Act.",
                ),
        )
        .eligible(
            "usMiNotServingIneligibleOffensesForEarlyDischargeFromProbationSupervision",
            CriterionCopy::new("Not serving for an offense excluded from early discharge eligibility by policy.")
                .with_tooltip(
                    "The offender is not currently serving for an offense that requires a mandatory term of \
                     probation as identified in Paragraph H.",
                ),
        )
        .eligible(
            "usMiSupervisionOrSupervisionOutOfStateLevelIsNotSai",
            CriterionCopy::new("Not paroled from SAI on current term").with_tooltip(
                "The parolee was not paroled from the Special Alternative Incarceration (SAI) program on the \
                 current term.",
            ),
        )
        .eligible(
            "supervisionOrSupervisionOutOfStateLevelIsNotHigh",
            CriterionCopy::new("Not on intensive supervision"),
        )
        .eligible(
            "usMiNoOwiViolationOnParoleDualSupervision",
            CriterionCopy::new("Not involved in an OWI offense while on parole."),
        )
        .eligible("usMiNoPendingDetainer", CriterionCopy::new("No pending detainers"))
        .denial_reason(
            "CHILD ABUSE ORDER",
            "CHILD ABUSE ORDER: Child abuse prevention order filed during supervision period",
        )
        .denial_reason(
            "SUSPECTED OFFENSE",
            "SUSPECTED OFFENSE: Suspected of a felony, assaultive misdemeanor, OWI, or offense requiring SORA registration",
        )
        .denial_reason(
            "FELONY/STATE PROBATION",
            "FELONY/STATE PROBATION: On parole and also on other state or federal probation supervision for an \
             offense committed during the current period",
        )
        .denial_reason(
            "PUBLIC ACT 223",
            "PUBLIC ACT 223: On parole and serving pursuant to Public Act 223 of 2010",
        )
        .denial_reason("NEEDS", "NEEDS: On parole and all criminogenic needs have not been addressed")
        .denial_reason("NONCOMPLIANT", "NONCOMPLIANT: Not compliant with the order of supervision")
        .denial_reason(
            "PROGRAMMING",
            "PROGRAMMING: On probation and has not completed all required programming",
        )
        .denial_reason("PRO-SOCIAL", "PRO-SOCIAL: Has not demonstrated pro-social behavior")
        .denial_reason(
            "RESTITUTION",
            "RESTITUTION: On parole and has not completed court-ordered restitution payments",
        )
        .denial_reason(
            "FINES & FEES",
            "FINES & FEES: Willful nonpayment of restitution, fees, court costs, fines, and other monetary \
             obligations despite clear ability to pay",
        )
        .denial_reason("PENDING CHARGES", "PENDING CHARGES: Pending felony charges/warrant")
        .denial_reason(
            "EXCLUDED OFFENSE",
            "EXCLUDED OFFENSE: On parole for an offense resulting in death or serious bodily injury or an \
             offense involving the discharge of a firearm",
        )
        .with_other_reason()
}

pub fn early_discharge() -> Result<OpportunityConfig, SchemaError> {
    Ok(OpportunityConfig {
        opportunity_type: OpportunityType::UsMiEarlyDischarge,
        label: "Early Discharge",
        schema: early_discharge_schema()?,
        copy: early_discharge_copy(),
        eligibility_date_path: Some("metadata.eligibleDate"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ValidationErrorKind;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 3, 1).unwrap()
    }

    #[test]
    fn test_copy_follows_supervision_type() {
        let config = early_discharge().unwrap();
        let raw = json!({
            "stateCode": "US_MI",
            "externalId": "cl-9",
            "eligibleCriteria": {
                "supervisionOrSupervisionOutOfStatePastHalfFullTermReleaseDate": {"eligibleDate": "2022-10-01"},
                "usMiNoActivePpo": null,
                "usMiNotServingIneligibleOffensesForEarlyDischargeFromProbationSupervision": {}
            },
            "metadata": {"supervisionType": "Probation", "eligibleDate": "2022-10-01"}
        });
        let record = config.parse(raw.as_object().unwrap()).unwrap();
        let summary = config.summarize(&record, today());

        let texts: Vec<&str> = summary.requirements_met.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "Completed at least half of probation term",
                "No active PPO ordered during the probation term",
                "Not serving for an offense excluded from early discharge eligibility by policy.",
            ]
        );
        assert_eq!(summary.eligibility_date, NaiveDate::from_ymd_opt(2022, 10, 1));
    }

    #[test]
    fn test_parole_and_probation_criteria_are_exclusive() {
        let config = early_discharge().unwrap();
        let raw = json!({
            "stateCode": "US_MI",
            "externalId": "cl-9",
            "eligibleCriteria": {
                "usMiNotServingIneligibleOffensesForEarlyDischargeFromParoleDualSupervision": {},
                "usMiNotServingIneligibleOffensesForEarlyDischargeFromProbationSupervision": {}
            },
            "metadata": {"supervisionType": "Parole"}
        });
        let err = config.parse(raw.as_object().unwrap()).unwrap_err();
        assert_matches!(err.kind, ValidationErrorKind::AmbiguousUnion { .. });
    }
}
