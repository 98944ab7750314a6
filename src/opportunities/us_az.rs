// US_AZ - Transition release (Standard Transition Program / Drug Transition Program)
// One record can qualify for either sub-program; copy groups the criteria
// under a heading per sub-program.

use super::{referral_schema, OpportunityConfig, OpportunityType};
use crate::attributes::{FieldRule, FieldType};
use crate::rules::{CriteriaCopy, CriterionCopy};
use crate::schema::{SchemaDefinition, SchemaError};

const SHARED_CRITERIA: [(&str, &str); 6] = [
    ("usAzNoSexualArsonOrDangerousCrimesAgainstChildren", "No sex offense, arson, or dangerous crimes against children"),
    ("custodyLevelIsMinimumOrMedium", "Custody level is minimum or medium"),
    ("usAzNoUnsatisfactoryProgramRatingsWithin3Months", "No unsatisfactory program ratings within the past 3 months"),
    ("usAzNotServingFlatSentence", "Not serving a flat sentence"),
    ("usAzNoViolationsAndEligibleLegalStatus", "No major violations and eligible legal status"),
    ("usAzNoActiveFelonyDetainers", "No active felony detainers"),
];

const TPR_CRITERIA: [(&str, &str); 4] = [
    ("usAzNoTprDenialOrPreviousTprRelease", "No previous TPR denial or release"),
    ("usAzNoTprRemovalsFromSelfImprovementPrograms", "No removals from self-improvement programs"),
    ("usAzEnrolledInOrMeetsMandatoryLiteracyTpr", "Enrolled in or meets mandatory literacy"),
    ("usAzIncarcerationWithin6MonthsOfAcisTprDate", "Within 6 months of TPR date: {acisTprDate}"),
];

const DTP_CRITERIA: [(&str, &str); 7] = [
    ("usAzOnlyDrugOffenseConvictions", "Only drug offense convictions"),
    ("usAzNoDomesticViolenceConviction", "No domestic violence convictions"),
    ("usAzNoSexualExploitationOfChildrenConviction", "No sexual exploitation of children convictions"),
    ("usAzNoViolentConviction", "No violent convictions"),
    ("usAzNoDtpDenialOrPreviousDtpRelease", "No previous DTP denial or release"),
    ("usAzNoDtpRemovalsFromSelfImprovementPrograms", "No DTP removals from self-improvement programs"),
    ("usAzIncarcerationWithin6MonthsOfAcisDtpDate", "Within 6 months of DTP date: {acisDtpDate}"),
];

fn criteria(name: &str) -> SchemaDefinition {
    let mut schema = SchemaDefinition::new(name);
    for (key, _) in SHARED_CRITERIA.iter().chain(TPR_CRITERIA.iter()).chain(DTP_CRITERIA.iter()) {
        let payload = SchemaDefinition::new(*key)
            .field(FieldRule::optional("acisTprDate", FieldType::Date))
            .field(FieldRule::optional("acisDtpDate", FieldType::Date))
            .field(FieldRule::optional("eligibleDate", FieldType::Date));
        schema = schema.field(FieldRule::optional(*key, FieldType::object(payload)).nullable());
    }
    schema.field(FieldRule::optional("usAzNoAcisDtpOrTprDateSet", FieldType::Any))
}

pub fn transition_release_schema() -> SchemaDefinition {
    let metadata = SchemaDefinition::new("metadata").field(
        FieldRule::optional(
            "tabDescription",
            FieldType::enumeration(["FAST_TRACK", "APPROVED_BY_TIME_COMP", "ALMOST_ELIGIBLE", "OVERDUE"]),
        )
        .nullable(),
    );
    referral_schema(
        "usAzTransitionRelease",
        criteria("transitionReleaseEligibleCriteria"),
        criteria("transitionReleaseIneligibleCriteria"),
    )
    .field(FieldRule::optional("metadata", FieldType::object(metadata)))
    .field(FieldRule::optional("isEligible", FieldType::Boolean))
    .field(FieldRule::optional("isAlmostEligible", FieldType::Boolean))
}

fn keys(table: &[(&'static str, &'static str)]) -> Vec<&'static str> {
    table.iter().map(|(k, _)| *k).collect()
}

pub fn transition_release_copy() -> CriteriaCopy {
    let mut copy = CriteriaCopy::new();
    for (key, text) in SHARED_CRITERIA.iter().chain(TPR_CRITERIA.iter()).chain(DTP_CRITERIA.iter()) {
        copy = copy.eligible(*key, CriterionCopy::new(*text));
    }
    copy.ineligible(
        "usAzIncarcerationWithin6MonthsOfAcisDtpDate",
        CriterionCopy::new("Needs $TIME_REMAINING before DTP eligibility"),
    )
    .ineligible(
        "usAzIncarcerationWithin6MonthsOfAcisTprDate",
        CriterionCopy::new("Needs $TIME_REMAINING before TPR eligibility"),
    )
    .group("TPR", "Standard Transition Program Release", &keys(&TPR_CRITERIA))
    .group("DTP", "Drug Transition Program Release", &keys(&DTP_CRITERIA))
    .denial_reason("CUSTODY", "Custody level too high")
    .denial_reason("PROGRAM", "Has not completed required programming")
    .denial_reason("DETAINER", "Has an active felony detainer")
    .with_other_reason()
}

pub fn transition_release() -> Result<OpportunityConfig, SchemaError> {
    Ok(OpportunityConfig {
        opportunity_type: OpportunityType::UsAzTransitionRelease,
        label: "Transition Release",
        schema: transition_release_schema(),
        copy: transition_release_copy(),
        eligibility_date_path: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_grouped_requirements_follow_shared_criteria() {
        let raw = json!({
            "stateCode": "US_AZ",
            "externalId": "AZ_RES014",
            "eligibleCriteria": {
                "custodyLevelIsMinimumOrMedium": null,
                "usAzOnlyDrugOffenseConvictions": null,
                "usAzNoAcisDtpOrTprDateSet": null,
                "usAzIncarcerationWithin6MonthsOfAcisDtpDate": {"acisDtpDate": "2024-03-01"}
            },
            "ineligibleCriteria": {},
            "metadata": {"tabDescription": "FAST_TRACK"}
        });
        let config = transition_release().unwrap();
        let record = config.parse(raw.as_object().unwrap()).unwrap();
        let summary = config.summarize(&record, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());

        let lines: Vec<(&str, bool)> = summary
            .requirements_met
            .iter()
            .map(|r| (r.text.as_str(), r.is_heading))
            .collect();
        assert_eq!(
            lines,
            vec![
                ("Custody level is minimum or medium", false),
                ("Drug Transition Program Release", true),
                ("Only drug offense convictions", false),
                ("Within 6 months of DTP date: March 1, 2024", false),
            ]
        );
        assert_eq!(
            summary.requirements_met[2].key.as_deref(),
            Some("DTP:usAzOnlyDrugOffenseConvictions")
        );
        assert_eq!(summary.eligibility_date, None);
    }
}
