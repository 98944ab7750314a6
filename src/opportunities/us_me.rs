// US_ME - Supervised Community Confinement Program (SCCP)

use super::{referral_schema, OpportunityConfig, OpportunityType};
use crate::attributes::{FieldRule, FieldType};
use crate::rules::{CriteriaCopy, CriterionCopy};
use crate::schema::{SchemaDefinition, SchemaError};

const SERVED_PORTION_TOOLTIP: &str = "Served at least {xPortionServed} of the term of imprisonment imposed or, in the case of \
     a split sentence, at least {xPortionServed} of the unsuspended portion, after consideration of any \
     deductions that the prisoner has received and retained under Title 17A, section 2302, subsection 1; \
     section 2305; section 2307; section 2308; section 2309; section 2310; or section 2311.";
const MONTHS_REMAINING_TOOLTIP: &str = "No more than thirty (30) months remaining on the term of imprisonment or, \
     in the case of a split sentence, on the unsuspended portion, after consideration of any deductions \
     that the resident has received and retained under Title 17-A, Sections 2302(1), 2305, and 2307-2311.";
const NO_VIOLATION_TOOLTIP: &str = "Must not have been found guilty of a Class A or B disciplinary violation within ninety \
     (90) days of submitting the plan to be transferred to supervised community confinement or anytime \
     thereafter prior to the scheduled transfer and must not have a Class A or B disciplinary report \
     pending at the time of submitting the plan or scheduled transfer.";

fn criteria(name: &str) -> SchemaDefinition {
    let date = || FieldRule::optional("eligibleDate", FieldType::Date);
    SchemaDefinition::new(name)
        .field(FieldRule::optional(
            "usMeCustodyLevelIsMinimumOrCommunity",
            FieldType::object(
                SchemaDefinition::new("usMeCustodyLevelIsMinimumOrCommunity")
                    .field(FieldRule::required("custodyLevel", FieldType::String)),
            ),
        ))
        .field(FieldRule::optional(
            "usMeServedXPortionOfSentence",
            FieldType::object(
                SchemaDefinition::new("usMeServedXPortionOfSentence")
                    .field(date())
                    .field(FieldRule::required("xPortionServed", FieldType::enumeration(["1/2", "2/3"]))),
            ),
        ))
        .field(FieldRule::optional(
            "usMeXMonthsRemainingOnSentence",
            FieldType::object(SchemaDefinition::new("usMeXMonthsRemainingOnSentence").field(date())),
        ))
        .field(FieldRule::optional("usMeNoDetainersWarrantsOrOther", FieldType::Null).nullable())
        .field(
            FieldRule::optional(
                "usMeNoClassAOrBViolationFor90Days",
                FieldType::object(
                    SchemaDefinition::new("usMeNoClassAOrBViolationFor90Days")
                        .field(date())
                        .field(FieldRule::optional("highestClassViol", FieldType::String))
                        .field(FieldRule::optional("violType", FieldType::String)),
                ),
            )
            .nullable(),
        )
}

pub fn sccp_schema() -> SchemaDefinition {
    referral_schema("usMeSCCP", criteria("sccpEligibleCriteria"), criteria("sccpIneligibleCriteria"))
        .field(FieldRule::optional("isEligible", FieldType::Boolean))
        .field(FieldRule::optional("isAlmostEligible", FieldType::Boolean))
}

pub fn sccp_copy() -> CriteriaCopy {
    CriteriaCopy::new()
        .eligible(
            "usMeCustodyLevelIsMinimumOrCommunity",
            CriterionCopy::new("Currently on {custodyLevel:lower}")
                .with_tooltip("Currently on minimum or community custody"),
        )
        .eligible(
            "usMeServedXPortionOfSentence",
            CriterionCopy::new("Served at least {xPortionServed} of sentence").with_tooltip(SERVED_PORTION_TOOLTIP),
        )
        .eligible(
            "usMeXMonthsRemainingOnSentence",
            CriterionCopy::new("No more than 30 months remaining on sentence")
                .with_tooltip(MONTHS_REMAINING_TOOLTIP),
        )
        .eligible(
            "usMeNoDetainersWarrantsOrOther",
            CriterionCopy::new("No detainers, warrants, or other pending holds").with_tooltip(
                "Must have no detainers, warrants, or other pending holds preventing participation in a \
                 community program as set out in Department Policy (AF) 23.1",
            ),
        )
        .eligible(
            "usMeNoClassAOrBViolationFor90Days",
            CriterionCopy::new("No Class A or B disciplines pending or occurring in the past 90 days")
                .with_tooltip(NO_VIOLATION_TOOLTIP),
        )
        .ineligible(
            "usMeXMonthsRemainingOnSentence",
            CriterionCopy::new("Needs $TIME_REMAINING before 30 months remain on sentence")
                .with_tooltip(MONTHS_REMAINING_TOOLTIP),
        )
        .ineligible(
            "usMeServedXPortionOfSentence",
            CriterionCopy::new("Needs to serve $TIME_REMAINING on sentence.").with_tooltip(SERVED_PORTION_TOOLTIP),
        )
        .ineligible(
            "usMeNoClassAOrBViolationFor90Days",
            CriterionCopy::new("Needs $TIME_REMAINING without a Class A or B discipline")
                .with_tooltip(NO_VIOLATION_TOOLTIP),
        )
        .denial_reason("CASE PLAN", "Not compliant with case plan goals")
        .denial_reason("PROGRAM", "Has not completed required core programming")
        .denial_reason("DISCIPLINE", "Has a Class A or B disciplinary violation pending")
        .denial_reason("DECLINE", "Resident declined opportunity to apply for SCCP")
        .with_other_reason()
}

pub fn sccp() -> Result<OpportunityConfig, SchemaError> {
    Ok(OpportunityConfig {
        opportunity_type: OpportunityType::UsMeSccp,
        label: "Supervised Community Confinement Program",
        schema: sccp_schema(),
        copy: sccp_copy(),
        eligibility_date_path: None,
    })
}
