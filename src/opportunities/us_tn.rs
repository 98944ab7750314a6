// US_TN - Custody Level Downgrade
// Raw rows carry form fields flat as `form_information_*`.

use super::{case_note_schema, merge_metadata_case_notes, referral_schema, OpportunityConfig, OpportunityType};
use crate::attributes::{FieldRule, FieldType};
use crate::record::{FieldValue, Fields};
use crate::rules::{CriteriaCopy, CriterionCopy};
use crate::schema::{SchemaDefinition, SchemaError};

pub const FORM_PREFIX: &str = "form_information_";
pub const ASSAULTIVE_DISCIPLINARIES: &str = "ASSAULTIVE DISCIPLINARIES";

fn form_information() -> SchemaDefinition {
    let notes = || FieldType::array_of(FieldType::object(case_note_schema()));
    let incompatible = SchemaDefinition::new("incompatible")
        .field(FieldRule::required("incompatibleOffenderId", FieldType::String))
        .field(FieldRule::optional("incompatibleType", FieldType::String).nullable());

    let mut form = SchemaDefinition::new("custodyLevelDowngradeForm")
        .field(FieldRule::optional("lastCafDate", FieldType::Date))
        .field(FieldRule::optional("lastCafTotal", FieldType::IntegerFromString))
        .field(FieldRule::optional("latestClassificationDate", FieldType::Date))
        .field(FieldRule::optional("levelOfCare", FieldType::String).nullable())
        .field(FieldRule::optional("classificationType", FieldType::String).nullable())
        .field(FieldRule::optional("statusAtHearingSeg", FieldType::String).nullable())
        .field(FieldRule::optional("hasIncompatibles", FieldType::Boolean))
        .field(FieldRule::optional("incompatibleArray", FieldType::array_of(FieldType::object(incompatible))))
        .field(FieldRule::optional("currentOffenses", FieldType::array_of(FieldType::String)))
        .field(FieldRule::optional("activeRecommendations", FieldType::array_of(FieldType::Any)));
    for q in 1..=9 {
        form = form.field(FieldRule::optional(format!("q{}Score", q), FieldType::Integer));
    }
    form.field(FieldRule::optional("q6Notes", notes()))
        .field(FieldRule::optional("q7Notes", notes()))
}

pub fn custody_level_downgrade_schema() -> SchemaDefinition {
    let eligible = SchemaDefinition::new("custodyLevelDowngradeEligibleCriteria")
        .field(
            FieldRule::optional("custodyLevelIsNotMax", FieldType::Null).null_as(FieldValue::Record(Fields::new())),
        )
        .field(FieldRule::required(
            "custodyLevelHigherThanRecommended",
            FieldType::object(
                SchemaDefinition::new("custodyLevelHigherThanRecommended")
                    .field(FieldRule::required("custodyLevel", FieldType::String))
                    .field(FieldRule::required("recommendedCustodyLevel", FieldType::String)),
            ),
        ))
        .field(FieldRule::optional(
            "usTnIneligibleForAnnualReclassification",
            FieldType::object(
                SchemaDefinition::new("usTnIneligibleForAnnualReclassification").field(
                    FieldRule::optional("ineligibleCriteria", FieldType::array_of(FieldType::String))
                        .with_default(FieldValue::List(Vec::new())),
                ),
            ),
        ))
        .field(FieldRule::optional(
            "usTnLatestCafAssessmentNotOverride",
            FieldType::object(
                SchemaDefinition::new("usTnLatestCafAssessmentNotOverride")
                    .field(FieldRule::optional("overrideReason", FieldType::String).nullable()),
            ),
        ));

    let metadata = SchemaDefinition::new("metadata").field(
        FieldRule::optional(
            "assaultiveDisciplinaries",
            FieldType::array_of(FieldType::object(case_note_schema())),
        )
        .from_source("assaultive_disciplinaries")
        .with_alias("assaultiveDisciplinaries"),
    );

    let schema = referral_schema(
        "usTnCustodyLevelDowngrade",
        eligible,
        SchemaDefinition::new("custodyLevelDowngradeIneligibleCriteria"),
    )
    .field(
        FieldRule::optional("formInformation", FieldType::object(form_information()))
            .with_default(FieldValue::Record(Fields::new())),
    )
    .field(FieldRule::optional("metadata", FieldType::object(metadata)))
    .promote(FORM_PREFIX, "formInformation");

    merge_metadata_case_notes(&schema, "assaultiveDisciplinaries", ASSAULTIVE_DISCIPLINARIES)
}

pub fn custody_level_downgrade_copy() -> CriteriaCopy {
    CriteriaCopy::new()
        .eligible(
            "custodyLevelHigherThanRecommended",
            CriterionCopy::new(
                "Current custody level ({custodyLevel:lower}) is higher than recommended ({recommendedCustodyLevel:lower})",
            )
            .with_tooltip("Custody level is higher than latest CAF score suggests"),
        )
        .eligible("custodyLevelIsNotMax", CriterionCopy::new("Custody level is not maximum"))
        .eligible(
            "usTnLatestCafAssessmentNotOverride",
            CriterionCopy::new("Latest CAF assessment was not an override"),
        )
        .eligible(
            "usTnIneligibleForAnnualReclassification",
            CriterionCopy::new("Not eligible for annual reclassification: {ineligibleCriteria}"),
        )
        .denial_reason("OVERRIDE", "Override to remain at current custody level")
        .denial_reason("DISCIPLINARY", "Recent disciplinary history")
        .with_other_reason()
}

pub fn custody_level_downgrade() -> Result<OpportunityConfig, SchemaError> {
    Ok(OpportunityConfig {
        opportunity_type: OpportunityType::UsTnCustodyLevelDowngrade,
        label: "Custody Level Downgrade",
        schema: custody_level_downgrade_schema(),
        copy: custody_level_downgrade_copy(),
        eligibility_date_path: None,
    })
}
