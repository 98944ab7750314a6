// Requirement derivation over imported referral records

use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;

use eligibility_sync::auth::AllowAll;
use eligibility_sync::report::MemoryErrorTracker;
use eligibility_sync::snapshot::MemoryObjectStore;
use eligibility_sync::{
    CriteriaCopy, ImportRecordKey, ImportRequest, ImportService, OpportunityType, RecordType, RecordTypeRegistry,
    SqliteConnector, Store, ValidatedRecord,
};

fn sccp_record() -> Value {
    json!({
        "stateCode": "US_ME",
        "externalId": "RES-1",
        "eligibleCriteria": {
            "usMeCustodyLevelIsMinimumOrCommunity": {"custodyLevel": "COMMUNITY"},
            "usMeServedXPortionOfSentence": {"eligibleDate": "2022-07-01", "xPortionServed": "2/3"},
            "usMeNoDetainersWarrantsOrOther": null,
            "usMeNoClassAOrBViolationFor90Days": null
        },
        "ineligibleCriteria": {
            "usMeXMonthsRemainingOnSentence": {"eligibleDate": "2022-12-15"}
        }
    })
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 9, 1).unwrap()
}

#[test]
fn every_opportunity_has_a_config_and_import_route() {
    let registry = RecordTypeRegistry::builtin().unwrap();
    for opportunity in OpportunityType::ALL {
        let config = opportunity.config().unwrap();
        assert_eq!(config.opportunity_type, opportunity);
        assert!(!config.copy.denial_reasons.is_empty(), "{} has no denial reasons", opportunity);

        let spec = registry
            .resolve(opportunity.state_code(), opportunity.file_name())
            .unwrap_or_else(|| panic!("{} is not importable", opportunity));
        assert_eq!(spec.record_type, RecordType::Referral(opportunity));
        assert_eq!(opportunity.as_str().parse::<OpportunityType>().unwrap(), opportunity);
    }
}

#[test]
fn summary_of_stored_row_matches_freshly_parsed_row() {
    let objects = MemoryObjectStore::new();
    let service = ImportService::new(
        Arc::new(RecordTypeRegistry::builtin().unwrap()),
        Arc::new(SqliteConnector::in_memory().unwrap()),
        Arc::new(objects.clone()),
        Arc::new(AllowAll),
        Arc::new(MemoryErrorTracker::new()),
    );
    let object = format!("US_ME/{}", OpportunityType::UsMeSccp.file_name());
    objects.put("exports", &object, sccp_record().to_string());
    let outcome = service.handle(None, &ImportRequest::new("exports", object));
    assert_eq!(outcome.status, 200, "{}", outcome.message);

    let config = OpportunityType::UsMeSccp.config().unwrap();
    let stored = service
        .connect()
        .unwrap()
        .get(
            RecordType::Referral(OpportunityType::UsMeSccp),
            OpportunityType::UsMeSccp.state_code(),
            &ImportRecordKey::single("externalId", "RES-1"),
        )
        .unwrap()
        .unwrap();

    let from_store = config.summarize(&ValidatedRecord::new(stored.fields), today());
    let parsed = config.parse(sccp_record().as_object().unwrap()).unwrap();
    assert_eq!(from_store, config.summarize(&parsed, today()));
    assert!(from_store.almost_eligible);
    assert_eq!(from_store.requirements_met.len(), 4);
}

#[test]
fn copy_overrides_replace_single_lines() {
    let overrides = CriteriaCopy::from_json_str(
        r#"{
            "eligible": {
                "usMeNoDetainersWarrantsOrOther": {"text": "No holds on file"}
            },
            "denialReasons": {"TRANSFER": "Pending transfer"}
        }"#,
    )
    .unwrap();
    let config = OpportunityType::UsMeSccp.config().unwrap().with_copy_overrides(overrides);
    let parsed = config.parse(sccp_record().as_object().unwrap()).unwrap();
    let summary = config.summarize(&parsed, today());

    let texts: Vec<&str> = summary.requirements_met.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts[2], "No holds on file");
    assert_eq!(texts[0], "Currently on community");
    assert_eq!(summary.denial_reasons["TRANSFER"], "Pending transfer");
    assert!(summary.denial_reasons.contains_key("DECLINE"));
}

#[test]
fn mi_probation_record_reads_eligibility_date_from_metadata() {
    let config = OpportunityType::UsMiEarlyDischarge.config().unwrap();
    let raw = json!({
        "stateCode": "US_MI",
        "externalId": "mi-1",
        "eligibleCriteria": {
            "usMiNotServingIneligibleOffensesForEarlyDischargeFromProbationSupervision": {}
        },
        "metadata": {"supervisionType": "Probation", "eligibleDate": "2022-10-01"}
    });
    let record = config.parse(raw.as_object().unwrap()).unwrap();
    let summary = config.summarize(&record, today());

    assert_eq!(summary.eligibility_date, NaiveDate::from_ymd_opt(2022, 10, 1));
    assert!(!summary.almost_eligible);
    assert!(summary.requirements_almost_met.is_empty());
}
