// End-to-end import scenarios: object storage -> sync engine -> SQLite

use serde_json::{json, Value};
use std::sync::Arc;

use eligibility_sync::auth::AllowAll;
use eligibility_sync::entities::client::UNKNOWN_GENDERS;
use eligibility_sync::report::{MemoryErrorTracker, ReportKind};
use eligibility_sync::snapshot::MemoryObjectStore;
use eligibility_sync::sync::RowFailure;
use eligibility_sync::{
    FieldValue, ImportOutcome, ImportRecordKey, ImportRequest, ImportService, OpportunityType, RecordType,
    RecordTypeRegistry, SqliteConnector, StateCode, Store, StoredRecord, ValidationErrorKind,
};

const BUCKET: &str = "recidiviz-test-exports";

struct Harness {
    objects: MemoryObjectStore,
    tracker: MemoryErrorTracker,
    service: ImportService,
}

impl Harness {
    fn new() -> Self {
        let objects = MemoryObjectStore::new();
        let tracker = MemoryErrorTracker::new();
        let service = ImportService::new(
            Arc::new(RecordTypeRegistry::builtin().unwrap()),
            Arc::new(SqliteConnector::in_memory().unwrap()),
            Arc::new(objects.clone()),
            Arc::new(AllowAll),
            Arc::new(tracker.clone()),
        );
        Harness {
            objects,
            tracker,
            service,
        }
    }

    fn import(&self, object: &str, rows: &[Value]) -> ImportOutcome {
        let body = rows.iter().map(|r| r.to_string()).collect::<Vec<_>>().join("\n");
        self.objects.put(BUCKET, object, body);
        self.service.handle(None, &ImportRequest::new(BUCKET, object))
    }

    fn rows(&self, record_type: RecordType, state: StateCode) -> Vec<StoredRecord> {
        self.service.connect().unwrap().find_many(record_type, state).unwrap()
    }

    fn row(&self, record_type: RecordType, state: StateCode, key: &ImportRecordKey) -> Option<StoredRecord> {
        self.service.connect().unwrap().get(record_type, state, key).unwrap()
    }
}

const CASES: &str = "US_ID/sentencing_case_record.json";
const CLIENTS: &str = "US_ID/sentencing_client_record.json";
const OPPORTUNITIES: &str = "US_ID/sentencing_community_opportunity_record.json";
const OFFENSES: &str = "US_ID/sentencing_charge_record.json";

fn case(external_id: &str) -> Value {
    json!({
        "external_id": external_id,
        "state_code": "US_ID",
        "staff_id": "staff-ext-1",
        "client_id": "client-ext-1",
        "due_date": "2024-06-01",
        "sentence_date": "2024-07-01",
        "assigned_date": "2024-05-01",
        "county": "ADA",
        "lsir_score": "23",
        "lsir_level": "MODERATE",
        "report_type": "PSI Assigned Full"
    })
}

fn client(external_id: &str, gender: &str) -> Value {
    json!({
        "external_id": external_id,
        "pseudonymized_id": format!("p-{}", external_id),
        "case_ids": "[\"case-ext-1\"]",
        "state_code": "US_IX",
        "full_name": "{\"given_names\": \"Jo\", \"middle_names\": \"\", \"surname\": \"Roe\", \"name_suffix\": \"\"}",
        "gender": gender,
        "county": "ADA",
        "birth_date": "1985-01-01"
    })
}

fn opportunity(name: &str, phone: &str) -> Value {
    json!({
        "OpportunityName": name,
        "Description": "Program",
        "ProviderName": "Provider",
        "CleanedProviderPhoneNumber": phone,
        "CapacityTotal": "20",
        "CapacityAvailable": "5",
        "NeedsAddressed": ["HOUSING"],
        "developmentalDisabilityDiagnosisCriterion": false,
        "noCurrentOrPriorSexOffenseCriterion": false,
        "noCurrentOrPriorViolentOffenseCriterion": false,
        "noPendingFelonyChargesInAnotherCountyOrStateCriterion": false,
        "entryOfGuiltyPleaCriterion": false,
        "veteranStatusCriterion": false,
        "diagnosedMentalHealthDiagnosisCriterion": [],
        "lastUpdatedDate": "2024-06-01",
        "genders": ["Men"]
    })
}

fn offense(name: &str) -> Value {
    json!({"state_code": "US_ID", "charge": name, "is_violent": false, "is_sex_offense": false})
}

fn case_key(id: &str) -> ImportRecordKey {
    ImportRecordKey::single("externalId", id)
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn full_replace_deletes_rows_missing_from_snapshot() {
    let h = Harness::new();
    assert_eq!(h.import(CASES, &[case("case-ext-1")]).status, 200);

    let outcome = h.import(CASES, &[case("new-case-ext-id")]);
    assert_eq!(outcome.status, 200);
    let job = outcome.job.unwrap();
    assert_eq!((job.inserted, job.updated, job.deleted), (1, 0, 1));

    let rows = h.rows(RecordType::Case, StateCode::UsId);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].key, case_key("new-case-ext-id"));
}

#[test]
fn omitted_lsir_score_keeps_stored_value() {
    let h = Harness::new();
    h.import(CASES, &[case("case-ext-1")]);

    let mut without_score = case("case-ext-1");
    without_score.as_object_mut().unwrap().remove("lsir_score");
    without_score["county"] = json!("CANYON");
    let outcome = h.import(CASES, &[without_score]);
    assert_eq!(outcome.job.unwrap().updated, 1);

    let stored = h.row(RecordType::Case, StateCode::UsId, &case_key("case-ext-1")).unwrap();
    assert_eq!(stored.fields["lsirScore"], FieldValue::Int(23));
    assert_eq!(stored.fields["county"], FieldValue::text("CANYON"));
    assert_eq!(stored.fields["reportType"], FieldValue::text("FullPSI"));
}

#[test]
fn composite_key_change_replaces_row() {
    let h = Harness::new();
    h.import(OPPORTUNITIES, &[opportunity("Housing First", "555-0100")]);

    let outcome = h.import(OPPORTUNITIES, &[opportunity("Housing First", "555-0199")]);
    let job = outcome.job.unwrap();
    assert_eq!((job.inserted, job.updated, job.deleted), (1, 0, 1));

    let rows = h.rows(RecordType::Opportunity, StateCode::UsId);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].fields["providerPhoneNumber"], FieldValue::text("555-0199"));
    assert_eq!(rows[0].fields["genders"], FieldValue::List(vec![FieldValue::text("MALE")]));
}

#[test]
fn missing_reference_rows_are_reported_not_deleted() {
    let h = Harness::new();
    h.import(OFFENSES, &[offense("THEFT"), offense("ARSON")]);

    let outcome = h.import(OFFENSES, &[offense("THEFT")]);
    assert_eq!(outcome.status, 200);

    let reports = h.tracker.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, ReportKind::MissingReferenceRows);
    assert_eq!(
        reports[0].message,
        "These offenses exist in the database but are missing from the data import: ARSON"
    );
    assert_eq!(h.rows(RecordType::Offense, StateCode::UsId).len(), 2);
}

#[test]
fn one_bad_row_is_isolated_all_bad_rows_fail() {
    let h = Harness::new();
    let mut misspelled = case("case-ext-2");
    let state = misspelled.as_object_mut().unwrap().remove("state_code").unwrap();
    misspelled["stateCode"] = state;

    let outcome = h.import(CASES, &[case("case-ext-1"), misspelled.clone()]);
    assert_eq!(outcome.status, 200);
    let job = outcome.job.unwrap();
    assert_eq!(job.inserted, 1);
    assert_eq!(job.row_errors.len(), 1);
    match &job.row_errors[0].failure {
        RowFailure::Invalid(err) => {
            assert_eq!(err.kind, ValidationErrorKind::MissingField);
            assert_eq!(err.field, "stateCode");
        }
        other => panic!("unexpected failure {:?}", other),
    }
    assert_eq!(h.tracker.reports()[0].kind, ReportKind::MalformedRows);

    let outcome = h.import(CASES, &[misspelled]);
    assert_eq!(outcome.status, 500);
    // nothing was pruned by the failed job
    assert_eq!(h.rows(RecordType::Case, StateCode::UsId).len(), 1);
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn reimporting_same_snapshot_is_idempotent() {
    let h = Harness::new();
    let snapshot = [case("case-ext-1"), case("case-ext-2"), case("case-ext-3")];

    h.import(CASES, &snapshot);
    let first: Vec<_> = h
        .rows(RecordType::Case, StateCode::UsId)
        .into_iter()
        .map(|r| (r.key, r.fields))
        .collect();

    let outcome = h.import(CASES, &snapshot);
    let job = outcome.job.unwrap();
    assert_eq!((job.inserted, job.updated, job.deleted), (0, 3, 0));

    let second: Vec<_> = h
        .rows(RecordType::Case, StateCode::UsId)
        .into_iter()
        .map(|r| (r.key, r.fields))
        .collect();
    assert_eq!(first, second);
}

#[test]
fn n_valid_and_m_malformed_rows() {
    let h = Harness::new();
    let body = format!(
        "{}\nnot json\n{}\n[]\n{}\n{{\"external_id\": 1}}\n",
        case("a"),
        case("b"),
        case("c")
    );
    h.objects.put(BUCKET, CASES, body);
    let outcome = h.service.handle(None, &ImportRequest::new(BUCKET, CASES));

    let job = outcome.job.unwrap();
    assert_eq!(job.rows_read, 6);
    assert_eq!(job.row_errors.len(), 3);
    assert_eq!(h.rows(RecordType::Case, StateCode::UsId).len(), 3);
}

#[test]
fn unknown_gender_never_overwrites_known_gender() {
    let h = Harness::new();
    h.import(CLIENTS, &[client("client-ext-1", "FEMALE")]);
    h.import(CLIENTS, &[client("client-ext-1", UNKNOWN_GENDERS[1])]);

    let stored = h.row(RecordType::Client, StateCode::UsId, &case_key("client-ext-1")).unwrap();
    assert_eq!(stored.fields["gender"], FieldValue::text("FEMALE"));
    assert_eq!(stored.fields["fullName"], FieldValue::text("Jo Roe"));
}

#[test]
fn states_are_reconciled_independently() {
    let h = Harness::new();
    h.import(CASES, &[case("case-ext-1")]);
    let mut nd_case = case("case-ext-1");
    nd_case["state_code"] = json!("US_ND");
    h.import("US_ND/sentencing_case_record.json", &[nd_case]);

    h.import(CASES, &[case("case-ext-9")]);
    assert_eq!(h.rows(RecordType::Case, StateCode::UsNd).len(), 1);
    assert_eq!(h.rows(RecordType::Case, StateCode::UsId).len(), 1);
}

#[test]
fn referral_rows_with_both_union_variants_are_rejected() {
    let h = Harness::new();
    let object = format!("US_MI/{}", OpportunityType::UsMiEarlyDischarge.file_name());
    let probation = json!({
        "stateCode": "US_MI",
        "externalId": "mi-1",
        "eligibleCriteria": {
            "usMiNotServingIneligibleOffensesForEarlyDischargeFromProbationSupervision": {}
        },
        "metadata": {"supervisionType": "Probation"}
    });
    let mut both = probation.clone();
    both["externalId"] = json!("mi-2");
    both["eligibleCriteria"]["usMiNotServingIneligibleOffensesForEarlyDischargeFromParoleDualSupervision"] = json!({});

    let outcome = h.import(&object, &[probation, both]);
    let job = outcome.job.unwrap();
    assert_eq!(job.inserted, 1);
    match &job.row_errors[0].failure {
        RowFailure::Invalid(err) => {
            assert!(matches!(err.kind, ValidationErrorKind::AmbiguousUnion { .. }))
        }
        other => panic!("unexpected failure {:?}", other),
    }
}

#[test]
fn audit_trail_records_each_change() {
    let h = Harness::new();
    h.import(CASES, &[case("case-ext-1")]);
    h.import(CASES, &[case("case-ext-2")]);

    let store = h.service.connect().unwrap();
    let events = store
        .events_for(RecordType::Case, StateCode::UsId, &case_key("case-ext-1"))
        .unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(kinds, vec!["record_deleted", "record_inserted"]);
}
