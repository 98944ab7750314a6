// Import Record Types - one schema + key + prune policy per export file
//
// Every snapshot file maps to exactly one record type. The registry is the
// single place that says which types are full-replace and which are
// reference data that must never shrink.

pub mod case;
pub mod client;
pub mod insight;
pub mod offense;
pub mod opportunity;
pub mod staff;

use crate::opportunities::OpportunityType;
use crate::record::{FieldValue, Fields, ImportRecordKey, RecordType, StateCode, ValidatedRecord};
use crate::schema::{SchemaDefinition, SchemaError};
use serde::Serialize;

/// States that export the sentencing record types.
pub const SENTENCING_STATES: [StateCode; 2] = [StateCode::UsId, StateCode::UsNd];

// ============================================================================
// PRUNE POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PrunePolicy {
    /// Snapshot is authoritative: stored rows missing from it are deleted.
    FullReplace,
    /// Rows only ever grow; a missing stored row is an upstream error.
    Reference,
}

/// On update, an incoming value listed here does not overwrite the stored
/// value (inserts still write it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepStoredWhen {
    pub field: &'static str,
    pub values: &'static [&'static str],
}

// ============================================================================
// RECORD TYPE SPEC
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordTypeSpec {
    pub record_type: RecordType,
    pub file_name: &'static str,
    pub states: Vec<StateCode>,
    pub key_fields: &'static [&'static str],
    pub policy: PrunePolicy,
    pub schema: SchemaDefinition,
    pub keep_stored: Vec<KeepStoredWhen>,
}

impl RecordTypeSpec {
    pub fn new(
        record_type: RecordType,
        file_name: &'static str,
        key_fields: &'static [&'static str],
        policy: PrunePolicy,
        schema: SchemaDefinition,
    ) -> Self {
        RecordTypeSpec {
            record_type,
            file_name,
            states: SENTENCING_STATES.to_vec(),
            key_fields,
            policy,
            schema,
            keep_stored: Vec::new(),
        }
    }

    pub fn for_states(mut self, states: &[StateCode]) -> Self {
        self.states = states.to_vec();
        self
    }

    pub fn keep_stored_when(mut self, field: &'static str, values: &'static [&'static str]) -> Self {
        self.keep_stored.push(KeepStoredWhen { field, values });
        self
    }

    pub fn key_of(&self, record: &ValidatedRecord) -> ImportRecordKey {
        ImportRecordKey::from_fields(record.fields(), self.key_fields)
    }

    pub fn key_shape(&self) -> String {
        self.key_fields.join("+")
    }

    pub fn is_reference(&self) -> bool {
        self.policy == PrunePolicy::Reference
    }

    /// Fields to write over an existing row.
    ///
    /// Fields absent from `incoming` are left as stored; `keep_stored` rules
    /// drop incoming values that must not replace a stored one.
    pub fn merge_for_update(&self, stored: &Fields, incoming: &Fields) -> Fields {
        let mut merged = stored.clone();
        for (name, value) in incoming {
            let keep = self.keep_stored.iter().any(|rule| {
                rule.field == name.as_str()
                    && stored.get(name).map(|v| !v.is_null()).unwrap_or(false)
                    && matches!(value, FieldValue::Text(t) if rule.values.contains(&t.as_str()))
            });
            if !keep {
                merged.insert(name.clone(), value.clone());
            }
        }
        merged
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordTypeRegistry {
    specs: Vec<RecordTypeSpec>,
}

impl RecordTypeRegistry {
    pub fn new(specs: Vec<RecordTypeSpec>) -> Self {
        RecordTypeRegistry { specs }
    }

    /// All sentencing record types plus one referral type per opportunity.
    pub fn builtin() -> Result<Self, SchemaError> {
        let mut specs = vec![
            case::spec(),
            client::spec(),
            staff::spec(),
            opportunity::spec(),
            offense::spec(),
            insight::spec(),
        ];
        for opportunity_type in OpportunityType::ALL {
            specs.push(referral_spec(opportunity_type)?);
        }
        for spec in &specs {
            spec.schema.check_unions()?;
        }
        Ok(RecordTypeRegistry { specs })
    }

    /// Match an object path's `(state, file)` pair.
    pub fn resolve(&self, state: StateCode, file_name: &str) -> Option<&RecordTypeSpec> {
        self.specs
            .iter()
            .find(|s| s.file_name == file_name && s.states.contains(&state))
    }

    pub fn get(&self, state: StateCode, record_type: RecordType) -> Option<&RecordTypeSpec> {
        self.specs
            .iter()
            .find(|s| s.record_type == record_type && s.states.contains(&state))
    }

    pub fn specs(&self) -> &[RecordTypeSpec] {
        &self.specs
    }
}

/// Referral records: full-replace per state, keyed by `externalId`.
pub fn referral_spec(opportunity_type: OpportunityType) -> Result<RecordTypeSpec, SchemaError> {
    let config = opportunity_type.config()?;
    Ok(RecordTypeSpec::new(
        RecordType::Referral(opportunity_type),
        opportunity_type.file_name(),
        &["externalId"],
        PrunePolicy::FullReplace,
        config.schema,
    )
    .for_states(&[opportunity_type.state_code()]))
}

/// `{"given_names": .., "surname": ..}` collapsed to one display string.
pub fn full_name_to_string(name: &Fields) -> String {
    ["givenNames", "middleNames", "surname", "nameSuffix"]
        .iter()
        .filter_map(|part| name.get(*part).and_then(FieldValue::as_str))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Schema for the stringified `full_name` object.
pub fn full_name_schema() -> SchemaDefinition {
    use crate::attributes::{FieldRule, FieldType};
    SchemaDefinition::new("fullName")
        .field(FieldRule::optional("givenNames", FieldType::String).from_source("given_names").nullable())
        .field(FieldRule::optional("middleNames", FieldType::String).from_source("middle_names").nullable())
        .field(FieldRule::optional("surname", FieldType::String).nullable())
        .field(FieldRule::optional("nameSuffix", FieldType::String).from_source("name_suffix").nullable())
}

/// Transform: replace the parsed `fullName` object with its display string.
pub fn collapse_full_name(schema: &SchemaDefinition) -> SchemaDefinition {
    schema.with_transform("collapseFullName", |mut record| {
        let display = record.get_record("fullName").map(full_name_to_string);
        if let Some(display) = display {
            record.insert("fullName", FieldValue::Text(display));
        }
        Ok(record)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_resolves_known_pairs_only() {
        let registry = RecordTypeRegistry::builtin().unwrap();

        let case = registry.resolve(StateCode::UsId, case::FILE_NAME).unwrap();
        assert_eq!(case.record_type, RecordType::Case);
        assert!(registry.resolve(StateCode::UsTn, case::FILE_NAME).is_none());
        assert!(registry.resolve(StateCode::UsId, "unknown_record.json").is_none());

        let referral = registry
            .resolve(StateCode::UsMe, OpportunityType::UsMeSccp.file_name())
            .unwrap();
        assert_eq!(referral.record_type, RecordType::Referral(OpportunityType::UsMeSccp));
    }

    #[test]
    fn test_only_offenses_are_reference_data() {
        let registry = RecordTypeRegistry::builtin().unwrap();
        let reference: Vec<RecordType> = registry
            .specs()
            .iter()
            .filter(|s| s.is_reference())
            .map(|s| s.record_type)
            .collect();
        assert_eq!(reference, vec![RecordType::Offense]);
    }

    #[test]
    fn test_merge_keeps_absent_and_guarded_fields() {
        let spec = client::spec();
        let mut stored = Fields::new();
        stored.insert("gender".into(), FieldValue::text("FEMALE"));
        stored.insert("county".into(), FieldValue::text("ADA"));
        stored.insert("district".into(), FieldValue::text("D1"));

        let mut incoming = Fields::new();
        incoming.insert("gender".into(), FieldValue::text("EXTERNAL_UNKNOWN"));
        incoming.insert("county".into(), FieldValue::text("BOISE"));

        let merged = spec.merge_for_update(&stored, &incoming);
        assert_eq!(merged["gender"], FieldValue::text("FEMALE"));
        assert_eq!(merged["county"], FieldValue::text("BOISE"));
        assert_eq!(merged["district"], FieldValue::text("D1"));
    }

    #[test]
    fn test_full_name_display() {
        let mut name = Fields::new();
        name.insert("givenNames".into(), FieldValue::text("Jane"));
        name.insert("middleNames".into(), FieldValue::text(""));
        name.insert("surname".into(), FieldValue::text("Doe"));
        name.insert("nameSuffix".into(), FieldValue::text("Jr"));
        assert_eq!(full_name_to_string(&name), "Jane Doe Jr");
    }
}
