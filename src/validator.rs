// ✅ Record Validator - raw row + schema -> validated row or one error
// Pure. Malformed business data is always an Err, never a panic.

use crate::attributes::{snake_to_camel, FieldRule, FieldType};
use crate::coercion::{self, json_kind, CoercionError};
use crate::record::{FieldValue, Fields, RawRecord, ValidatedRecord};
use crate::schema::{SchemaDefinition, UnionGroup};
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

// ============================================================================
// VALIDATION ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum ValidationErrorKind {
    MissingField,
    TypeMismatch { expected: String, actual: String },
    AmbiguousUnion { union: String, matched: Vec<String> },
    TransformFailed { transform: String },
    UnexpectedField,
    /// Snapshot line was not a JSON object
    MalformedLine,
}

impl ValidationErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ValidationErrorKind::MissingField => "MissingField",
            ValidationErrorKind::TypeMismatch { .. } => "TypeMismatch",
            ValidationErrorKind::AmbiguousUnion { .. } => "AmbiguousUnion",
            ValidationErrorKind::TransformFailed { .. } => "TransformFailed",
            ValidationErrorKind::UnexpectedField => "UnexpectedField",
            ValidationErrorKind::MalformedLine => "MalformedLine",
        }
    }
}

/// One row's shape does not satisfy its schema. `field` is a dotted path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub field: String,
    pub detail: String,
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        ValidationError {
            kind: ValidationErrorKind::MissingField,
            field: field.into(),
            detail: "required field is missing".to_string(),
        }
    }

    pub fn malformed_line(detail: impl Into<String>) -> Self {
        ValidationError {
            kind: ValidationErrorKind::MalformedLine,
            field: String::new(),
            detail: detail.into(),
        }
    }

    fn mismatch(field: &str, expected: &FieldType, value: &Value) -> Self {
        let expected = expected.describe();
        let actual = json_kind(value).to_string();
        ValidationError {
            detail: format!("expected {}, got {}", expected, actual),
            kind: ValidationErrorKind::TypeMismatch { expected, actual },
            field: field.to_string(),
        }
    }

    fn coercion(field: &str, expected: &FieldType, value: &Value, err: CoercionError) -> Self {
        ValidationError {
            kind: ValidationErrorKind::TypeMismatch {
                expected: expected.describe(),
                actual: json_kind(value).to_string(),
            },
            field: field.to_string(),
            detail: err.to_string(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "[{}] {}", self.kind.label(), self.detail)
        } else {
            write!(f, "[{}] {}: {}", self.kind.label(), self.field, self.detail)
        }
    }
}

impl std::error::Error for ValidationError {}

// ============================================================================
// VALIDATE
// ============================================================================

/// Apply `schema` to `raw`.
///
/// Order: promotions, missing required fields, field types, unions, strict
/// key check, transforms. The first failure is returned.
pub fn validate(schema: &SchemaDefinition, raw: &RawRecord) -> Result<ValidatedRecord, ValidationError> {
    validate_at(schema, raw, "")
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn validate_at(
    schema: &SchemaDefinition,
    raw: &RawRecord,
    path: &str,
) -> Result<ValidatedRecord, ValidationError> {
    let raw = promote(schema, raw);

    for rule in schema.fields() {
        if rule.required && rule.default.is_none() && lookup(&raw, rule).is_none() {
            return Err(ValidationError::missing(join(path, &rule.name)));
        }
    }

    let mut fields = Fields::new();
    for rule in schema.fields() {
        if let Some(value) = read_field(rule, &raw, path)? {
            fields.insert(rule.name.clone(), value);
        }
    }

    let mut matched = Vec::new();
    for group in schema.unions() {
        let variant = match_variant(group, &raw, path)?;
        for rule in variant.fields() {
            if let Some(value) = read_field(rule, &raw, path)? {
                fields.insert(rule.name.clone(), value);
            }
        }
        matched.push(variant);
    }

    if schema.is_strict() {
        let known = schema.known_keys();
        if let Some(key) = raw.keys().find(|k| !known.contains(k.as_str())) {
            return Err(ValidationError {
                kind: ValidationErrorKind::UnexpectedField,
                field: join(path, key),
                detail: format!("`{}` does not accept unknown keys", schema.name()),
            });
        }
    }

    let transforms = matched
        .iter()
        .flat_map(|v| v.transforms())
        .chain(schema.transforms());
    let mut record = ValidatedRecord::new(fields);
    for transform in transforms {
        record = (transform.apply)(record).map_err(|e| ValidationError {
            kind: ValidationErrorKind::TransformFailed {
                transform: transform.name.clone(),
            },
            field: path.to_string(),
            detail: e.to_string(),
        })?;
    }
    Ok(record)
}

fn promote<'a>(schema: &SchemaDefinition, raw: &'a RawRecord) -> Cow<'a, RawRecord> {
    if schema.promotions().is_empty() {
        return Cow::Borrowed(raw);
    }
    let mut owned = raw.clone();
    for promotion in schema.promotions() {
        let keys: Vec<String> = owned
            .keys()
            .filter(|k| k.starts_with(&promotion.prefix))
            .cloned()
            .collect();
        if keys.is_empty() {
            continue;
        }
        let mut target = match owned.remove(&promotion.target) {
            Some(Value::Object(existing)) => existing,
            _ => serde_json::Map::new(),
        };
        for key in keys {
            if let Some(value) = owned.remove(&key) {
                let rest = &key[promotion.prefix.len()..];
                target.insert(snake_to_camel(rest), value);
            }
        }
        owned.insert(promotion.target.clone(), Value::Object(target));
    }
    Cow::Owned(owned)
}

fn lookup<'a>(raw: &'a RawRecord, rule: &FieldRule) -> Option<&'a Value> {
    rule.source_keys().find_map(|key| raw.get(key))
}

fn absent(rule: &FieldRule, field_path: &str) -> Result<Option<FieldValue>, ValidationError> {
    match &rule.default {
        Some(default) => Ok(Some(default.clone())),
        None if rule.required => Err(ValidationError::missing(field_path)),
        None => Ok(None),
    }
}

fn read_field(
    rule: &FieldRule,
    raw: &RawRecord,
    path: &str,
) -> Result<Option<FieldValue>, ValidationError> {
    let field_path = join(path, &rule.name);
    let value = match lookup(raw, rule) {
        Some(value) => value,
        None => return absent(rule, &field_path),
    };

    if value.is_null() {
        if let Some(substitute) = &rule.null_as {
            return Ok(Some(substitute.clone()));
        }
        if rule.nullable || matches!(rule.field_type, FieldType::Null | FieldType::Any) {
            return Ok(Some(FieldValue::Null));
        }
        if !rule.required {
            return absent(rule, &field_path);
        }
        return Err(ValidationError::mismatch(&field_path, &rule.field_type, value));
    }

    match coerce_value(&rule.field_type, value, &field_path)? {
        Some(coerced) => Ok(Some(coerced)),
        None => absent(rule, &field_path),
    }
}

/// `Ok(None)` means the value was blank for a coercing type.
fn coerce_value(
    field_type: &FieldType,
    value: &Value,
    path: &str,
) -> Result<Option<FieldValue>, ValidationError> {
    let mismatch = || ValidationError::mismatch(path, field_type, value);
    let coercion = |e: CoercionError| ValidationError::coercion(path, field_type, value, e);

    match field_type {
        FieldType::String => value
            .as_str()
            .map(|s| Some(FieldValue::text(s)))
            .ok_or_else(mismatch),
        FieldType::Boolean => value
            .as_bool()
            .map(|b| Some(FieldValue::Bool(b)))
            .ok_or_else(mismatch),
        FieldType::Number => value
            .as_f64()
            .map(|n| Some(FieldValue::number(n)))
            .ok_or_else(mismatch),
        FieldType::Integer => value
            .as_i64()
            .map(|n| Some(FieldValue::Int(n)))
            .ok_or_else(mismatch),
        FieldType::NumberFromString => Ok(coercion::coerce_number(value)
            .map_err(coercion)?
            .map(FieldValue::number)),
        FieldType::IntegerFromString => Ok(coercion::coerce_integer(value)
            .map_err(coercion)?
            .map(FieldValue::Int)),
        FieldType::Date => Ok(coercion::coerce_optional_date(value)
            .map_err(coercion)?
            .map(FieldValue::Date)),
        FieldType::Enum(allowed) => match value.as_str() {
            Some(s) if allowed.iter().any(|a| a == s) => Ok(Some(FieldValue::text(s))),
            _ => Err(mismatch()),
        },
        FieldType::EnumMap(pairs) => {
            let s = value.as_str().ok_or_else(mismatch)?;
            pairs
                .iter()
                .find(|(raw, canonical)| raw == s || canonical == s)
                .map(|(_, canonical)| Some(FieldValue::text(canonical.as_str())))
                .ok_or_else(mismatch)
        }
        FieldType::Null => {
            if value.is_null() {
                Ok(Some(FieldValue::Null))
            } else {
                Err(mismatch())
            }
        }
        FieldType::Array(inner) => {
            let items = value.as_array().ok_or_else(mismatch)?;
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{}[{}]", path, i);
                let coerced = if item.is_null() {
                    match inner.as_ref() {
                        FieldType::Date | FieldType::NumberFromString | FieldType::IntegerFromString
                        | FieldType::Null | FieldType::Any => Some(FieldValue::Null),
                        other => return Err(ValidationError::mismatch(&item_path, other, item)),
                    }
                } else {
                    coerce_value(inner, item, &item_path)?
                };
                out.push(coerced.unwrap_or(FieldValue::Null));
            }
            Ok(Some(FieldValue::List(out)))
        }
        FieldType::Object(schema) => {
            let object = value.as_object().ok_or_else(mismatch)?;
            let record = validate_at(schema, object, path)?;
            Ok(Some(FieldValue::Record(record.into_fields())))
        }
        FieldType::Map(inner) => {
            let object = value.as_object().ok_or_else(mismatch)?;
            let mut out = Fields::new();
            for (key, item) in object {
                let item_path = join(path, key);
                let coerced = if item.is_null() {
                    Some(FieldValue::Null)
                } else {
                    coerce_value(inner, item, &item_path)?
                };
                out.insert(key.clone(), coerced.unwrap_or(FieldValue::Null));
            }
            Ok(Some(FieldValue::Record(out)))
        }
        FieldType::JsonString(inner) => {
            let parsed = coercion::parse_json_string(value).map_err(coercion)?;
            coerce_value(inner, &parsed, path)
        }
        FieldType::Any => Ok(Some(FieldValue::from_json(value))),
    }
}

fn match_variant<'s>(
    group: &'s UnionGroup,
    raw: &RawRecord,
    path: &str,
) -> Result<&'s SchemaDefinition, ValidationError> {
    let touched: Vec<&SchemaDefinition> = group
        .variants
        .iter()
        .filter(|variant| variant.fields().iter().any(|rule| lookup(raw, rule).is_some()))
        .collect();

    let ambiguous = |matched: Vec<String>, detail: String| ValidationError {
        kind: ValidationErrorKind::AmbiguousUnion {
            union: group.name.clone(),
            matched,
        },
        field: path.to_string(),
        detail,
    };

    match touched.as_slice() {
        [] => {
            let names: Vec<&str> = group.variants.iter().map(|v| v.name()).collect();
            Err(ambiguous(
                Vec::new(),
                format!("no variant of `{}` matched; expected one of {}", group.name, names.join(", ")),
            ))
        }
        [variant] => {
            let missing = variant
                .fields()
                .iter()
                .find(|rule| rule.required && rule.default.is_none() && lookup(raw, rule).is_none());
            match missing {
                Some(rule) => Err(ambiguous(
                    Vec::new(),
                    format!("variant `{}` is incomplete: `{}` is missing", variant.name(), rule.name),
                )),
                None => Ok(*variant),
            }
        }
        many => {
            let names: Vec<String> = many.iter().map(|v| v.name().to_string()).collect();
            Err(ambiguous(
                names.clone(),
                format!("fields from more than one variant present: {}", names.join(", ")),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TransformError;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    fn case_schema() -> SchemaDefinition {
        SchemaDefinition::new("case")
            .field(FieldRule::required("externalId", FieldType::String).from_source("external_id"))
            .field(FieldRule::optional("lsirScore", FieldType::IntegerFromString).from_source("lsir_score"))
            .field(FieldRule::optional("dueDate", FieldType::Date).from_source("due_date"))
    }

    fn supervision_union() -> SchemaDefinition {
        let parole = SchemaDefinition::new("parole")
            .field(FieldRule::required("paroleCriterion", FieldType::Any));
        let probation = SchemaDefinition::new("probation")
            .field(FieldRule::required("probationCriterion", FieldType::Any))
            .field(FieldRule::optional("probationExtra", FieldType::String));
        SchemaDefinition::new("criteria")
            .field(FieldRule::optional("shared", FieldType::Any))
            .with_union("supervisionType", vec![parole, probation])
            .unwrap()
    }

    #[test]
    fn test_validates_and_renames() {
        let record = validate(
            &case_schema(),
            &raw(json!({"external_id": "case-1", "lsir_score": "30", "due_date": "2024-03-01"})),
        )
        .unwrap();

        assert_eq!(record.get_str("externalId"), Some("case-1"));
        assert_eq!(record.get("lsirScore"), Some(&FieldValue::Int(30)));
        assert_eq!(record.get_date("dueDate"), NaiveDate::from_ymd_opt(2024, 3, 1));
        let names: Vec<&String> = record.fields().keys().collect();
        assert_eq!(names, vec!["externalId", "lsirScore", "dueDate"]);
    }

    #[test]
    fn test_missing_required_field() {
        let err = validate(&case_schema(), &raw(json!({"lsir_score": "30"}))).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::MissingField);
        assert_eq!(err.field, "externalId");
    }

    #[test]
    fn test_type_mismatch_reports_expected_and_actual() {
        let err = validate(&case_schema(), &raw(json!({"external_id": 12}))).unwrap_err();
        assert_matches!(
            err.kind,
            ValidationErrorKind::TypeMismatch { ref expected, ref actual }
                if expected == "string" && actual == "number"
        );

        let err = validate(&case_schema(), &raw(json!({"external_id": "a", "due_date": "soon"}))).unwrap_err();
        assert_eq!(err.field, "dueDate");
        assert_eq!(err.kind.label(), "TypeMismatch");
    }

    #[test]
    fn test_blank_optional_coerced_value_is_absent() {
        let record = validate(&case_schema(), &raw(json!({"external_id": "a", "lsir_score": ""}))).unwrap();
        assert!(record.get("lsirScore").is_none());
    }

    #[test]
    fn test_extra_fields_ignored_unless_strict() {
        let input = raw(json!({"external_id": "a", "unknown": 1}));
        assert!(validate(&case_schema(), &input).is_ok());

        let err = validate(&case_schema().strict(), &input).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::UnexpectedField);
        assert_eq!(err.field, "unknown");
    }

    #[test]
    fn test_union_exactly_one_variant() {
        let schema = supervision_union();

        let record = validate(&schema, &raw(json!({"shared": 1, "paroleCriterion": null}))).unwrap();
        assert!(record.get("paroleCriterion").is_some());
        assert!(record.get("probationCriterion").is_none());

        let err = validate(&schema, &raw(json!({"paroleCriterion": null, "probationCriterion": null})))
            .unwrap_err();
        assert_matches!(
            err.kind,
            ValidationErrorKind::AmbiguousUnion { ref matched, .. } if matched.len() == 2
        );

        let err = validate(&schema, &raw(json!({"shared": 1}))).unwrap_err();
        assert_matches!(
            err.kind,
            ValidationErrorKind::AmbiguousUnion { ref matched, .. } if matched.is_empty()
        );
    }

    #[test]
    fn test_union_partial_variant_does_not_match() {
        let err = validate(&supervision_union(), &raw(json!({"probationExtra": "x"}))).unwrap_err();
        assert_eq!(err.kind.label(), "AmbiguousUnion");
        assert!(err.detail.contains("probationCriterion"));
    }

    #[test]
    fn test_nested_error_path() {
        let schema = SchemaDefinition::new("record").field(FieldRule::required(
            "eligibleCriteria",
            FieldType::object(supervision_union()),
        ));
        let err = validate(&schema, &raw(json!({"eligibleCriteria": {"shared": 1}}))).unwrap_err();
        assert_eq!(err.field, "eligibleCriteria");

        let schema = SchemaDefinition::new("record")
            .field(FieldRule::required("formInformation", FieldType::object(case_schema())));
        let err = validate(&schema, &raw(json!({"formInformation": {"external_id": "a", "due_date": 3}})))
            .unwrap_err();
        assert_eq!(err.field, "formInformation.dueDate");
    }

    #[test]
    fn test_transform_failure_is_reported() {
        let schema = case_schema().with_transform("needsScore", |record| {
            if record.get("lsirScore").is_none() {
                return Err(TransformError::new("lsirScore is required here"));
            }
            Ok(record)
        });
        let err = validate(&schema, &raw(json!({"external_id": "a"}))).unwrap_err();
        assert_matches!(err.kind, ValidationErrorKind::TransformFailed { ref transform } if transform == "needsScore");
    }

    #[test]
    fn test_promotion_moves_prefixed_keys() {
        let form = SchemaDefinition::new("form")
            .field(FieldRule::optional("lastCafDate", FieldType::Date))
            .field(FieldRule::optional("q1Score", FieldType::Integer));
        let schema = SchemaDefinition::new("custody")
            .field(FieldRule::required("formInformation", FieldType::object(form)))
            .promote("form_information_", "formInformation")
            .strict();

        let record = validate(
            &schema,
            &raw(json!({"form_information_last_caf_date": "2022-08-22", "form_information_q1_score": -3})),
        )
        .unwrap();
        let form = record.get_record("formInformation").unwrap();
        assert_eq!(form.get("q1Score"), Some(&FieldValue::Int(-3)));
        assert!(form.get("lastCafDate").and_then(FieldValue::as_date).is_some());
    }

    #[test]
    fn test_json_string_and_enum_map() {
        let schema = SchemaDefinition::new("client")
            .field(FieldRule::required("caseIds", FieldType::json_string(FieldType::array_of(FieldType::String))))
            .field(FieldRule::optional("gender", FieldType::mapped([("Women", "FEMALE"), ("Men", "MALE")])));

        let record = validate(&schema, &raw(json!({"caseIds": "[\"1\",\"2\"]", "gender": "Women"}))).unwrap();
        assert_eq!(record.get("caseIds").and_then(FieldValue::as_list).map(|l| l.len()), Some(2));
        assert_eq!(record.get_str("gender"), Some("FEMALE"));

        let err = validate(&schema, &raw(json!({"caseIds": "[1"}))).unwrap_err();
        assert_eq!(err.kind.label(), "TypeMismatch");
    }

    #[test]
    fn test_null_handling() {
        let schema = SchemaDefinition::new("criteria")
            .field(FieldRule::required("nullableCriterion", FieldType::Any).nullable())
            .field(FieldRule::required("emptied", FieldType::Null).null_as(FieldValue::Record(Fields::new())))
            .field(FieldRule::optional("flag", FieldType::Boolean).with_default(FieldValue::Null));

        let record = validate(&schema, &raw(json!({"nullableCriterion": null, "emptied": null}))).unwrap();
        assert_eq!(record.get("nullableCriterion"), Some(&FieldValue::Null));
        assert_eq!(record.get("emptied"), Some(&FieldValue::Record(Fields::new())));
        assert_eq!(record.get("flag"), Some(&FieldValue::Null));
    }
}
