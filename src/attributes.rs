// 🏛️ Field Rules - what a single field means and how it is read
// A schema is an ordered list of field rules plus composition data.

use crate::record::FieldValue;
use crate::schema::SchemaDefinition;

// ============================================================================
// FIELD TYPES
// ============================================================================

/// Declared type of a field. Coercing variants accept the loose wire form.
#[derive(Debug, Clone)]
pub enum FieldType {
    String,
    Boolean,
    /// JSON number only
    Number,
    /// JSON integer only
    Integer,
    /// JSON number or numeric string; blank is absent
    NumberFromString,
    IntegerFromString,
    /// Date string or timestamp object; blank is absent
    Date,
    /// One of a closed set of strings
    Enum(Vec<String>),
    /// Wire strings mapped to canonical strings (`"Women"` -> `"FEMALE"`)
    EnumMap(Vec<(String, String)>),
    /// Only `null` is accepted
    Null,
    Array(Box<FieldType>),
    Object(Box<SchemaDefinition>),
    /// Object with arbitrary keys, every value of the inner type
    Map(Box<FieldType>),
    /// Stringified JSON whose parsed value has the inner type
    JsonString(Box<FieldType>),
    Any,
}

impl FieldType {
    pub fn enumeration<I, S>(values: I) -> FieldType
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldType::Enum(values.into_iter().map(Into::into).collect())
    }

    pub fn mapped<I, A, B>(pairs: I) -> FieldType
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        FieldType::EnumMap(pairs.into_iter().map(|(a, b)| (a.into(), b.into())).collect())
    }

    pub fn array_of(inner: FieldType) -> FieldType {
        FieldType::Array(Box::new(inner))
    }

    pub fn object(schema: SchemaDefinition) -> FieldType {
        FieldType::Object(Box::new(schema))
    }

    pub fn map_of(inner: FieldType) -> FieldType {
        FieldType::Map(Box::new(inner))
    }

    pub fn json_string(inner: FieldType) -> FieldType {
        FieldType::JsonString(Box::new(inner))
    }

    /// Human-readable name used as `expected` in type mismatches.
    pub fn describe(&self) -> String {
        match self {
            FieldType::String => "string".to_string(),
            FieldType::Boolean => "boolean".to_string(),
            FieldType::Number => "number".to_string(),
            FieldType::Integer => "integer".to_string(),
            FieldType::NumberFromString => "number or numeric string".to_string(),
            FieldType::IntegerFromString => "integer or integer string".to_string(),
            FieldType::Date => "date".to_string(),
            FieldType::Enum(values) => format!("one of [{}]", values.join(", ")),
            FieldType::EnumMap(pairs) => {
                let names: Vec<&str> = pairs.iter().map(|(raw, _)| raw.as_str()).collect();
                format!("one of [{}]", names.join(", "))
            }
            FieldType::Null => "null".to_string(),
            FieldType::Array(inner) => format!("array of {}", inner.describe()),
            FieldType::Object(schema) => format!("object `{}`", schema.name()),
            FieldType::Map(inner) => format!("map of {}", inner.describe()),
            FieldType::JsonString(inner) => format!("JSON string of {}", inner.describe()),
            FieldType::Any => "any".to_string(),
        }
    }
}

// ============================================================================
// FIELD RULE
// ============================================================================

/// One declared field.
///
/// `name` is the canonical (output) name. The value is read from `source`
/// first, then from each alias in order.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: String,
    pub source: String,
    pub aliases: Vec<String>,
    pub field_type: FieldType,
    pub required: bool,
    pub nullable: bool,
    /// Used when the field is absent
    pub default: Option<FieldValue>,
    /// Substituted when the wire value is `null`
    pub null_as: Option<FieldValue>,
    pub description: String,
}

impl FieldRule {
    fn new(name: impl Into<String>, field_type: FieldType, required: bool) -> Self {
        let name = name.into();
        FieldRule {
            source: name.clone(),
            name,
            aliases: Vec::new(),
            field_type,
            required,
            nullable: false,
            default: None,
            null_as: None,
            description: String::new(),
        }
    }

    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldRule::new(name, field_type, true)
    }

    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldRule::new(name, field_type, false)
    }

    /// Builder: read from a differently named wire key
    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Builder: also accept this wire key
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, value: FieldValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn null_as(mut self, value: FieldValue) -> Self {
        self.null_as = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Every wire key this rule reads from.
    pub fn source_keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.source.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

// ============================================================================
// SHARED FIELDS
// ============================================================================

pub const STATE_CODES: [&str; 7] = ["US_AZ", "US_ID", "US_IX", "US_ME", "US_MI", "US_ND", "US_TN"];

/// State code enum; `US_IX` is stored as `US_ID`.
pub fn state_code_type() -> FieldType {
    FieldType::mapped(STATE_CODES.iter().map(|code| match *code {
        "US_IX" => (*code, "US_ID"),
        other => (other, other),
    }))
}

/// `stateCode`, read from `state_code` in sentencing exports.
pub fn state_code_field() -> FieldRule {
    FieldRule::required("stateCode", state_code_type())
        .from_source("state_code")
        .with_description("State the record belongs to")
}

/// `externalId`, read from `external_id` in sentencing exports.
pub fn external_id_field() -> FieldRule {
    FieldRule::required("externalId", FieldType::String)
        .from_source("external_id")
        .with_description("Identifier assigned by the state system")
}

/// Criterion payload carrying only an `eligibleDate`.
pub fn eligible_date_payload(name: &str) -> SchemaDefinition {
    SchemaDefinition::new(name).field(FieldRule::optional("eligibleDate", FieldType::Date))
}

/// Snake-case wire key to camelCase (`form_information_last_caf_date` style).
pub fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for ch in key.chars() {
        if ch == '_' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}
