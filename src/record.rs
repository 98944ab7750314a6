// 🧾 Record Model - raw rows, validated rows, business keys
// Raw rows are untrusted JSON maps. Validated rows are typed, ordered values.

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::opportunities::OpportunityType;

/// One untrusted row as it arrives from an export.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Ordered field map. Order follows the schema declaration order.
pub type Fields = IndexMap<String, FieldValue>;

// ============================================================================
// FIELD VALUES
// ============================================================================

/// Canonical, strongly-typed value produced by validation.
///
/// Serialized untagged so stored rows stay plain JSON. Dates serialize as
/// `YYYY-MM-DD`; when read back from the store, any string in that exact
/// shape comes back as a `Date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Text(String),
    List(Vec<FieldValue>),
    Record(Fields),
}

impl FieldValue {
    /// Convert arbitrary JSON without coercion (strings stay text).
    pub fn from_json(value: &serde_json::Value) -> FieldValue {
        use serde_json::Value;
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Array(items) => FieldValue::List(items.iter().map(FieldValue::from_json).collect()),
            Value::Object(map) => FieldValue::Record(
                map.iter()
                    .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Number from a float, collapsing integral values to `Int`.
    pub fn number(value: f64) -> FieldValue {
        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            FieldValue::Int(value as i64)
        } else {
            FieldValue::Float(value)
        }
    }

    pub fn text(value: impl Into<String>) -> FieldValue {
        FieldValue::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Fields> {
        match self {
            FieldValue::Record(fields) => Some(fields),
            _ => None,
        }
    }

    /// Short type name used in validation messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Int(_) => "integer",
            FieldValue::Float(_) => "number",
            FieldValue::Date(_) => "date",
            FieldValue::Text(_) => "string",
            FieldValue::List(_) => "array",
            FieldValue::Record(_) => "object",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(", "))
            }
            FieldValue::Record(_) => write!(f, "[object]"),
        }
    }
}

// ============================================================================
// VALIDATED RECORD
// ============================================================================

/// Output of applying a schema to a raw row. Owned by whoever produced it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidatedRecord {
    fields: Fields,
}

impl ValidatedRecord {
    pub fn new(fields: Fields) -> Self {
        ValidatedRecord { fields }
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Dotted-path lookup, e.g. `eligibleCriteria.usMeServedXPortionOfSentence`.
    pub fn get_path(&self, path: &str) -> Option<&FieldValue> {
        get_path(&self.fields, path)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    pub fn get_date(&self, name: &str) -> Option<NaiveDate> {
        self.get(name).and_then(FieldValue::as_date)
    }

    pub fn get_record(&self, name: &str) -> Option<&Fields> {
        self.get(name).and_then(FieldValue::as_record)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    /// Remove preserving the order of the remaining fields.
    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.shift_remove(name)
    }
}

/// Dotted-path lookup through nested records.
pub fn get_path<'a>(fields: &'a Fields, path: &str) -> Option<&'a FieldValue> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = fields.get(first)?;
    for part in parts {
        current = current.as_record()?.get(part)?;
    }
    Some(current)
}

// ============================================================================
// STATE CODES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StateCode {
    #[serde(rename = "US_AZ")]
    UsAz,
    #[serde(rename = "US_ID")]
    UsId,
    #[serde(rename = "US_ME")]
    UsMe,
    #[serde(rename = "US_MI")]
    UsMi,
    #[serde(rename = "US_ND")]
    UsNd,
    #[serde(rename = "US_TN")]
    UsTn,
}

impl StateCode {
    pub const ALL: [StateCode; 6] = [
        StateCode::UsAz,
        StateCode::UsId,
        StateCode::UsMe,
        StateCode::UsMi,
        StateCode::UsNd,
        StateCode::UsTn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateCode::UsAz => "US_AZ",
            StateCode::UsId => "US_ID",
            StateCode::UsMe => "US_ME",
            StateCode::UsMi => "US_MI",
            StateCode::UsNd => "US_ND",
            StateCode::UsTn => "US_TN",
        }
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "US_AZ" => Ok(StateCode::UsAz),
            // Idaho exports under both codes
            "US_ID" | "US_IX" => Ok(StateCode::UsId),
            "US_ME" => Ok(StateCode::UsMe),
            "US_MI" => Ok(StateCode::UsMi),
            "US_ND" => Ok(StateCode::UsNd),
            "US_TN" => Ok(StateCode::UsTn),
            other => Err(format!("unknown state code `{}`", other)),
        }
    }
}

// ============================================================================
// RECORD TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    Case,
    Client,
    Staff,
    /// Community program a client may be recommended to
    Opportunity,
    Offense,
    Insight,
    /// Per-person eligibility record for one opportunity
    Referral(OpportunityType),
}

impl RecordType {
    /// Stable identifier used as the store's type column.
    pub fn id(&self) -> String {
        match self {
            RecordType::Case => "case".to_string(),
            RecordType::Client => "client".to_string(),
            RecordType::Staff => "staff".to_string(),
            RecordType::Opportunity => "opportunity".to_string(),
            RecordType::Offense => "offense".to_string(),
            RecordType::Insight => "insight".to_string(),
            RecordType::Referral(t) => format!("referral:{}", t.as_str()),
        }
    }

    /// Plural noun for operator-facing messages.
    pub fn plural_noun(&self) -> &'static str {
        match self {
            RecordType::Case => "cases",
            RecordType::Client => "clients",
            RecordType::Staff => "staff",
            RecordType::Opportunity => "opportunities",
            RecordType::Offense => "offenses",
            RecordType::Insight => "insights",
            RecordType::Referral(_) => "referrals",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "case" => Ok(RecordType::Case),
            "client" => Ok(RecordType::Client),
            "staff" => Ok(RecordType::Staff),
            "opportunity" => Ok(RecordType::Opportunity),
            "offense" => Ok(RecordType::Offense),
            "insight" => Ok(RecordType::Insight),
            other => match other.strip_prefix("referral:") {
                Some(t) => t.parse().map(RecordType::Referral),
                None => Err(format!("unknown record type `{}`", other)),
            },
        }
    }
}

// ============================================================================
// IMPORT RECORD KEY
// ============================================================================

/// Business key matching an incoming row to a persisted one.
///
/// Composite keys keep their part names, so two keys only compare equal when
/// both the shape and every value match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImportRecordKey {
    parts: Vec<(String, String)>,
}

impl ImportRecordKey {
    pub fn new(parts: Vec<(String, String)>) -> Self {
        ImportRecordKey { parts }
    }

    pub fn single(field: impl Into<String>, value: impl Into<String>) -> Self {
        ImportRecordKey {
            parts: vec![(field.into(), value.into())],
        }
    }

    /// Build from validated fields. Missing or null parts become empty strings.
    pub fn from_fields(fields: &Fields, key_fields: &[&str]) -> Self {
        let parts = key_fields
            .iter()
            .map(|name| {
                let value = fields.get(*name).map(|v| v.to_string()).unwrap_or_default();
                (name.to_string(), value)
            })
            .collect();
        ImportRecordKey { parts }
    }

    pub fn parts(&self) -> &[(String, String)] {
        &self.parts
    }

    /// Field names joined with `+`, e.g. `opportunityName+providerPhoneNumber`.
    pub fn shape(&self) -> String {
        self.parts
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join("+")
    }

    /// Unambiguous encoding of the values (JSON array).
    pub fn encoded(&self) -> String {
        let values: Vec<&str> = self.parts.iter().map(|(_, v)| v.as_str()).collect();
        serde_json::to_string(&values).unwrap_or_default()
    }

    /// Rebuild from the store's shape + encoded columns.
    pub fn decode(shape: &str, encoded: &str) -> Option<Self> {
        let values: Vec<String> = serde_json::from_str(encoded).ok()?;
        let names: Vec<&str> = shape.split('+').collect();
        if names.len() != values.len() {
            return None;
        }
        Some(ImportRecordKey {
            parts: names
                .into_iter()
                .map(str::to_string)
                .zip(values)
                .collect(),
        })
    }

    /// SHA-256 of shape and values, used as the store's lookup column.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.shape());
        hasher.update([0u8]);
        hasher.update(self.encoded());
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Display for ImportRecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [(_, value)] = self.parts.as_slice() {
            return f.write_str(value);
        }
        let rendered: Vec<String> = self
            .parts
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        f.write_str(&rendered.join(", "))
    }
}
