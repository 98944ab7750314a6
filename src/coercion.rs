// 🔁 Field Coercion - wire scalars into domain values
// Exports are loosely typed: dates as strings or timestamp objects, arrays as
// stringified JSON, numbers as strings. Everything here is pure.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    #[error("expected a date, got `{0}`")]
    InvalidDate(String),

    #[error("invalid JSON string: {0}")]
    InvalidJson(String),

    #[error("expected a number, got `{0}`")]
    InvalidNumber(String),

    #[error("expected an integer, got `{0}`")]
    NotAnInteger(String),

    #[error("expected {expected}, got {actual}")]
    WrongShape {
        expected: &'static str,
        actual: &'static str,
    },
}

/// JSON type name for error messages.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// True for JSON null and strings that are empty after trimming.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

// ============================================================================
// DATES
// ============================================================================

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parse a date string. Time and offset components are dropped.
pub fn parse_date_str(raw: &str) -> Result<NaiveDate, CoercionError> {
    let s = raw.trim();
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_local().date());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }
    Err(CoercionError::InvalidDate(raw.to_string()))
}

/// Date from a string or a backend timestamp object
/// (`{"seconds": n}` or `{"_seconds": n}`).
pub fn coerce_date(value: &Value) -> Result<NaiveDate, CoercionError> {
    match value {
        Value::String(s) => parse_date_str(s),
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64)
                .ok_or(CoercionError::WrongShape {
                    expected: "timestamp object",
                    actual: "object",
                })?;
            DateTime::from_timestamp(seconds, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| CoercionError::InvalidDate(seconds.to_string()))
        }
        other => Err(CoercionError::WrongShape {
            expected: "date",
            actual: json_kind(other),
        }),
    }
}

/// Like [`coerce_date`] but blank input yields `None`.
pub fn coerce_optional_date(value: &Value) -> Result<Option<NaiveDate>, CoercionError> {
    if is_blank(value) {
        return Ok(None);
    }
    coerce_date(value).map(Some)
}

// ============================================================================
// STRINGIFIED JSON
// ============================================================================

/// Parse stringified JSON. Values that are already arrays or objects pass
/// through unchanged.
pub fn parse_json_string(value: &Value) -> Result<Value, CoercionError> {
    match value {
        Value::String(s) => {
            serde_json::from_str(s).map_err(|e| CoercionError::InvalidJson(e.to_string()))
        }
        Value::Array(_) | Value::Object(_) => Ok(value.clone()),
        other => Err(CoercionError::WrongShape {
            expected: "JSON string",
            actual: json_kind(other),
        }),
    }
}

// ============================================================================
// NUMBERS
// ============================================================================

/// Number from a JSON number or numeric string. Blank yields `None`,
/// which is distinct from `Some(0.0)`.
pub fn coerce_number(value: &Value) -> Result<Option<f64>, CoercionError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| CoercionError::InvalidNumber(n.to_string())),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Some)
                .ok_or_else(|| CoercionError::InvalidNumber(s.clone()))
        }
        other => Err(CoercionError::WrongShape {
            expected: "number",
            actual: json_kind(other),
        }),
    }
}

/// Integer variant of [`coerce_number`]; fractional values are rejected.
pub fn coerce_integer(value: &Value) -> Result<Option<i64>, CoercionError> {
    match coerce_number(value)? {
        None => Ok(None),
        Some(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => Ok(Some(n as i64)),
        Some(n) => Err(CoercionError::NotAnInteger(n.to_string())),
    }
}
