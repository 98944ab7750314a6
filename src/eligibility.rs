// 🎯 Eligibility Deriver - validated record + copy table -> requirement lines
// Pure functions. "today" is always passed in so output is reproducible.

use crate::record::{FieldValue, Fields, ValidatedRecord};
use crate::rules::{CriteriaCopy, CriterionCopy, OpportunityRequirement};
use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;

pub const ELIGIBLE_CRITERIA: &str = "eligibleCriteria";
pub const INELIGIBLE_CRITERIA: &str = "ineligibleCriteria";
const TIME_REMAINING: &str = "$TIME_REMAINING";

/// Everything the UI asks about one opportunity record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilitySummary {
    pub requirements_met: Vec<OpportunityRequirement>,
    pub requirements_almost_met: Vec<OpportunityRequirement>,
    pub almost_eligible: bool,
    pub eligibility_date: Option<NaiveDate>,
    pub denial_reasons: IndexMap<String, String>,
}

/// Build the full summary. `date_path` names the field holding the
/// eligibility date (e.g. `eligibleStartDate`, `metadata.eligibleDate`).
pub fn summarize(
    record: &ValidatedRecord,
    copy: &CriteriaCopy,
    date_path: Option<&str>,
    today: NaiveDate,
) -> EligibilitySummary {
    let requirements_almost_met = derive_almost_met(record, copy, today);
    EligibilitySummary {
        requirements_met: derive_requirements(record, copy),
        almost_eligible: record
            .get_record(INELIGIBLE_CRITERIA)
            .map(|c| !c.is_empty())
            .unwrap_or(false),
        requirements_almost_met,
        eligibility_date: eligibility_date(record, date_path),
        denial_reasons: copy.denial_reasons.clone(),
    }
}

// ============================================================================
// REQUIREMENTS MET
// ============================================================================

/// Requirement lines for `eligibleCriteria`, in schema order.
///
/// Keys without copy are internal-only and skipped. When the table defines
/// groups, ungrouped criteria come first, then each group that has at least
/// one criterion present, prefixed with its heading.
pub fn derive_requirements(record: &ValidatedRecord, copy: &CriteriaCopy) -> Vec<OpportunityRequirement> {
    let criteria = match record.get_record(ELIGIBLE_CRITERIA) {
        Some(criteria) => criteria,
        None => return Vec::new(),
    };

    if copy.groups.is_empty() {
        return criteria
            .iter()
            .filter_map(|(key, payload)| {
                let entry = copy.eligible.get(key)?;
                render(entry, payload, record, None)
            })
            .collect();
    }

    let grouped: HashSet<&str> = copy
        .groups
        .iter()
        .flat_map(|g| g.criteria.iter().map(String::as_str))
        .collect();

    let mut requirements: Vec<OpportunityRequirement> = criteria
        .iter()
        .filter(|(key, _)| !grouped.contains(key.as_str()))
        .filter_map(|(key, payload)| render(copy.eligible.get(key)?, payload, record, None))
        .collect();

    for group in &copy.groups {
        let lines: Vec<OpportunityRequirement> = criteria
            .iter()
            .filter(|(key, _)| group.criteria.iter().any(|c| c == *key))
            .filter_map(|(key, payload)| {
                let mut line = render(copy.eligible.get(key)?, payload, record, None)?;
                line.key = Some(format!("{}:{}", group.key, key));
                Some(line)
            })
            .collect();
        if lines.is_empty() {
            continue;
        }
        requirements.push(OpportunityRequirement::heading(&group.heading, &group.key));
        requirements.extend(lines);
    }
    requirements
}

/// Requirement lines for `ineligibleCriteria`. Copy using `$TIME_REMAINING`
/// is only rendered when the payload carries an `eligibleDate`.
pub fn derive_almost_met(
    record: &ValidatedRecord,
    copy: &CriteriaCopy,
    today: NaiveDate,
) -> Vec<OpportunityRequirement> {
    let criteria = match record.get_record(INELIGIBLE_CRITERIA) {
        Some(criteria) => criteria,
        None => return Vec::new(),
    };
    criteria
        .iter()
        .filter_map(|(key, payload)| render(copy.ineligible.get(key)?, payload, record, Some(today)))
        .collect()
}

fn render(
    entry: &CriterionCopy,
    payload: &FieldValue,
    record: &ValidatedRecord,
    today: Option<NaiveDate>,
) -> Option<OpportunityRequirement> {
    let payload_fields = payload.as_record();
    let variant = entry
        .variant_field
        .as_deref()
        .and_then(|field| lookup(field, payload_fields, record))
        .map(|value| value.to_string());
    let chosen = entry.resolve(variant.as_deref());
    if chosen.text.is_empty() {
        return None;
    }

    let mut text = interpolate(&chosen.text, payload_fields, record);
    let tooltip = chosen
        .tooltip
        .map(|t| interpolate(&t, payload_fields, record));

    if text.contains(TIME_REMAINING) {
        let eligible_date = payload_fields
            .and_then(|p| p.get("eligibleDate"))
            .and_then(FieldValue::as_date)?;
        let today = today?;
        text = text.replace(TIME_REMAINING, &months_or_days_remaining(eligible_date, today));
    }

    Some(OpportunityRequirement::new(text, tooltip))
}

fn lookup<'a>(field: &str, payload: Option<&'a Fields>, record: &'a ValidatedRecord) -> Option<&'a FieldValue> {
    payload
        .and_then(|p| p.get(field))
        .or_else(|| record.get_path(field))
        .filter(|v| !v.is_null())
}

/// Replace `{name}` and `{name:lower}` placeholders. Unknown names are kept
/// verbatim.
fn interpolate(template: &str, payload: Option<&Fields>, record: &ValidatedRecord) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = match after.find('}') {
            Some(end) => end,
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        };
        let placeholder = &after[..end];
        let (name, filter) = match placeholder.split_once(':') {
            Some((name, filter)) => (name, Some(filter)),
            None => (placeholder, None),
        };
        match lookup(name, payload, record) {
            Some(value) => {
                let rendered = format_value(value);
                match filter {
                    Some("lower") => out.push_str(&rendered.to_lowercase()),
                    _ => out.push_str(&rendered),
                }
            }
            None => {
                out.push('{');
                out.push_str(placeholder);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Display formatting: dates as `March 1, 2024`, lists comma-joined.
pub fn format_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Date(d) => d.format("%B %-d, %Y").to_string(),
        FieldValue::List(items) => items.iter().map(format_value).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

// ============================================================================
// DATES
// ============================================================================

/// Whole calendar months from `from` to `to`, truncated toward zero.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    let mut months = (to.year() - from.year()) * 12 + (to.month() as i32 - from.month() as i32);
    if months > 0 && to.day() < from.day() {
        months -= 1;
    } else if months < 0 && to.day() > from.day() {
        months += 1;
    }
    months
}

/// `"3 more months"` when at least a month remains, else `"12 more days"`.
pub fn months_or_days_remaining(eligible_date: NaiveDate, today: NaiveDate) -> String {
    let months = months_between(today, eligible_date);
    if months >= 1 {
        format!("{} more month{}", months, if months == 1 { "" } else { "s" })
    } else {
        let days = (eligible_date - today).num_days().max(0);
        format!("{} more day{}", days, if days == 1 { "" } else { "s" })
    }
}

/// Explicit date at `date_path` when present, otherwise the latest
/// `eligibleDate` among eligible criteria payloads.
pub fn eligibility_date(record: &ValidatedRecord, date_path: Option<&str>) -> Option<NaiveDate> {
    if let Some(date) = date_path
        .and_then(|path| record.get_path(path))
        .and_then(FieldValue::as_date)
    {
        return Some(date);
    }
    record
        .get_record(ELIGIBLE_CRITERIA)?
        .values()
        .filter_map(|payload| payload.as_record()?.get("eligibleDate")?.as_date())
        .max()
}
