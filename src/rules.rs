// 🏷️ Criteria Copy - Rules as Data
// Display copy for eligibility criteria, plus denial-reason menus.
// Built-in tables live with each opportunity; JSON files can replace them.

use anyhow::{Context as AnyhowContext, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Key every denial-reason menu ends with.
pub const OTHER_KEY: &str = "Other";

// ============================================================================
// REQUIREMENT
// ============================================================================

/// One line of user-facing requirement text. Recomputed on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityRequirement {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_heading: bool,
    /// Only needed when two requirements can share the same text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl OpportunityRequirement {
    pub fn new(text: impl Into<String>, tooltip: Option<String>) -> Self {
        OpportunityRequirement {
            text: text.into(),
            tooltip,
            is_heading: false,
            key: None,
        }
    }

    pub fn heading(text: impl Into<String>, key: impl Into<String>) -> Self {
        OpportunityRequirement {
            text: text.into(),
            tooltip: None,
            is_heading: true,
            key: Some(key.into()),
        }
    }
}

// ============================================================================
// CRITERION COPY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyText {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

/// Copy for one criterion key.
///
/// `text` may contain `{field}` placeholders (read from the criterion payload,
/// falling back to a dotted path on the record), `{field:lower}`, and
/// `$TIME_REMAINING`. When `variant_field` is set, the value found there picks
/// an entry from `variants`; an empty resulting text means "no line".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionCopy {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_field: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variants: IndexMap<String, CopyText>,
}

impl CriterionCopy {
    pub fn new(text: impl Into<String>) -> Self {
        CriterionCopy {
            text: text.into(),
            tooltip: None,
            variant_field: None,
            variants: IndexMap::new(),
        }
    }

    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }

    /// Builder: choose copy by the value at `field`.
    pub fn varying_by(mut self, field: impl Into<String>) -> Self {
        self.variant_field = Some(field.into());
        self
    }

    pub fn with_variant(
        mut self,
        value: impl Into<String>,
        text: impl Into<String>,
        tooltip: Option<&str>,
    ) -> Self {
        self.variants.insert(
            value.into(),
            CopyText {
                text: text.into(),
                tooltip: tooltip.map(str::to_string),
            },
        );
        self
    }

    /// Copy for a given variant value, falling back to the base copy.
    pub fn resolve(&self, variant: Option<&str>) -> CopyText {
        let chosen = variant.and_then(|v| self.variants.get(v));
        match chosen {
            Some(copy) => CopyText {
                text: copy.text.clone(),
                tooltip: copy.tooltip.clone().or_else(|| self.tooltip.clone()),
            },
            None => CopyText {
                text: self.text.clone(),
                tooltip: self.tooltip.clone(),
            },
        }
    }
}

/// Sub-opportunity: a heading followed by the criteria belonging to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaGroup {
    pub key: String,
    pub heading: String,
    pub criteria: Vec<String>,
}

// ============================================================================
// CRITERIA COPY TABLE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaCopy {
    #[serde(default)]
    pub eligible: IndexMap<String, CriterionCopy>,
    #[serde(default)]
    pub ineligible: IndexMap<String, CriterionCopy>,
    #[serde(default)]
    pub groups: Vec<CriteriaGroup>,
    #[serde(default)]
    pub denial_reasons: IndexMap<String, String>,
}

impl CriteriaCopy {
    pub fn new() -> Self {
        CriteriaCopy::default()
    }

    /// Load a copy table from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read copy file: {:?}", path.as_ref()))?;
        CriteriaCopy::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let copy: CriteriaCopy =
            serde_json::from_str(content).context("Failed to parse criteria copy JSON")?;
        Ok(copy)
    }

    pub fn eligible(mut self, key: impl Into<String>, copy: CriterionCopy) -> Self {
        self.eligible.insert(key.into(), copy);
        self
    }

    pub fn ineligible(mut self, key: impl Into<String>, copy: CriterionCopy) -> Self {
        self.ineligible.insert(key.into(), copy);
        self
    }

    pub fn group(mut self, key: &str, heading: &str, criteria: &[&str]) -> Self {
        self.groups.push(CriteriaGroup {
            key: key.to_string(),
            heading: heading.to_string(),
            criteria: criteria.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn denial_reason(mut self, code: impl Into<String>, text: impl Into<String>) -> Self {
        self.denial_reasons.insert(code.into(), text.into());
        self
    }

    /// Builder: append the free-text `Other` reason.
    pub fn with_other_reason(self) -> Self {
        self.denial_reason(OTHER_KEY, "Other, please specify a reason")
    }

    /// Group the criterion belongs to, if any.
    pub fn group_of(&self, criterion: &str) -> Option<&CriteriaGroup> {
        self.groups
            .iter()
            .find(|g| g.criteria.iter().any(|c| c == criterion))
    }

    /// Overlay another table: same keys are replaced, new keys appended.
    pub fn overlay(mut self, other: CriteriaCopy) -> Self {
        self.eligible.extend(other.eligible);
        self.ineligible.extend(other.ineligible);
        if !other.groups.is_empty() {
            self.groups = other.groups;
        }
        self.denial_reasons.extend(other.denial_reasons);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_variant_resolution() {
        let copy = CriterionCopy::new("")
            .with_tooltip("base tooltip")
            .varying_by("metadata.supervisionType")
            .with_variant("Parole", "Completed at least half of parole term", None)
            .with_variant("Probation", "Completed at least half of probation term", Some("probation"));

        let parole = copy.resolve(Some("Parole"));
        assert_eq!(parole.text, "Completed at least half of parole term");
        assert_eq!(parole.tooltip.as_deref(), Some("base tooltip"));

        let probation = copy.resolve(Some("Probation"));
        assert_eq!(probation.tooltip.as_deref(), Some("probation"));

        assert_eq!(copy.resolve(Some("Interstate")).text, "");
        assert_eq!(copy.resolve(None).text, "");
    }

    #[test]
    fn test_denial_reasons_keep_order_and_other() {
        let copy = CriteriaCopy::new()
            .denial_reason("SCNC", "Not compliant with special conditions")
            .denial_reason("NCIC", "Did not pass NCIC check")
            .with_other_reason();
        let keys: Vec<&String> = copy.denial_reasons.keys().collect();
        assert_eq!(keys, vec!["SCNC", "NCIC", OTHER_KEY]);
    }

    #[test]
    fn test_load_from_file_and_overlay() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "eligible": {{
                    "noFelonyWithin24Months": {{"text": "No felonies (custom)"}}
                }},
                "denialReasons": {{"X": "Custom reason"}}
            }}"#
        )
        .unwrap();

        let custom = CriteriaCopy::from_file(file.path()).unwrap();
        let base = CriteriaCopy::new()
            .eligible("noFelonyWithin24Months", CriterionCopy::new("No felony convictions in past 24 months"))
            .eligible("usIdNoActiveNco", CriterionCopy::new("No active NCO"));

        let merged = base.overlay(custom);
        assert_eq!(merged.eligible["noFelonyWithin24Months"].text, "No felonies (custom)");
        assert_eq!(merged.eligible.len(), 2);
        assert_eq!(merged.denial_reasons["X"], "Custom reason");
    }

    #[test]
    fn test_requirement_serialization_skips_defaults() {
        let req = OpportunityRequirement::new("No pending detainers", None);
        assert_eq!(serde_json::to_string(&req).unwrap(), r#"{"text":"No pending detainers"}"#);

        let heading = OpportunityRequirement::heading("Transition Program Release", "TPR");
        let json = serde_json::to_value(&heading).unwrap();
        assert_eq!(json["isHeading"], true);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(CriteriaCopy::from_json_str("{not json").is_err());
    }
}
