//! Rule and project-field extraction from issues.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::models::{FieldValue, Issue};
use crate::resolve::ConflictPolicy;

/// Value of an iteration field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Iteration {
    pub title: String,
    pub start_date: String,
    pub duration: u32,
}

/// Extracted project field value.
///
/// Serialized untagged: text and single-select values are plain strings,
/// numbers are numbers and iterations are objects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldData {
    Text(String),
    Number(f64),
    Iteration(Iteration),
}

impl FieldData {
    /// Display form used in tables: iteration title, text, or number.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Number(number) => number.to_string(),
            Self::Iteration(iteration) => iteration.title.clone(),
        }
    }
}

/// Field name (lower-cased) to extracted value.
pub type Fields = BTreeMap<String, FieldData>;

/// Extract the field values `issue` carries in project `project_number`.
///
/// Returns an empty map when the issue has no field set for that project.
/// Field names are case-folded; names that fold together are resolved by
/// `policy`. Unsupported value variants and unnamed fields are skipped.
#[must_use]
pub fn extract_fields(issue: &Issue, project_number: u64, policy: ConflictPolicy) -> Fields {
    let mut fields = Fields::new();

    let Some(set) = issue
        .project_items
        .iter()
        .find(|set| set.project_number == project_number)
    else {
        return fields;
    };

    for value in &set.field_values {
        let Some(name) = value.field_name() else {
            continue;
        };
        let data = match value {
            FieldValue::SingleSelect { name, .. } => {
                FieldData::Text(name.clone().unwrap_or_default())
            }
            FieldValue::Iteration {
                title,
                start_date,
                duration,
                ..
            } => FieldData::Iteration(Iteration {
                title: title.clone().unwrap_or_default(),
                start_date: start_date.clone().unwrap_or_default(),
                duration: duration.unwrap_or(0),
            }),
            FieldValue::Text { text, .. } => FieldData::Text(text.clone().unwrap_or_default()),
            FieldValue::Number { number, .. } => FieldData::Number(number.unwrap_or(0.0)),
            FieldValue::Unsupported => continue,
        };

        let key = name.to_lowercase();
        if fields.contains_key(&key) {
            debug!(issue = issue.number, field = %key, ?policy, "Field name collision");
        }
        policy.insert(&mut fields, key, data);
    }

    fields
}

static RULE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:[-*+][ \t]+)?[*_~]*RG[*_~]*[ \t]*:[*_~]*(.*)$")
        .expect("static regex is valid")
});

/// Extract `RG:` rule statements from an issue body, in document order.
///
/// The marker may be wrapped in emphasis (`**RG:**`, `_RG_:`) and preceded
/// by a list bullet. Captures are trimmed; empty ones are dropped and
/// duplicates kept.
#[must_use]
pub fn extract_rules(body: Option<&str>) -> Vec<String> {
    let Some(body) = body else {
        return Vec::new();
    };

    RULE_MARKER
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|rule| !rule.is_empty())
        .collect()
}
