//! Label-based issue classification.
//!
//! Labels are compared after normalization, so `Type: Epic`, `type:epic`
//! and ` TYPE :  EPIC ` all match the same alias.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::models::Issue;

static COLON_SPACING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*:\s*").expect("static regex is valid"));

/// Normalize a label or alias for comparison.
///
/// Lower-cases, removes whitespace around colons and trims. Whitespace
/// elsewhere is kept as is, so `user  story` and `user story` differ.
#[must_use]
pub fn normalize_label(label: &str) -> String {
    let lowered = label.trim().to_lowercase();
    COLON_SPACING.replace_all(&lowered, ":").into_owned()
}

/// A set of normalized label aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
    labels: BTreeSet<String>,
}

impl LabelSet {
    /// Parse a comma-separated alias list. Empty entries are dropped.
    #[must_use]
    pub fn parse(aliases: &str) -> Self {
        aliases.split(',').collect()
    }

    /// Whether the normalized form of `label` is in the set.
    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(&normalize_label(label))
    }

    /// True iff any of `labels` normalizes to a member of the set.
    pub fn matches<I, S>(&self, labels: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        labels.into_iter().any(|label| self.contains(label.as_ref()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Normalized aliases in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for LabelSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let labels = iter
            .into_iter()
            .map(|alias| normalize_label(alias.as_ref()))
            .filter(|alias| !alias.is_empty())
            .collect();
        Self { labels }
    }
}

/// Role an issue plays on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Epic,
    UserStory,
    Improvement,
}

/// Classifies issues against the configured alias sets.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    epic: LabelSet,
    user_story: LabelSet,
    improvement: LabelSet,
}

impl Classifier {
    #[must_use]
    pub fn new(epic: LabelSet, user_story: LabelSet, improvement: LabelSet) -> Self {
        Self {
            epic,
            user_story,
            improvement,
        }
    }

    /// Role of `issue`, or `None` if it matches no alias set.
    ///
    /// Epic wins over User Story, which wins over Improvement: an issue is
    /// never counted in two roles during the same run.
    #[must_use]
    pub fn classify(&self, issue: &Issue) -> Option<Role> {
        if self.epic.matches(&issue.labels) {
            Some(Role::Epic)
        } else if self.user_story.matches(&issue.labels) {
            Some(Role::UserStory)
        } else if self.improvement.matches(&issue.labels) {
            Some(Role::Improvement)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue_with_labels(labels: &[&str]) -> Issue {
        Issue {
            number: 1,
            labels: labels.iter().map(|l| (*l).to_string()).collect(),
            ..Issue::default()
        }
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  Epic "), "epic");
        assert_eq!(normalize_label("Type : Epic"), "type:epic");
        assert_eq!(normalize_label("type:  epic"), "type:epic");
        assert_eq!(normalize_label("User   Story"), "user   story");
        assert_ne!(normalize_label("user  story"), normalize_label("user story"));
        assert_eq!(normalize_label(""), "");
    }

    #[test]
    fn test_parse_aliases() {
        let set = LabelSet::parse("Epic, type: epic,, ,ÉPICO");
        let aliases: Vec<_> = set.iter().collect();
        assert_eq!(aliases, vec!["epic", "type:epic", "épico"]);
    }

    #[test]
    fn test_matches_is_set_intersection() {
        let set = LabelSet::parse("user story, us");
        assert!(set.matches(["bug", "User Story"]));
        assert!(set.matches(["US"]));
        assert!(!set.matches(["user-story"]));
        assert!(!set.matches(Vec::<String>::new()));
        assert!(!LabelSet::default().matches(["anything"]));
    }

    #[test]
    fn test_classify_roles() {
        let classifier = Classifier::new(
            LabelSet::parse("epic"),
            LabelSet::parse("user story"),
            LabelSet::parse("improvement"),
        );

        assert_eq!(
            classifier.classify(&issue_with_labels(&["Epic"])),
            Some(Role::Epic)
        );
        assert_eq!(
            classifier.classify(&issue_with_labels(&["user story"])),
            Some(Role::UserStory)
        );
        assert_eq!(
            classifier.classify(&issue_with_labels(&["Improvement"])),
            Some(Role::Improvement)
        );
        assert_eq!(classifier.classify(&issue_with_labels(&["bug"])), None);
    }

    #[test]
    fn test_epic_has_priority() {
        let classifier = Classifier::new(
            LabelSet::parse("epic"),
            LabelSet::parse("user story"),
            LabelSet::default(),
        );
        let both = issue_with_labels(&["User Story", "EPIC"]);
        assert_eq!(classifier.classify(&both), Some(Role::Epic));
    }
}
