//! Parent/child resolution and board grouping.
//!
//! A child finds its parent through two signals: the explicit `parent`
//! reference on the child, and a reverse index built from every parent's
//! declared sub-issue list. The explicit reference always wins.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::{Classifier, Role};
use crate::error::SyncError;
use crate::extract::{extract_fields, extract_rules, Fields};
use crate::models::{Issue, IssueState, ProjectItem};

/// How to resolve two values landing on the same key.
///
/// Applies to a child listed under several parents and to field names
/// that case-fold together. Either way the outcome depends only on the
/// order items were fetched in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Later value replaces the earlier one
    #[default]
    LastWriteWins,
    /// Earlier value is kept
    FirstWriteWins,
}

impl ConflictPolicy {
    /// Insert `value` under `key` following the policy.
    ///
    /// Returns `true` if the map now holds `value`.
    pub fn insert<K: Ord, V>(self, map: &mut BTreeMap<K, V>, key: K, value: V) -> bool {
        match self {
            Self::LastWriteWins => {
                map.insert(key, value);
                true
            }
            Self::FirstWriteWins => {
                if map.contains_key(&key) {
                    false
                } else {
                    map.insert(key, value);
                    true
                }
            }
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "last" | "last-write-wins" => Ok(Self::LastWriteWins),
            "first" | "first-write-wins" => Ok(Self::FirstWriteWins),
            other => Err(SyncError::Config(format!(
                "CONFLICT_POLICY must be 'last-write-wins' or 'first-write-wins', got '{other}'"
            ))),
        }
    }
}

/// Child url to parent number, built from declared sub-issue lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReverseIndex {
    by_url: BTreeMap<String, u64>,
}

impl ReverseIndex {
    /// Index the sub-issues of every parent, in the order given.
    pub fn build<'a, I>(parents: I, policy: ConflictPolicy) -> Self
    where
        I: IntoIterator<Item = &'a Issue>,
    {
        let mut by_url = BTreeMap::new();
        for parent in parents {
            for child in &parent.sub_issues {
                if child.url.is_empty() {
                    continue;
                }
                if let Some(&previous) = by_url.get(&child.url) {
                    if previous != parent.number {
                        warn!(
                            child = %child.url,
                            previous,
                            current = parent.number,
                            ?policy,
                            "Issue is declared as sub-issue of more than one parent"
                        );
                    }
                }
                policy.insert(&mut by_url, child.url.clone(), parent.number);
            }
        }
        Self { by_url }
    }

    /// Parent number recorded for a child url.
    #[must_use]
    pub fn get(&self, url: &str) -> Option<u64> {
        self.by_url.get(url).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }
}

/// Parent of `issue`: explicit reference first, then the reverse index.
#[must_use]
pub fn resolve_parent(issue: &Issue, index: &ReverseIndex) -> Option<u64> {
    issue
        .parent
        .as_ref()
        .map(|parent| parent.number)
        .or_else(|| index.get(&issue.url))
}

/// Epic of `issue`, or `None` if it is an orphan.
///
/// A parent that is not among `epics` (not classified as Epic in this
/// run) is a dangling reference and also yields `None`.
#[must_use]
pub fn resolve_parent_epic(
    issue: &Issue,
    index: &ReverseIndex,
    epics: &BTreeSet<u64>,
) -> Option<u64> {
    let parent = resolve_parent(issue, index)?;
    if epics.contains(&parent) {
        Some(parent)
    } else {
        debug!(issue = issue.number, parent, "Parent is not a known epic");
        None
    }
}

/// Short reference to an issue used in rendered tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueLink {
    pub number: u64,
    pub title: String,
    pub url: String,
}

impl From<&Issue> for IssueLink {
    fn from(issue: &Issue) -> Self {
        Self {
            number: issue.number,
            title: issue.title.clone(),
            url: issue.url.clone(),
        }
    }
}

static IMPROVEMENT_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bv\s*(\d+)\b[^#]*#\s*(\d+)").expect("static regex is valid")
});

/// Version and base story named by an improvement title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImprovementRef {
    pub version: u32,
    pub base: u64,
}

/// Parse titles such as `Login v2 - evolution of #11`.
#[must_use]
pub fn improvement_reference(title: &str) -> Option<ImprovementRef> {
    let caps = IMPROVEMENT_TITLE.captures(title)?;
    Some(ImprovementRef {
        version: caps[1].parse().ok()?,
        base: caps[2].parse().ok()?,
    })
}

/// Improvement issues grouped by the user story they update.
pub type UpdateIndex = BTreeMap<u64, Vec<IssueLink>>;

/// Attach improvement issues to their user stories.
///
/// A story reference in the title (`v2 ... #11`) wins; otherwise
/// improvements resolve like stories do: explicit parent, then the
/// stories' sub-issue lists. Improvements pointing anywhere else are
/// skipped.
#[must_use]
pub fn build_update_index(
    improvements: &[&Issue],
    stories: &[&Issue],
    policy: ConflictPolicy,
) -> UpdateIndex {
    let index = ReverseIndex::build(stories.iter().copied(), policy);
    let known: BTreeSet<u64> = stories.iter().map(|story| story.number).collect();

    let mut updates = UpdateIndex::new();
    for improvement in improvements {
        let target = improvement_reference(&improvement.title)
            .map(|reference| reference.base)
            .or_else(|| resolve_parent(improvement, &index));
        match target {
            Some(story) if known.contains(&story) => {
                updates
                    .entry(story)
                    .or_default()
                    .push(IssueLink::from(*improvement));
            }
            other => {
                debug!(
                    issue = improvement.number,
                    parent = ?other,
                    "Improvement has no known user story"
                );
            }
        }
    }
    updates
}

/// An issue classified as User Story.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStoryRecord {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub url: String,
    pub state: IssueState,
    pub labels: Vec<String>,
    pub fields: Fields,
    pub rules: Vec<String>,
    /// Owning epic; `None` for orphans
    pub epic_number: Option<u64>,
    /// Improvements referencing this story
    pub updates: Vec<IssueLink>,
}

/// An issue classified as Epic, with its user stories.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpicRecord {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub url: String,
    pub state: IssueState,
    pub labels: Vec<String>,
    pub fields: Fields,
    pub rules: Vec<String>,
    pub user_stories: Vec<UserStoryRecord>,
    pub sub_issues_count: usize,
}

/// Counts of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_epics: usize,
    pub total_user_stories: usize,
    pub linked_user_stories: usize,
    pub orphan_user_stories: usize,
}

/// Epics with their stories, plus stories no epic claims.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Board {
    pub epics: Vec<EpicRecord>,
    pub orphans: Vec<UserStoryRecord>,
    pub stats: Stats,
}

impl Board {
    /// Classify, extract and group the fetched items.
    ///
    /// Epics and stories keep board order. Each story ends up either in
    /// exactly one epic's list or in `orphans`. An issue whose title
    /// references a story (`v2 ... #11`) is an improvement, never a story.
    #[must_use]
    pub fn build(
        items: &[ProjectItem],
        classifier: &Classifier,
        project_number: u64,
        policy: ConflictPolicy,
    ) -> Self {
        let mut epics = Vec::new();
        let mut stories = Vec::new();
        let mut improvements = Vec::new();

        for issue in items.iter().filter_map(ProjectItem::issue) {
            let titled_update = improvement_reference(&issue.title).is_some();
            match classifier.classify(issue) {
                Some(Role::Epic) => epics.push(issue),
                Some(Role::UserStory) if !titled_update => stories.push(issue),
                Some(Role::UserStory | Role::Improvement) => improvements.push(issue),
                None if titled_update => improvements.push(issue),
                None => {}
            }
        }

        let epic_index = ReverseIndex::build(epics.iter().copied(), policy);
        let epic_numbers: BTreeSet<u64> = epics.iter().map(|epic| epic.number).collect();
        let mut updates = build_update_index(&improvements, &stories, policy);

        let mut epic_records: Vec<EpicRecord> = epics
            .iter()
            .map(|epic| EpicRecord {
                number: epic.number,
                title: epic.title.clone(),
                body: epic.body.clone().unwrap_or_default(),
                url: epic.url.clone(),
                state: epic.state,
                labels: epic.labels.clone(),
                fields: extract_fields(epic, project_number, policy),
                rules: extract_rules(epic.body.as_deref()),
                user_stories: Vec::new(),
                sub_issues_count: 0,
            })
            .collect();
        let positions: BTreeMap<u64, usize> = epic_records
            .iter()
            .enumerate()
            .map(|(position, epic)| (epic.number, position))
            .collect();

        let mut orphans = Vec::new();
        let mut linked = 0;
        for story in &stories {
            let epic_number = resolve_parent_epic(story, &epic_index, &epic_numbers);
            let record = UserStoryRecord {
                number: story.number,
                title: story.title.clone(),
                body: story.body.clone().unwrap_or_default(),
                url: story.url.clone(),
                state: story.state,
                labels: story.labels.clone(),
                fields: extract_fields(story, project_number, policy),
                rules: extract_rules(story.body.as_deref()),
                epic_number,
                updates: updates.remove(&story.number).unwrap_or_default(),
            };

            match epic_number.and_then(|number| positions.get(&number)) {
                Some(&position) => {
                    epic_records[position].user_stories.push(record);
                    linked += 1;
                }
                None => orphans.push(record),
            }
        }
        for epic in &mut epic_records {
            epic.sub_issues_count = epic.user_stories.len();
        }

        let stats = Stats {
            total_epics: epic_records.len(),
            total_user_stories: stories.len(),
            linked_user_stories: linked,
            orphan_user_stories: orphans.len(),
        };
        info!(
            epics = stats.total_epics,
            user_stories = stats.total_user_stories,
            linked = stats.linked_user_stories,
            orphans = stats.orphan_user_stories,
            improvements = improvements.len(),
            "Board grouped"
        );

        Self {
            epics: epic_records,
            orphans,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::LabelSet;
    use crate::models::{IssueRef, ItemContent};

    fn url(number: u64) -> String {
        format!("https://github.com/acme/app/issues/{number}")
    }

    fn issue(number: u64, label: &str) -> Issue {
        Issue {
            number,
            title: format!("Issue {number}"),
            url: url(number),
            labels: vec![label.to_string()],
            ..Issue::default()
        }
    }

    fn with_parent(mut issue: Issue, parent: u64) -> Issue {
        issue.parent = Some(IssueRef {
            number: parent,
            title: String::new(),
            url: url(parent),
        });
        issue
    }

    fn with_subs(mut issue: Issue, subs: &[u64]) -> Issue {
        issue.sub_issues = subs
            .iter()
            .map(|&n| IssueRef {
                number: n,
                title: String::new(),
                url: url(n),
            })
            .collect();
        issue
    }

    fn items(issues: Vec<Issue>) -> Vec<ProjectItem> {
        issues
            .into_iter()
            .map(|issue| ProjectItem {
                content: Some(ItemContent::Issue(issue)),
            })
            .collect()
    }

    fn classifier() -> Classifier {
        Classifier::new(
            LabelSet::parse("epic"),
            LabelSet::parse("user story"),
            LabelSet::parse("improvement"),
        )
    }

    #[test]
    fn test_conflict_policy_insert() {
        let mut map = BTreeMap::new();
        assert!(ConflictPolicy::LastWriteWins.insert(&mut map, "k", 1));
        assert!(ConflictPolicy::LastWriteWins.insert(&mut map, "k", 2));
        assert_eq!(map["k"], 2);
        assert!(!ConflictPolicy::FirstWriteWins.insert(&mut map, "k", 3));
        assert_eq!(map["k"], 2);
    }

    #[test]
    fn test_conflict_policy_parse() {
        assert_eq!(
            "last-write-wins".parse::<ConflictPolicy>().unwrap(),
            ConflictPolicy::LastWriteWins
        );
        assert_eq!(
            "FIRST_WRITE_WINS".parse::<ConflictPolicy>().unwrap(),
            ConflictPolicy::FirstWriteWins
        );
        assert!("random".parse::<ConflictPolicy>().is_err());
    }

    #[test]
    fn test_reverse_index_duplicate_child() {
        let first = with_subs(issue(1, "epic"), &[10]);
        let second = with_subs(issue(2, "epic"), &[10]);

        let last = ReverseIndex::build([&first, &second], ConflictPolicy::LastWriteWins);
        assert_eq!(last.get(&url(10)), Some(2));

        let first_wins = ReverseIndex::build([&first, &second], ConflictPolicy::FirstWriteWins);
        assert_eq!(first_wins.get(&url(10)), Some(1));
        assert_eq!(first_wins.len(), 1);
    }

    #[test]
    fn test_explicit_parent_wins() {
        let epic = with_subs(issue(9, "epic"), &[20]);
        let index = ReverseIndex::build([&epic], ConflictPolicy::default());
        let story = with_parent(issue(20, "user story"), 5);

        assert_eq!(resolve_parent(&story, &index), Some(5));
        let epics = BTreeSet::from([5, 9]);
        assert_eq!(resolve_parent_epic(&story, &index, &epics), Some(5));
    }

    #[test]
    fn test_reverse_index_fallback() {
        let epic = with_subs(issue(9, "epic"), &[20]);
        let index = ReverseIndex::build([&epic], ConflictPolicy::default());
        let story = issue(20, "user story");
        assert_eq!(
            resolve_parent_epic(&story, &index, &BTreeSet::from([9])),
            Some(9)
        );
        assert_eq!(resolve_parent(&issue(21, "user story"), &index), None);
    }

    #[test]
    fn test_dangling_parent_is_orphan() {
        let story = with_parent(issue(20, "user story"), 77);
        let index = ReverseIndex::default();
        assert_eq!(resolve_parent(&story, &index), Some(77));
        assert_eq!(resolve_parent_epic(&story, &index, &BTreeSet::from([9])), None);
    }

    #[test]
    fn test_board_groups_and_counts() {
        let board = Board::build(
            &items(vec![
                with_subs(issue(1, "Epic"), &[11]),
                issue(2, "epic"),
                issue(11, "User Story"),
                with_parent(issue(12, "user story"), 2),
                with_parent(issue(13, "user story"), 99),
                issue(14, "user story"),
                with_parent(issue(30, "improvement"), 11),
                issue(40, "bug"),
            ]),
            &classifier(),
            1,
            ConflictPolicy::default(),
        );

        assert_eq!(board.stats.total_epics, 2);
        assert_eq!(board.stats.total_user_stories, 4);
        assert_eq!(board.stats.linked_user_stories, 2);
        assert_eq!(board.stats.orphan_user_stories, 2);
        assert_eq!(
            board.stats.linked_user_stories + board.stats.orphan_user_stories,
            board.stats.total_user_stories
        );

        assert_eq!(board.epics[0].user_stories[0].number, 11);
        assert_eq!(board.epics[0].user_stories[0].epic_number, Some(1));
        assert_eq!(board.epics[0].user_stories[0].updates[0].number, 30);
        assert_eq!(board.epics[1].user_stories[0].number, 12);

        let orphan_numbers: Vec<u64> = board.orphans.iter().map(|s| s.number).collect();
        assert_eq!(orphan_numbers, vec![13, 14]);
        assert!(board.orphans.iter().all(|s| s.epic_number.is_none()));
    }

    #[test]
    fn test_linked_and_orphans_are_disjoint() {
        let board = Board::build(
            &items(vec![
                with_subs(issue(1, "epic"), &[11, 12]),
                issue(11, "user story"),
                with_parent(issue(12, "user story"), 50),
                issue(13, "user story"),
            ]),
            &classifier(),
            1,
            ConflictPolicy::default(),
        );

        let linked: BTreeSet<u64> = board
            .epics
            .iter()
            .flat_map(|e| e.user_stories.iter().map(|s| s.number))
            .collect();
        let orphans: BTreeSet<u64> = board.orphans.iter().map(|s| s.number).collect();
        assert!(linked.is_disjoint(&orphans));
        assert_eq!(linked, BTreeSet::from([11]));
        assert_eq!(orphans, BTreeSet::from([12, 13]));
    }

    #[test]
    fn test_epic_and_story_labels_counts_once() {
        let mut both = issue(1, "epic");
        both.labels.push("user story".to_string());
        let board = Board::build(
            &items(vec![both]),
            &classifier(),
            1,
            ConflictPolicy::default(),
        );
        assert_eq!(board.stats.total_epics, 1);
        assert_eq!(board.stats.total_user_stories, 0);
    }

    #[test]
    fn test_improvement_via_story_sub_issues() {
        let story = with_subs(issue(11, "user story"), &[30]);
        let improvement = issue(30, "improvement");
        let stray = with_parent(issue(31, "improvement"), 999);

        let updates = build_update_index(
            &[&improvement, &stray],
            &[&story],
            ConflictPolicy::default(),
        );
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[&11][0].number, 30);
    }

    #[test]
    fn test_improvement_reference_from_title() {
        assert_eq!(
            improvement_reference("Login v2 - evolution of #11"),
            Some(ImprovementRef { version: 2, base: 11 })
        );
        assert_eq!(improvement_reference("V 3: #  7").map(|r| r.base), Some(7));
        assert_eq!(improvement_reference("Login page #11"), None);
        assert_eq!(improvement_reference("Dev2 #11"), None);
        assert_eq!(improvement_reference("Login v2"), None);
    }

    #[test]
    fn test_titled_improvements_attach_to_base_story() {
        let mut labelled = issue(30, "user story");
        labelled.title = "Login v2 - evolution of #11".to_string();
        let mut unlabelled = issue(31, "bug");
        unlabelled.title = "Login v3 #11".to_string();
        let mut unknown_base = issue(32, "user story");
        unknown_base.title = "Export v2 #999".to_string();

        let board = Board::build(
            &items(vec![
                with_subs(issue(1, "epic"), &[11]),
                issue(11, "user story"),
                labelled,
                unlabelled,
                unknown_base,
            ]),
            &classifier(),
            1,
            ConflictPolicy::default(),
        );

        assert_eq!(board.stats.total_user_stories, 1);
        assert!(board.orphans.is_empty());
        let story = &board.epics[0].user_stories[0];
        assert_eq!(story.number, 11);
        let updates: Vec<u64> = story.updates.iter().map(|u| u.number).collect();
        assert_eq!(updates, vec![30, 31]);
        assert_eq!(story.updates[0].title, "Login v2 - evolution of #11");
        assert_eq!(board.epics[0].sub_issues_count, 1);
    }

    #[test]
    fn test_title_reference_wins_over_parent_link() {
        let story_a = issue(11, "user story");
        let story_b = issue(12, "user story");
        let mut improvement = with_parent(issue(30, "improvement"), 12);
        improvement.title = "Login v2 #11".to_string();

        let updates = build_update_index(
            &[&improvement],
            &[&story_a, &story_b],
            ConflictPolicy::default(),
        );
        assert_eq!(updates.keys().copied().collect::<Vec<_>>(), vec![11]);
    }

    #[test]
    fn test_records_carry_body() {
        let mut epic = issue(1, "epic");
        epic.body = Some("Epic body".to_string());
        let board = Board::build(&items(vec![epic]), &classifier(), 1, ConflictPolicy::default());
        assert_eq!(board.epics[0].body, "Epic body");
        assert_eq!(board.epics[0].sub_issues_count, 0);
    }
}
