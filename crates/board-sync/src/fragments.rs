//! Per-epic Markdown fragments.
//!
//! Each epic renders to one fragment holding a table of its user stories;
//! orphan stories share a single "no epic" fragment. Fragments are written
//! as individual files, and the epic ones become regions of the wiki page.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::classify::normalize_label;
use crate::error::{Result, SyncError};
use crate::markers::{Region, RegionKey};
use crate::models::IssueState;
use crate::resolve::{EpicRecord, UserStoryRecord};

/// File name of the fragment for stories without an epic.
pub const NO_EPIC_FILE: &str = "epic-none.md";

pub const DONE: &str = "✅";
pub const IN_PROGRESS: &str = "⏳";
pub const TODO: &str = "📝";
pub const WONT_DO: &str = "❌";

/// Legend line written under each fragment heading.
pub const LEGEND: &str =
    "*Legend:* ✅ Done · ⏳ In progress/Review/Recette · 📝 To do · ❌ Won't do";

const EMPTY_CELL: &str = "-";

static DONE_STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bdone\b").expect("static regex is valid"));

static WONT_DO_STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bwont do\b").expect("static regex is valid"));

static IN_PROGRESS_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(in progress|in review|recette)\b").expect("static regex is valid")
});

/// A rendered fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Epic the fragment belongs to; `None` for the no-epic group
    pub epic_number: Option<u64>,
    pub content: String,
}

impl Fragment {
    #[must_use]
    pub fn file_name(&self) -> String {
        fragment_file_name(self.epic_number)
    }

    /// The fragment as a mergeable region. The no-epic group has none.
    #[must_use]
    pub fn region(&self) -> Option<Region> {
        self.epic_number
            .map(|number| Region::new(RegionKey::Id(number), &self.content))
    }
}

/// `epic-<number>.md`, or [`NO_EPIC_FILE`].
#[must_use]
pub fn fragment_file_name(epic_number: Option<u64>) -> String {
    match epic_number {
        Some(number) => format!("epic-{number}.md"),
        None => NO_EPIC_FILE.to_string(),
    }
}

/// Region key of an `epic-<number>.md` file name, case-insensitive.
///
/// The no-epic file and anything else yield `None`.
#[must_use]
pub fn parse_fragment_file_name(name: &str) -> Option<RegionKey> {
    let name = name.to_ascii_lowercase();
    let number = name.strip_prefix("epic-")?.strip_suffix(".md")?;
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    number.parse().ok().map(RegionKey::Id)
}

/// Profile values carried by labels such as `profile: Admin`.
///
/// The label literal is compared normalized; values keep their casing.
#[must_use]
pub fn profiles(labels: &[String], profile_label: &str) -> Vec<String> {
    let wanted = format!("{}:", normalize_label(profile_label));
    labels
        .iter()
        .filter(|label| normalize_label(label).starts_with(&wanted))
        .filter_map(|label| label.split_once(':'))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

/// Lower-cased text without accents.
fn fold(text: &str) -> String {
    text.to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Indicator for a status option name.
///
/// Accents and apostrophes are dropped and other punctuation reads as a
/// space, so `Won't do`, `wont-do` and `WONT DO` all match.
#[must_use]
pub fn status_dot(status: &str) -> &'static str {
    let folded: String = fold(status)
        .chars()
        .filter(|c| !matches!(*c, '\'' | '’'))
        .map(|c| if "_-.,:;()".contains(c) { ' ' } else { c })
        .collect();
    let folded = folded.split_whitespace().collect::<Vec<_>>().join(" ");

    if DONE_STATUS.is_match(&folded) {
        DONE
    } else if WONT_DO_STATUS.is_match(&folded) {
        WONT_DO
    } else if IN_PROGRESS_STATUS.is_match(&folded) {
        IN_PROGRESS
    } else {
        TODO
    }
}

/// Status indicator of a story, from its `status` field.
///
/// A closed story without a status counts as done.
#[must_use]
pub fn status_indicator(story: &UserStoryRecord) -> &'static str {
    match story.fields.get("status") {
        Some(status) => status_dot(&status.display()),
        None if story.state == IssueState::Closed => DONE,
        None => TODO,
    }
}

fn take_digits<I: Iterator<Item = char>>(chars: &mut std::iter::Peekable<I>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        digits.push(c);
    }
    digits
}

fn compare_digits(left: &str, right: &str) -> Ordering {
    let left = left.trim_start_matches('0');
    let right = right.trim_start_matches('0');
    left.len().cmp(&right.len()).then_with(|| left.cmp(right))
}

/// Case- and accent-insensitive comparison where digit runs compare by
/// value, so `US 2` sorts before `US 10`.
#[must_use]
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (a, b) = (fold(a), fold(b));
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let ordering = compare_digits(&take_digits(&mut left), &take_digits(&mut right));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                if l != r {
                    return l.cmp(&r);
                }
                left.next();
                right.next();
            }
        }
    }
}

fn cell(text: &str) -> String {
    let escaped = text.replace('|', "\\|").replace(['\r', '\n'], " ");
    if escaped.trim().is_empty() {
        EMPTY_CELL.to_string()
    } else {
        escaped
    }
}

fn story_row(story: &UserStoryRecord, profile_label: &str) -> String {
    let profile = profiles(&story.labels, profile_label).join(", ");
    let link = format!("[#{} {}]({})", story.number, story.title, story.url);
    let sprint = story
        .fields
        .get("sprint")
        .map(|value| value.display())
        .unwrap_or_default();
    let updates = story
        .updates
        .iter()
        .map(|update| format!("[{}]({})", update.title, update.url))
        .collect::<Vec<_>>()
        .join(" ; ");

    format!(
        "| {} | {} | {} | {} | {} |",
        cell(&profile),
        cell(&link),
        cell(&sprint),
        status_indicator(story),
        cell(&updates)
    )
}

/// Markdown table of `stories` sorted by title, or a placeholder line
/// when empty.
#[must_use]
pub fn render_story_table(stories: &[UserStoryRecord], profile_label: &str) -> String {
    if stories.is_empty() {
        return "_No user stories._".to_string();
    }

    let mut rows: Vec<&UserStoryRecord> = stories.iter().collect();
    rows.sort_by(|a, b| natural_cmp(&a.title, &b.title).then(a.number.cmp(&b.number)));

    let mut lines = vec![
        "| Profile | User Story | Sprint | Status | Updates |".to_string(),
        "|---|---|:--:|:--:|---|".to_string(),
    ];
    lines.extend(rows.into_iter().map(|story| story_row(story, profile_label)));
    lines.join("\n")
}

#[must_use]
pub fn render_epic_fragment(epic: &EpicRecord, profile_label: &str) -> Fragment {
    let content = format!(
        "### [#{} {}]({})\n\n{LEGEND}\n\n{}\n",
        epic.number,
        epic.title,
        epic.url,
        render_story_table(&epic.user_stories, profile_label)
    );
    Fragment {
        epic_number: Some(epic.number),
        content,
    }
}

#[must_use]
pub fn render_orphan_fragment(orphans: &[UserStoryRecord], profile_label: &str) -> Fragment {
    let content = format!(
        "### User stories without epic\n\n{LEGEND}\n\n{}\n",
        render_story_table(orphans, profile_label)
    );
    Fragment {
        epic_number: None,
        content,
    }
}

/// One fragment per epic, plus the no-epic fragment when there are orphans.
#[must_use]
pub fn render_fragments(
    epics: &[EpicRecord],
    orphans: &[UserStoryRecord],
    profile_label: &str,
) -> Vec<Fragment> {
    let mut fragments: Vec<Fragment> = epics
        .iter()
        .map(|epic| render_epic_fragment(epic, profile_label))
        .collect();
    if !orphans.is_empty() {
        fragments.push(render_orphan_fragment(orphans, profile_label));
    }
    fragments
}

/// Write each fragment to `dir`, creating it if needed.
pub async fn write_fragments(dir: &Path, fragments: &[Fragment]) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| SyncError::io(dir, e))?;

    for fragment in fragments {
        let path = dir.join(fragment.file_name());
        tokio::fs::write(&path, &fragment.content)
            .await
            .map_err(|e| SyncError::io(&path, e))?;
        debug!(path = %path.display(), "Wrote fragment");
    }

    info!(dir = %dir.display(), count = fragments.len(), "Fragments written");
    Ok(())
}

/// Read `epic-<number>.md` files from `dir` as regions, sorted by key.
///
/// The no-epic file and other files are ignored.
pub async fn load_fragments(dir: &Path) -> Result<Vec<Region>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| SyncError::io(dir, e))?;

    let mut regions = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SyncError::io(dir, e))?
    {
        let name = entry.file_name();
        let Some(key) = name.to_str().and_then(parse_fragment_file_name) else {
            continue;
        };
        let path = entry.path();
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SyncError::io(&path, e))?;
        regions.push(Region::new(key, content));
    }

    regions.sort_by_key(|region| region.key);
    debug!(dir = %dir.display(), count = regions.len(), "Fragments loaded");
    Ok(regions)
}
