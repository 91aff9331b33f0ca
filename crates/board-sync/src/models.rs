//! Project board entity types and their GraphQL wire representation.
//!
//! The `Raw*` types mirror the GitHub response shape and are converted into
//! the flattened public types once per page; nothing downstream sees
//! GraphQL connections or nullable list entries.

use serde::{Deserialize, Serialize};

/// One entry of the project board.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectItem {
    /// What the board entry points at; `None` when GitHub returns no content
    pub content: Option<ItemContent>,
}

impl ProjectItem {
    /// The wrapped issue, if this item is one.
    #[must_use]
    pub fn issue(&self) -> Option<&Issue> {
        match &self.content {
            Some(ItemContent::Issue(issue)) => Some(issue),
            _ => None,
        }
    }
}

/// Polymorphic content of a board item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemContent {
    /// A repository issue
    Issue(Issue),
    /// Draft issue, pull request, or anything else
    Other,
}

/// Issue open/closed state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueState {
    #[default]
    Open,
    Closed,
}

/// Reference to another issue (parent or sub-issue).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRef {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

/// GitHub issue as seen through the project board.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Issue {
    /// Issue number (stable identifier)
    pub number: u64,
    /// Issue title
    pub title: String,
    /// Issue body (markdown)
    pub body: Option<String>,
    /// URL to the issue; identity key for parent/child correlation
    pub url: String,
    /// Open or closed
    pub state: IssueState,
    /// Label names in GitHub order
    pub labels: Vec<String>,
    /// Explicit parent issue
    pub parent: Option<IssueRef>,
    /// Declared sub-issues
    pub sub_issues: Vec<IssueRef>,
    /// Field values, one set per project the issue belongs to
    pub project_items: Vec<ProjectFieldSet>,
}

/// Field values of an issue within one project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectFieldSet {
    pub project_number: u64,
    pub field_values: Vec<FieldValue>,
}

/// A single project field value.
///
/// Sub-fields GitHub leaves null stay `None`; defaults are applied by the
/// extractor.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    SingleSelect {
        field: Option<String>,
        name: Option<String>,
    },
    Iteration {
        field: Option<String>,
        title: Option<String>,
        start_date: Option<String>,
        duration: Option<u32>,
    },
    Text {
        field: Option<String>,
        text: Option<String>,
    },
    Number {
        field: Option<String>,
        number: Option<f64>,
    },
    /// Date, user, label, milestone and other variants we do not extract
    Unsupported,
}

impl FieldValue {
    /// Name of the project field this value belongs to.
    #[must_use]
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::SingleSelect { field, .. }
            | Self::Iteration { field, .. }
            | Self::Text { field, .. }
            | Self::Number { field, .. } => field.as_deref(),
            Self::Unsupported => None,
        }
    }
}

// =============================================================================
// GraphQL wire types
// =============================================================================

/// Cursor state of a paginated connection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// Generic `{ nodes: [...] }` connection; null entries are skipped.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub(crate) struct Connection<T> {
    #[serde(default)]
    nodes: Vec<Option<T>>,
}

impl<T> Default for Connection<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<T> Connection<T> {
    fn into_nodes(self) -> impl Iterator<Item = T> {
        self.nodes.into_iter().flatten()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ItemsPage {
    pub organization: Option<RawOrganization>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawOrganization {
    pub project_v2: Option<RawProject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawProject {
    pub items: RawItemConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawItemConnection {
    pub page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<Option<RawItem>>,
}

impl RawItemConnection {
    /// Convert the page's items into public types, in server order.
    pub fn into_items(self) -> Vec<ProjectItem> {
        self.nodes
            .into_iter()
            .flatten()
            .map(ProjectItem::from)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawItem {
    #[serde(default)]
    content: Option<RawContent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum RawContent {
    Issue(RawIssue),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIssue {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    state: IssueState,
    #[serde(default)]
    labels: Option<Connection<RawLabel>>,
    #[serde(default)]
    parent: Option<IssueRef>,
    #[serde(default)]
    sub_issues: Option<Connection<IssueRef>>,
    #[serde(default)]
    project_items: Option<Connection<RawProjectItem>>,
}

#[derive(Debug, Deserialize)]
struct RawLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProjectItem {
    project: Option<RawProjectRef>,
    #[serde(default)]
    field_values: Option<Connection<RawFieldValue>>,
}

#[derive(Debug, Deserialize)]
struct RawProjectRef {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct RawFieldRef {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum RawFieldValue {
    #[serde(rename = "ProjectV2ItemFieldSingleSelectValue")]
    SingleSelect {
        #[serde(default)]
        field: Option<RawFieldRef>,
        #[serde(default)]
        name: Option<String>,
    },
    #[serde(rename = "ProjectV2ItemFieldIterationValue")]
    Iteration {
        #[serde(default)]
        field: Option<RawFieldRef>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default, rename = "startDate")]
        start_date: Option<String>,
        #[serde(default)]
        duration: Option<u32>,
    },
    #[serde(rename = "ProjectV2ItemFieldTextValue")]
    Text {
        #[serde(default)]
        field: Option<RawFieldRef>,
        #[serde(default)]
        text: Option<String>,
    },
    #[serde(rename = "ProjectV2ItemFieldNumberValue")]
    Number {
        #[serde(default)]
        field: Option<RawFieldRef>,
        #[serde(default)]
        number: Option<f64>,
    },
    #[serde(other)]
    Unsupported,
}

fn field_name(field: Option<RawFieldRef>) -> Option<String> {
    field.and_then(|f| f.name)
}

impl From<RawFieldValue> for FieldValue {
    fn from(raw: RawFieldValue) -> Self {
        match raw {
            RawFieldValue::SingleSelect { field, name } => Self::SingleSelect {
                field: field_name(field),
                name,
            },
            RawFieldValue::Iteration {
                field,
                title,
                start_date,
                duration,
            } => Self::Iteration {
                field: field_name(field),
                title,
                start_date,
                duration,
            },
            RawFieldValue::Text { field, text } => Self::Text {
                field: field_name(field),
                text,
            },
            RawFieldValue::Number { field, number } => Self::Number {
                field: field_name(field),
                number,
            },
            RawFieldValue::Unsupported => Self::Unsupported,
        }
    }
}

impl From<RawIssue> for Issue {
    fn from(raw: RawIssue) -> Self {
        let project_items = raw
            .project_items
            .unwrap_or_default()
            .into_nodes()
            .filter_map(|item| {
                // Field values without a project cannot be attributed
                let project_number = item.project?.number;
                Some(ProjectFieldSet {
                    project_number,
                    field_values: item
                        .field_values
                        .unwrap_or_default()
                        .into_nodes()
                        .map(FieldValue::from)
                        .collect(),
                })
            })
            .collect();

        Self {
            number: raw.number,
            title: raw.title,
            body: raw.body,
            url: raw.url,
            state: raw.state,
            labels: raw
                .labels
                .unwrap_or_default()
                .into_nodes()
                .map(|label| label.name)
                .collect(),
            parent: raw.parent,
            sub_issues: raw.sub_issues.unwrap_or_default().into_nodes().collect(),
            project_items,
        }
    }
}

impl From<RawItem> for ProjectItem {
    fn from(raw: RawItem) -> Self {
        let content = raw.content.map(|content| match content {
            RawContent::Issue(issue) => ItemContent::Issue(issue.into()),
            RawContent::Other => ItemContent::Other,
        });
        Self { content }
    }
}
