//! Run summary document (JSON or Markdown).

use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::{Result, SyncError};
use crate::fragments::render_story_table;
use crate::resolve::{Board, EpicRecord, Stats, UserStoryRecord};

/// Summary output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
    Markdown,
}

impl FromStr for OutputFormat {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(SyncError::Config(format!(
                "OUTPUT_FORMAT must be 'json' or 'markdown', got '{other}'"
            ))),
        }
    }
}

/// Everything one run learned about the project.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub project_number: u64,
    pub organization: String,
    pub fetched_at: DateTime<Utc>,
    pub stats: Stats,
    pub epics: Vec<EpicRecord>,
    pub orphan_user_stories: Vec<UserStoryRecord>,
}

impl Summary {
    #[must_use]
    pub fn new(
        organization: impl Into<String>,
        project_number: u64,
        board: Board,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            project_number,
            organization: organization.into(),
            fetched_at,
            stats: board.stats,
            epics: board.epics,
            orphan_user_stories: board.orphans,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[must_use]
    pub fn to_markdown(&self, profile_label: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "# Project #{} ({})\n",
            self.project_number, self.organization
        );
        let _ = writeln!(
            out,
            "_Fetched at {}_\n",
            self.fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        out.push_str("| Epics | User stories | Linked | Orphans |\n|---|---|---|---|\n");
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            self.stats.total_epics,
            self.stats.total_user_stories,
            self.stats.linked_user_stories,
            self.stats.orphan_user_stories
        );

        for epic in &self.epics {
            let _ = write!(out, "\n## [#{} {}]({})\n\n", epic.number, epic.title, epic.url);
            if !epic.rules.is_empty() {
                out.push_str("**Rules**\n\n");
                for rule in &epic.rules {
                    let _ = writeln!(out, "- {rule}");
                }
                out.push('\n');
            }
            out.push_str(&render_story_table(&epic.user_stories, profile_label));
            out.push('\n');
        }

        if !self.orphan_user_stories.is_empty() {
            out.push_str("\n## User stories without epic\n\n");
            out.push_str(&render_story_table(&self.orphan_user_stories, profile_label));
            out.push('\n');
        }

        out
    }

    /// Render in `format`.
    pub fn render(&self, format: OutputFormat, profile_label: &str) -> Result<String> {
        match format {
            OutputFormat::Json => self.to_json(),
            OutputFormat::Markdown => Ok(self.to_markdown(profile_label)),
        }
    }

    /// Render and overwrite `path`.
    pub async fn write(&self, path: &Path, format: OutputFormat, profile_label: &str) -> Result<()> {
        let rendered = self.render(format, profile_label)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::io(parent, e))?;
        }
        tokio::fs::write(path, rendered)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        info!(path = %path.display(), ?format, "Summary written");
        Ok(())
    }

    /// `key=value` lines for a GitHub Actions step output file.
    #[must_use]
    pub fn step_outputs(&self) -> String {
        format!(
            "epic_count={}\nus_count={}\n",
            self.stats.total_epics, self.stats.total_user_stories
        )
    }

    /// Append [`Summary::step_outputs`] to the file at `path`.
    pub async fn append_step_outputs(&self, path: &Path) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        file.write_all(self.step_outputs().as_bytes())
            .await
            .map_err(|e| SyncError::io(path, e))?;
        file.flush().await.map_err(|e| SyncError::io(path, e))?;
        info!(path = %path.display(), "Step outputs appended");
        Ok(())
    }
}
