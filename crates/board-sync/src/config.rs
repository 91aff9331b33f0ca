//! Configuration for a sync run, read from environment variables.

use std::path::{Path, PathBuf};

use crate::classify::{Classifier, LabelSet};
use crate::error::{Result, SyncError};
use crate::resolve::ConflictPolicy;
use crate::summary::OutputFormat;

/// Default GitHub GraphQL endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com/graphql";

/// Sync configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bearer token for the GraphQL API.
    pub token: Option<String>,
    /// GraphQL endpoint.
    pub api_url: String,
    /// Organization login owning the project.
    pub organization: Option<String>,
    /// Project (v2) number within the organization.
    pub project_number: Option<u64>,
    /// Aliases marking an issue as an Epic.
    pub epic_labels: LabelSet,
    /// Aliases marking an issue as a User Story.
    pub user_story_labels: LabelSet,
    /// Aliases marking an issue as an improvement of a User Story.
    pub improvement_labels: LabelSet,
    /// Label literal carrying the profile, as in `profile: admin`.
    pub profile_label: String,
    /// Summary output format.
    pub output_format: OutputFormat,
    /// Summary output path.
    pub output_file: PathBuf,
    /// Wiki page mutated in place.
    pub wiki_page: Option<PathBuf>,
    /// Directory holding per-epic fragment files.
    pub fragments_dir: Option<PathBuf>,
    /// Prefix of the region markers in the wiki page.
    pub marker_prefix: String,
    /// Append regions that are not yet present in the wiki page.
    pub create_missing: bool,
    /// Resolution of duplicate sub-issue declarations and field names.
    pub conflict_policy: ConflictPolicy,
    /// GitHub Actions step output file receiving `epic_count`/`us_count`.
    pub step_output: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset. The names used by the older
    /// workflow actions (`TOKEN`, `ORG`, `EPIC_LABEL`, `US_LABEL`,
    /// `TABLES_DIR`, `CREATE_MISSING_SECTION`) are read as fallbacks.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let var_or = |key: &'static str, fallback: &'static str| {
            var(key)
                .map(|value| (key, value))
                .or_else(|| var(fallback).map(|value| (fallback, value)))
        };

        let project_number = var("PROJECT_NUMBER")
            .map(|raw| {
                raw.trim().parse::<u64>().map_err(|_| {
                    SyncError::Config(format!("PROJECT_NUMBER must be a number, got '{raw}'"))
                })
            })
            .transpose()?;

        let output_format = var("OUTPUT_FORMAT")
            .map(|raw| raw.parse::<OutputFormat>())
            .transpose()?
            .unwrap_or_default();

        let create_missing = var_or("CREATE_MISSING_SECTIONS", "CREATE_MISSING_SECTION")
            .map(|(key, raw)| parse_bool(key, &raw))
            .transpose()?
            .unwrap_or(true);

        let conflict_policy = var("CONFLICT_POLICY")
            .map(|raw| raw.parse::<ConflictPolicy>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            token: var("GITHUB_TOKEN")
                .or_else(|| var("GH_TOKEN"))
                .or_else(|| var("TOKEN")),
            api_url: var("GITHUB_GRAPHQL_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            organization: var_or("PROJECT_ORG", "ORG").map(|(_, s)| s.trim().to_string()),
            project_number,
            epic_labels: LabelSet::parse(
                &var_or("EPIC_LABELS", "EPIC_LABEL").map_or_else(|| "epic".into(), |(_, v)| v),
            ),
            user_story_labels: LabelSet::parse(
                &var_or("USER_STORY_LABELS", "US_LABEL")
                    .map_or_else(|| "user story, user-story, us".into(), |(_, v)| v),
            ),
            improvement_labels: LabelSet::parse(
                &var("IMPROVEMENT_LABELS").unwrap_or_else(|| "improvement, melhoria".into()),
            ),
            profile_label: var("PROFILE_LABEL").unwrap_or_else(|| "profile".to_string()),
            output_format,
            output_file: var("OUTPUT_FILE")
                .map_or_else(|| PathBuf::from("project-summary.json"), PathBuf::from),
            wiki_page: var("WIKI_PAGE").map(PathBuf::from),
            fragments_dir: var_or("FRAGMENTS_DIR", "TABLES_DIR").map(|(_, v)| PathBuf::from(v)),
            marker_prefix: var("MARKER_PREFIX")
                .map_or_else(|| "US_TABLE".to_string(), |s| s.trim().to_string()),
            create_missing,
            conflict_policy,
            step_output: var("GITHUB_OUTPUT").map(PathBuf::from),
        })
    }

    /// Classifier built from the configured alias sets.
    #[must_use]
    pub fn classifier(&self) -> Classifier {
        Classifier::new(
            self.epic_labels.clone(),
            self.user_story_labels.clone(),
            self.improvement_labels.clone(),
        )
    }

    /// Token, organization and project number needed by any network command.
    pub fn require_remote(&self) -> Result<(&str, &str, u64)> {
        let token = self
            .token
            .as_deref()
            .ok_or(SyncError::MissingConfig("GITHUB_TOKEN"))?;
        let organization = self
            .organization
            .as_deref()
            .ok_or(SyncError::MissingConfig("PROJECT_ORG"))?;
        let number = self
            .project_number
            .ok_or(SyncError::MissingConfig("PROJECT_NUMBER"))?;
        Ok((token, organization, number))
    }

    /// Wiki page path, which must already exist.
    pub fn require_wiki_page(&self) -> Result<&Path> {
        let page = self
            .wiki_page
            .as_deref()
            .ok_or(SyncError::MissingConfig("WIKI_PAGE"))?;
        if !page.is_file() {
            return Err(SyncError::io(
                page,
                std::io::Error::new(std::io::ErrorKind::NotFound, "wiki page does not exist"),
            ));
        }
        Ok(page)
    }

    /// Fragment directory path.
    pub fn require_fragments_dir(&self) -> Result<&Path> {
        self.fragments_dir
            .as_deref()
            .ok_or(SyncError::MissingConfig("FRAGMENTS_DIR"))
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(SyncError::Config(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}
