//! One sync run: fetch the board, group it, and write the outputs.
//!
//! Preconditions on local paths are checked before any network call so a
//! misconfigured run fails without touching the API.

use std::path::Path;

use chrono::Utc;
use tracing::info;

use crate::client::GitHubClient;
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::fragments::{load_fragments, render_fragments, write_fragments, Fragment};
use crate::markers::{merge_regions, MergeOptions, MergeReport, Region};
use crate::resolve::Board;
use crate::summary::Summary;

/// Fetch the configured project and build its summary.
///
/// Counts are appended to the step output file when one is configured.
pub async fn fetch_summary(config: &Config) -> Result<Summary> {
    let (token, organization, number) = config.require_remote()?;
    let client = GitHubClient::with_url(token, &config.api_url)?;

    let fetched_at = Utc::now();
    let items = client.fetch_project_items(organization, number).await?;
    let board = Board::build(&items, &config.classifier(), number, config.conflict_policy);
    let summary = Summary::new(organization, number, board, fetched_at);

    if let Some(path) = config.step_output.as_deref() {
        summary.append_step_outputs(path).await?;
    }
    Ok(summary)
}

/// Write the summary document in the configured format.
pub async fn run_export(config: &Config) -> Result<Summary> {
    let summary = fetch_summary(config).await?;
    summary
        .write(&config.output_file, config.output_format, &config.profile_label)
        .await?;
    Ok(summary)
}

/// Write one fragment file per epic (plus the no-epic group).
pub async fn run_fragments(config: &Config) -> Result<Vec<Fragment>> {
    let dir = config.require_fragments_dir()?;
    let summary = fetch_summary(config).await?;
    let fragments = render_fragments(
        &summary.epics,
        &summary.orphan_user_stories,
        &config.profile_label,
    );
    write_fragments(dir, &fragments).await?;
    Ok(fragments)
}

/// Regenerate the wiki page regions from the live board.
///
/// Fragment files are also written when a fragment directory is set. The
/// no-epic fragment is written but never merged into the page.
pub async fn run_wiki(config: &Config) -> Result<MergeReport> {
    let page = config.require_wiki_page()?;
    let summary = fetch_summary(config).await?;
    let fragments = render_fragments(
        &summary.epics,
        &summary.orphan_user_stories,
        &config.profile_label,
    );

    if let Some(dir) = config.fragments_dir.as_deref() {
        write_fragments(dir, &fragments).await?;
    }

    let regions: Vec<Region> = fragments.iter().filter_map(Fragment::region).collect();
    update_wiki_page(page, &regions, &merge_options(config)).await
}

/// Merge previously written fragment files into the wiki page, offline.
pub async fn run_merge(config: &Config) -> Result<MergeReport> {
    let page = config.require_wiki_page()?;
    let dir = config.require_fragments_dir()?;
    let regions = load_fragments(dir).await?;
    update_wiki_page(page, &regions, &merge_options(config)).await
}

/// Merge `regions` into the page at `path`, rewriting it only on change.
pub async fn update_wiki_page(
    path: &Path,
    regions: &[Region],
    options: &MergeOptions,
) -> Result<MergeReport> {
    let original = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SyncError::io(path, e))?;

    let merged = merge_regions(&original, regions, options);
    if merged.changed(&original) {
        tokio::fs::write(path, &merged.document)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        info!(
            path = %path.display(),
            replaced = merged.report.replaced.len(),
            appended = merged.report.appended.len(),
            "Wiki page updated"
        );
    } else {
        info!(path = %path.display(), "Wiki page already up to date");
    }

    Ok(merged.report)
}

fn merge_options(config: &Config) -> MergeOptions {
    MergeOptions {
        prefix: config.marker_prefix.clone(),
        create_missing: config.create_missing,
        aggregate: true,
    }
}
