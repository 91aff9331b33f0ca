//! Sync GitHub project board epics and user stories into wiki tables.
//!
//! This crate provides:
//! - GraphQL client with cursor pagination over a project's items
//! - Label-based classification of issues into epics, user stories and improvements
//! - Parent resolution from explicit parent links and declared sub-issue lists
//! - Extraction of `RG:` rules and typed project field values
//! - JSON/Markdown summaries and per-epic Markdown fragments
//! - Idempotent replacement of marker-delimited regions in a wiki page
//!
//! ## Example
//!
//! ```
//! use board_sync::markers::{merge_regions, MergeOptions, Region, RegionKey};
//!
//! let regions = [Region::new(RegionKey::Id(7), "hello")];
//! let options = MergeOptions::new("US_TABLE");
//!
//! let first = merge_regions("# Stories\n", &regions, &options);
//! let second = merge_regions(&first.document, &regions, &options);
//! assert_eq!(first.document, second.document);
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod fragments;
pub mod markers;
pub mod models;
pub mod resolve;
pub mod summary;
pub mod sync;

pub use classify::{Classifier, LabelSet, Role};
pub use client::GitHubClient;
pub use config::Config;
pub use error::{Result, SyncError};
pub use extract::{extract_fields, extract_rules, FieldData};
pub use markers::{merge_regions, MergeOptions, Region, RegionKey};
pub use resolve::{Board, ConflictPolicy, EpicRecord, UserStoryRecord};
pub use summary::{OutputFormat, Summary};
