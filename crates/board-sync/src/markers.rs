//! Marker-delimited region replacement inside a hand-maintained document.
//!
//! A region is bounded by two HTML comments:
//!
//! ```text
//! <!-- US_TABLE_START_7 -->
//! generated content
//! <!-- US_TABLE_END_7 -->
//! ```
//!
//! The document is first split into plain text and region spans by a
//! literal scan (no regular expressions, so prefixes never need escaping),
//! then rebuilt with fresh region content. Text outside regions is copied
//! through byte for byte, which makes a repeated merge a no-op.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

/// Key of the aggregate region.
pub const AGGREGATE_KEY: &str = "ALL";

const MARKER_CLOSE: &str = " -->";

/// Identifies a region within a document.
///
/// Numeric keys order before the aggregate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegionKey {
    Id(u64),
    All,
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::All => f.write_str(AGGREGATE_KEY),
        }
    }
}

impl FromStr for RegionKey {
    type Err = String;

    /// Accepts `ALL` or a canonical decimal number (no sign, no leading zeros).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == AGGREGATE_KEY {
            return Ok(Self::All);
        }
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid region key '{s}'"));
        }
        let id: u64 = s.parse().map_err(|e| format!("invalid region key '{s}': {e}"))?;
        if id.to_string() != s {
            return Err(format!("non-canonical region key '{s}'"));
        }
        Ok(Self::Id(id))
    }
}

/// Start marker for `key`.
#[must_use]
pub fn start_marker(prefix: &str, key: RegionKey) -> String {
    format!("<!-- {prefix}_START_{key}{MARKER_CLOSE}")
}

/// End marker for `key`.
#[must_use]
pub fn end_marker(prefix: &str, key: RegionKey) -> String {
    format!("<!-- {prefix}_END_{key}{MARKER_CLOSE}")
}

/// Generated content for one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub key: RegionKey,
    body: String,
}

impl Region {
    /// Trailing whitespace of `body` is stripped.
    pub fn new(key: RegionKey, body: impl AsRef<str>) -> Self {
        Self {
            key,
            body: body.as_ref().trim_end().to_string(),
        }
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Start marker, newline, body, newline, end marker.
    #[must_use]
    pub fn render(&self, prefix: &str) -> String {
        format!(
            "{}\n{}\n{}",
            start_marker(prefix, self.key),
            self.body,
            end_marker(prefix, self.key)
        )
    }
}

/// A piece of a tokenized document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span<'a> {
    /// Text outside any region
    Text(&'a str),
    /// A complete region, markers included
    Region { key: RegionKey, raw: &'a str },
}

/// Split `document` into text and region spans for `prefix`.
///
/// A start marker pairs with the first matching end marker after it. A
/// start marker without one, or with an unparsable key, stays plain text.
#[must_use]
pub fn tokenize<'a>(document: &'a str, prefix: &str) -> Vec<Span<'a>> {
    let needle = format!("<!-- {prefix}_START_");
    let mut spans = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(found) = document[cursor..].find(&needle) {
        let start = cursor + found;
        let key_start = start + needle.len();

        let Some((key, key_len)) = parse_key(&document[key_start..]) else {
            cursor = key_start;
            continue;
        };
        let open_end = key_start + key_len + MARKER_CLOSE.len();

        let close = end_marker(prefix, key);
        let Some(close_at) = document[open_end..].find(&close) else {
            debug!(%key, "Start marker without end marker, leaving as text");
            cursor = open_end;
            continue;
        };
        let end = open_end + close_at + close.len();

        if text_start < start {
            spans.push(Span::Text(&document[text_start..start]));
        }
        spans.push(Span::Region {
            key,
            raw: &document[start..end],
        });
        text_start = end;
        cursor = end;
    }

    if text_start < document.len() {
        spans.push(Span::Text(&document[text_start..]));
    }
    spans
}

fn parse_key(rest: &str) -> Option<(RegionKey, usize)> {
    let close = rest.find(MARKER_CLOSE)?;
    let key = rest[..close].parse().ok()?;
    Some((key, close))
}

/// How regions are merged into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    /// Marker prefix, e.g. `US_TABLE`
    pub prefix: String,
    /// Append regions missing from the document
    pub create_missing: bool,
    /// Also maintain the `ALL` region concatenating every body
    pub aggregate: bool,
}

impl MergeOptions {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            create_missing: true,
            aggregate: true,
        }
    }
}

/// What a merge did to each region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub replaced: Vec<RegionKey>,
    pub appended: Vec<RegionKey>,
    pub skipped: Vec<RegionKey>,
}

/// Merge result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    pub document: String,
    pub report: MergeReport,
}

impl Merged {
    /// Whether the merge changed the input document.
    #[must_use]
    pub fn changed(&self, original: &str) -> bool {
        self.document != original
    }
}

/// Replace or append `regions` in `document`.
///
/// Regions are handled in ascending key order, followed by the aggregate
/// region when enabled. Existing regions are replaced in place; missing
/// ones are appended when `create_missing` is set and skipped otherwise.
/// Caller-supplied regions keyed `ALL` are ignored, since that region is
/// always derived.
#[must_use]
pub fn merge_regions(document: &str, regions: &[Region], options: &MergeOptions) -> Merged {
    let mut wanted: BTreeMap<RegionKey, Region> = BTreeMap::new();
    for region in regions {
        if region.key == RegionKey::All {
            warn!("Ignoring explicit aggregate region; it is generated from the others");
            continue;
        }
        if wanted.insert(region.key, region.clone()).is_some() {
            warn!(key = %region.key, "Duplicate region key, keeping the last body");
        }
    }

    if options.aggregate {
        let body = wanted
            .values()
            .map(Region::body)
            .collect::<Vec<_>>()
            .join("\n\n");
        wanted.insert(RegionKey::All, Region::new(RegionKey::All, body));
    }

    let mut report = MergeReport::default();
    let mut output = String::with_capacity(document.len());
    let mut seen: BTreeMap<RegionKey, usize> = BTreeMap::new();

    for span in tokenize(document, &options.prefix) {
        match span {
            Span::Text(text) => output.push_str(text),
            Span::Region { key, raw } => match wanted.get(&key) {
                Some(region) => {
                    output.push_str(&region.render(&options.prefix));
                    *seen.entry(key).or_default() += 1;
                }
                None => output.push_str(raw),
            },
        }
    }

    for (key, count) in &seen {
        if *count > 1 {
            warn!(%key, count, "Region appears more than once, all copies replaced");
        }
    }

    for (key, region) in &wanted {
        if seen.contains_key(key) {
            report.replaced.push(*key);
        } else if options.create_missing {
            let trimmed = output.trim_end_matches(['\n', '\r']).len();
            output.truncate(trimmed);
            if !output.is_empty() {
                output.push_str("\n\n");
            }
            output.push_str(&region.render(&options.prefix));
            output.push('\n');
            report.appended.push(*key);
        } else {
            report.skipped.push(*key);
        }
    }

    debug!(
        replaced = report.replaced.len(),
        appended = report.appended.len(),
        skipped = report.skipped.len(),
        "Regions merged"
    );

    Merged {
        document: output,
        report,
    }
}
