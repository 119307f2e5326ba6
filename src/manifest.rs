//! Manifest loading
//!
//! Turns an exported memories manifest into [`AcquisitionRecord`]s. The
//! document is either a mapping of category to an ordered list of entries
//! (`{"Saved Media": [...]}`) or a bare list of entries. Entries that lack a
//! capture time, a media kind or a locator are skipped with a warning so one
//! bad entry never aborts the whole load.

use crate::error::{Error, ManifestFormatError, Result};
use crate::types::{AcquisitionRecord, AssetId, Locator, MediaKind};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Category name used when the manifest is a bare list
const UNNAMED_CATEGORY: &str = "";

const DATE_FIELDS: &[&str] = &["Date", "Create Time", "Creation Time"];
const KIND_FIELDS: &[&str] = &["Media Type"];
const DIRECT_URL_FIELDS: &[&str] = &["Media Download Url", "Download URL"];
const RESOLVE_URL_FIELDS: &[&str] = &["Download Link"];

/// Read and parse a manifest file
///
/// Fails only if the file cannot be read or is not a manifest at all;
/// individual malformed entries are skipped.
pub async fn load_manifest(path: &Path) -> Result<Vec<AcquisitionRecord>> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::Manifest(format!("failed to read {}: {}", path.display(), e))
    })?;
    let records = parse_manifest(&content)?;
    info!(path = %path.display(), records = records.len(), "loaded manifest");
    Ok(records)
}

/// Parse manifest text into acquisition records, in manifest order
pub fn parse_manifest(content: &str) -> Result<Vec<AcquisitionRecord>> {
    let document: Value = serde_json::from_str(content)
        .map_err(|e| Error::Manifest(format!("manifest is not valid JSON: {e}")))?;

    let categories: Vec<(&str, &Vec<Value>)> = match &document {
        Value::Array(entries) => vec![(UNNAMED_CATEGORY, entries)],
        Value::Object(map) => map
            .iter()
            .filter_map(|(name, value)| match value {
                Value::Array(entries) => Some((name.as_str(), entries)),
                _ => {
                    debug!(category = %name, "ignoring non-list manifest section");
                    None
                }
            })
            .collect(),
        _ => {
            return Err(Error::Manifest(
                "manifest must be a list of entries or a mapping of category to entries".into(),
            ));
        }
    };

    if matches!(document, Value::Object(_)) && categories.is_empty() {
        return Err(Error::Manifest("manifest contains no entry lists".into()));
    }

    let mut records = Vec::new();
    let mut seen_per_second: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0usize;

    for (category, entries) in categories {
        for (index, entry) in entries.iter().enumerate() {
            match parse_entry(category, index, entry) {
                Ok((captured_at, kind, locator)) => {
                    let stamp = captured_at.format("%Y%m%d_%H%M%S").to_string();
                    let sequence = seen_per_second.entry(stamp).or_insert(0);
                    let id = AssetId::derive(captured_at, *sequence);
                    *sequence += 1;
                    records.push(AcquisitionRecord {
                        id,
                        kind,
                        captured_at,
                        locator,
                    });
                }
                Err(e) => {
                    skipped += 1;
                    warn!(error = %e, "skipping manifest entry");
                }
            }
        }
    }

    if skipped > 0 {
        warn!(skipped, kept = records.len(), "some manifest entries were skipped");
    }

    Ok(records)
}

fn parse_entry(
    category: &str,
    index: usize,
    entry: &Value,
) -> std::result::Result<(DateTime<Utc>, MediaKind, Locator), ManifestFormatError> {
    let Value::Object(fields) = entry else {
        return Err(ManifestFormatError::NotAnObject {
            category: category.to_string(),
            index,
        });
    };

    let missing = |field| ManifestFormatError::MissingField {
        category: category.to_string(),
        index,
        field,
    };
    let malformed = |field, value: &str| ManifestFormatError::Malformed {
        category: category.to_string(),
        index,
        field,
        value: value.to_string(),
    };

    let raw_date = first_field(fields, DATE_FIELDS).ok_or_else(|| missing("capture time"))?;
    let raw_date = raw_date
        .as_str()
        .ok_or_else(|| malformed("capture time", &raw_date.to_string()))?;
    let captured_at =
        parse_capture_time(raw_date).ok_or_else(|| malformed("capture time", raw_date))?;

    let raw_kind = first_field(fields, KIND_FIELDS).ok_or_else(|| missing("media kind"))?;
    let raw_kind = raw_kind
        .as_str()
        .ok_or_else(|| malformed("media kind", &raw_kind.to_string()))?;
    let kind = MediaKind::from_marker(raw_kind).ok_or_else(|| malformed("media kind", raw_kind))?;

    let locator_url =
        |url: &Value| non_empty_str(url).ok_or_else(|| malformed("locator", &url.to_string()));
    let locator = if let Some(url) = first_field(fields, DIRECT_URL_FIELDS) {
        Locator::Direct(locator_url(url)?)
    } else if let Some(url) = first_field(fields, RESOLVE_URL_FIELDS) {
        Locator::Resolve(locator_url(url)?)
    } else {
        return Err(missing("locator"));
    };

    Ok((captured_at, kind, locator))
}

/// First alias present with a usable value
///
/// Null and blank strings count as absent, so an empty primary field falls
/// through to the next alias.
fn first_field<'a>(fields: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|name| fields.get(*name))
        .find(|value| match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse the capture time formats seen in exports
///
/// Accepts `2023-01-31 18:22:05 UTC`, the same without the zone suffix, and
/// RFC 3339 (`2023-01-31T18:22:05Z`, `2023-01-31T19:22:05+01:00`). Times
/// without a zone are taken as UTC.
pub fn parse_capture_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    let naive = raw.strip_suffix("UTC").map(str::trim_end).unwrap_or(raw);
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(naive, format).ok())
        .map(|at| at.and_utc())
}
