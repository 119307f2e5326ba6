//! Manifest and payload fixtures

use serde_json::{Value, json};
use std::path::{Path, PathBuf};

/// Smallest byte prefix recognized as PNG
pub const PNG_BYTES: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R',
];

/// Smallest byte prefix recognized as MP4
pub const MP4_BYTES: &[u8] = b"\x00\x00\x00\x20ftypisom\x00\x00\x02\x00isomiso2avc1mp41";

/// Manifest entry with a direct download URL
pub fn direct_entry(date: &str, media_type: &str, url: &str) -> Value {
    json!({
        "Date": date,
        "Media Type": media_type,
        "Media Download Url": url,
    })
}

/// Manifest entry with a link that must be resolved first
pub fn resolve_entry(date: &str, media_type: &str, link: &str) -> Value {
    json!({
        "Date": date,
        "Media Type": media_type,
        "Download Link": link,
    })
}

/// Write a manifest in the usual export shape and return its path
pub fn write_manifest(dir: &Path, entries: Vec<Value>) -> PathBuf {
    let path = dir.join("memories_history.json");
    let document = json!({ "Saved Media": entries });
    std::fs::write(&path, document.to_string()).expect("Failed to write manifest");
    path
}
