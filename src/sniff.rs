//! File extension classification for fetched payloads
//!
//! The extension comes from the payload's leading bytes when they carry a
//! known signature, then from the `Content-Type` header, and finally from
//! the declared media kind.

use crate::types::MediaKind;

/// Number of leading payload bytes needed by [`classify_extension`]
pub const SNIFF_LEN: usize = 64;

/// Pick the file extension for a payload
///
/// `head` is the first bytes of the payload (up to [`SNIFF_LEN`]; fewer is
/// fine), `content_type` the raw header value if any.
pub fn classify_extension(
    kind: MediaKind,
    content_type: Option<&str>,
    head: &[u8],
) -> &'static str {
    sniff_signature(head)
        .or_else(|| content_type.and_then(extension_for_content_type))
        .unwrap_or_else(|| kind.default_extension())
}

/// Extension implied by a byte signature
pub fn sniff_signature(head: &[u8]) -> Option<&'static str> {
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("jpg");
    }
    if head.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("png");
    }
    if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        return Some("gif");
    }
    if head.len() >= 12 && head.starts_with(b"RIFF") {
        return match &head[8..12] {
            b"WEBP" => Some("webp"),
            b"AVI " => Some("avi"),
            _ => None,
        };
    }
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        return Some(match &head[8..12] {
            b"qt  " => "mov",
            b"heic" | b"heix" | b"heim" | b"heis" | b"hevc" | b"mif1" | b"msf1" => "heic",
            _ => "mp4",
        });
    }
    if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        let is_webm = head.windows(4).any(|w| w == b"webm");
        return Some(if is_webm { "webm" } else { "mkv" });
    }
    if head.starts_with(b"PK\x03\x04") {
        return Some("zip");
    }
    None
}

/// Extension implied by a `Content-Type` header value
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/heic" | "image/heif" => Some("heic"),
        "video/mp4" => Some("mp4"),
        "video/quicktime" => Some("mov"),
        "video/webm" => Some("webm"),
        "video/x-matroska" => Some("mkv"),
        "video/x-msvideo" | "video/avi" => Some("avi"),
        "application/zip" | "application/x-zip-compressed" => Some("zip"),
        _ => None,
    }
}
