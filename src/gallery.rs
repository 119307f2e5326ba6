//! Static HTML gallery of the media store
//!
//! Media files are grouped by year and month of capture, newest first. The
//! capture time comes from the `YYYYMMDD_HHMMSS` prefix of each file name,
//! which is how the fetch executor names assets. The page is self-contained:
//! inline CSS, a year filter, collapsible months and a lightbox with
//! keyboard navigation.

use crate::error::{Error, Result};
use crate::store::MediaStore;
use crate::thumbnail::thumbnail_path;
use crate::types::MediaKind;
use crate::utils::{relative_to, to_url_path, write_atomic};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const TIMESTAMP_PATTERN: &str = r"^(\d{4})(\d{2})(\d{2})_(\d{2})(\d{2})(\d{2})";

/// Title shown in the page header
pub const GALLERY_TITLE: &str = "Memories";

/// One media file placed in the gallery
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GalleryItem {
    /// Media file
    pub path: PathBuf,
    /// Preview image for videos, if one exists
    pub thumbnail: Option<PathBuf>,
    /// Capture time parsed from the file name
    pub captured_at: NaiveDateTime,
    /// Image or video
    pub kind: MediaKind,
}

/// Parses capture times out of media file names
#[derive(Clone, Debug)]
pub struct TimestampMatcher {
    pattern: Regex,
}

impl TimestampMatcher {
    /// Compile the file name pattern
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(TIMESTAMP_PATTERN)
            .map_err(|e| Error::Other(format!("invalid timestamp pattern: {}", e)))?;
        Ok(Self { pattern })
    }

    /// Capture time encoded at the start of `file_name`, if any
    ///
    /// Out-of-range components (month 13, hour 25) yield `None`.
    pub fn parse(&self, file_name: &str) -> Option<NaiveDateTime> {
        let caps = self.pattern.captures(file_name)?;
        let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
        let year = i32::try_from(field(1)?).ok()?;
        NaiveDate::from_ymd_opt(year, field(2)?, field(3)?)?.and_hms_opt(
            field(4)?,
            field(5)?,
            field(6)?,
        )
    }
}

/// Collect gallery items from the media store
///
/// Files that are not images or videos, and files whose name does not carry
/// a capture time, are skipped with a log line. Items come back newest first.
pub async fn scan_media(store: &MediaStore, thumb_dir: &Path) -> Result<Vec<GalleryItem>> {
    let matcher = TimestampMatcher::new()?;
    let mut items = Vec::new();

    for asset in store.list().await? {
        let Some(kind) = asset.kind else {
            debug!(path = %asset.path.display(), "not a media file, skipping");
            continue;
        };
        let file_name = asset
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(captured_at) = matcher.parse(&file_name) else {
            info!(file = %file_name, "skipping file (invalid name format)");
            continue;
        };

        let thumbnail = match kind {
            MediaKind::Image => None,
            MediaKind::Video => {
                let candidate = thumbnail_path(thumb_dir, &asset.stem);
                if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                    Some(candidate)
                } else {
                    warn!(file = %file_name, "thumbnail missing for video");
                    None
                }
            }
        };

        items.push(GalleryItem {
            path: asset.path,
            thumbnail,
            captured_at,
            kind,
        });
    }

    items.sort_by(|a, b| {
        b.captured_at
            .cmp(&a.captured_at)
            .then_with(|| a.path.cmp(&b.path))
    });
    Ok(items)
}

/// Escape text for use in HTML content and quoted attributes
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn link(path: &Path, base_dir: &Path) -> String {
    escape_html(&to_url_path(&relative_to(path, base_dir)))
}

/// Render the gallery page
///
/// Links to media and thumbnails are written relative to `base_dir`, the
/// directory the page will be saved in.
pub fn render_gallery(items: &[GalleryItem], base_dir: &Path) -> String {
    let mut grouped: BTreeMap<i32, BTreeMap<u32, Vec<&GalleryItem>>> = BTreeMap::new();
    for item in items {
        grouped
            .entry(item.captured_at.year())
            .or_default()
            .entry(item.captured_at.month())
            .or_default()
            .push(item);
    }

    let mut html = String::new();
    html.push_str(PAGE_HEAD);
    let _ = write!(
        html,
        "<header>\n  <h2>{title}</h2>\n  <select id=\"yearFilter\"><option value=\"all\">All years</option></select>\n</header>\n",
        title = GALLERY_TITLE
    );

    let mut index = 0usize;
    for (year, months) in grouped.iter().rev() {
        let _ = writeln!(html, "<section class=\"year\" data-year=\"{year}\"><h3>{year}</h3>");
        for month_items in months.values().rev() {
            let mut month_items = month_items.clone();
            month_items.sort_by(|a, b| {
                b.captured_at
                    .cmp(&a.captured_at)
                    .then_with(|| a.path.cmp(&b.path))
            });
            let month_name = month_items
                .first()
                .map(|item| item.captured_at.format("%B").to_string())
                .unwrap_or_default();

            let _ = write!(
                html,
                "<div class=\"month\">\n  <div class=\"month-header\"><strong>{month_name}</strong><span>{count}</span></div>\n  <div class=\"grid\">\n",
                count = month_items.len()
            );
            for item in month_items {
                render_card(&mut html, item, index, base_dir);
                index += 1;
            }
            html.push_str("  </div>\n</div>\n");
        }
        html.push_str("</section>\n");
    }

    html.push_str(PAGE_TAIL);
    html
}

fn render_card(html: &mut String, item: &GalleryItem, index: usize, base_dir: &Path) {
    let src = link(&item.path, base_dir);
    let _ = write!(
        html,
        "    <div class=\"card\" data-index=\"{index}\" data-type=\"{kind}\" data-path=\"{src}\" title=\"{taken}\">",
        kind = item.kind,
        taken = item.captured_at.format("%Y-%m-%d %H:%M:%S"),
    );
    match (item.kind, &item.thumbnail) {
        (MediaKind::Image, _) => {
            let _ = write!(html, "<img src=\"{src}\" loading=\"lazy\" alt=\"\">");
        }
        (MediaKind::Video, Some(thumb)) => {
            let _ = write!(
                html,
                "<img src=\"{}\" loading=\"lazy\" alt=\"\">",
                link(thumb, base_dir)
            );
        }
        (MediaKind::Video, None) => {
            let _ = write!(html, "<video src=\"{src}\" preload=\"metadata\" muted></video>");
        }
    }
    let _ = writeln!(
        html,
        "<div class=\"card-label\">{}</div></div>",
        item.kind.label()
    );
}

/// Scan the store, render the page and write it atomically to `page`
///
/// Returns the number of items on the page.
pub async fn write_gallery(store: &MediaStore, thumb_dir: &Path, page: &Path) -> Result<usize> {
    let items = scan_media(store, thumb_dir).await?;
    let base_dir = page.parent().unwrap_or_else(|| Path::new(""));
    let html = render_gallery(&items, base_dir);
    write_atomic(page, html.as_bytes())
        .await
        .map_err(|source| Error::StorageWrite {
            path: page.to_path_buf(),
            source,
        })?;
    info!(path = %page.display(), items = items.len(), "gallery written");
    Ok(items.len())
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Memories</title>
<style>
body{margin:0;font-family:system-ui,sans-serif;background:#111318;color:#e8e8ee}
header{position:sticky;top:0;z-index:10;display:flex;gap:16px;align-items:center;padding:12px 16px;background:#111318dd;backdrop-filter:blur(6px)}
header h2{margin:0}
select{background:#1b1e25;color:inherit;border:1px solid #2c313c;border-radius:6px;padding:6px}
.year{padding:0 16px 16px}
.month{margin-bottom:14px}
.month-header{display:flex;justify-content:space-between;padding:10px;border-radius:8px;background:#1b1e25;cursor:pointer;user-select:none}
.grid{display:grid;grid-template-columns:repeat(auto-fill,minmax(160px,1fr));gap:10px;margin-top:8px}
.grid.collapsed{display:none}
.card{position:relative;aspect-ratio:1;overflow:hidden;border-radius:8px;background:#000;cursor:pointer}
.card img,.card video{width:100%;height:100%;object-fit:cover;pointer-events:none}
.card-label{position:absolute;left:4px;bottom:4px;padding:2px 5px;border-radius:4px;font-size:12px;background:#000a}
#lightbox{position:fixed;inset:0;z-index:100;display:none;flex-direction:column;align-items:center;justify-content:center;background:#000000f2}
#lightbox.open{display:flex}
#lightbox-content img,#lightbox-content video{max-width:90vw;max-height:80vh}
#lightbox button{margin:8px 4px;padding:8px 16px;border:none;border-radius:6px;font-size:16px;background:#1b1e25;color:inherit;cursor:pointer}
</style>
</head>
<body>
"#;

const PAGE_TAIL: &str = r#"<div id="lightbox">
  <div id="lightbox-content"></div>
  <div>
    <button id="prevBtn">Previous</button>
    <button id="nextBtn">Next</button>
    <button id="closeBtn">Close</button>
  </div>
</div>
<script>
const sections = Array.from(document.querySelectorAll(".year"));
const filter = document.getElementById("yearFilter");
for (const section of sections) {
  const option = document.createElement("option");
  option.value = option.textContent = section.dataset.year;
  filter.appendChild(option);
}
filter.addEventListener("change", () => {
  for (const section of sections) {
    section.style.display = filter.value === "all" || filter.value === section.dataset.year ? "" : "none";
  }
});
for (const header of document.querySelectorAll(".month-header")) {
  header.addEventListener("click", () => header.nextElementSibling.classList.toggle("collapsed"));
}

const lightbox = document.getElementById("lightbox");
const content = document.getElementById("lightbox-content");
const cards = Array.from(document.querySelectorAll(".card"));
let current = 0;

function stopPlayback() {
  const playing = content.querySelector("video");
  if (playing) { playing.pause(); playing.currentTime = 0; }
}

function show(index) {
  if (cards.length === 0) return;
  stopPlayback();
  current = (index + cards.length) % cards.length;
  const card = cards[current];
  content.replaceChildren();
  let media;
  if (card.dataset.type === "video") {
    media = document.createElement("video");
    media.controls = true;
    media.autoplay = true;
  } else {
    media = document.createElement("img");
  }
  media.src = card.dataset.path;
  content.appendChild(media);
  lightbox.classList.add("open");
}

function close() {
  stopPlayback();
  content.replaceChildren();
  lightbox.classList.remove("open");
}

cards.forEach((card, i) => card.addEventListener("click", () => show(i)));
document.getElementById("nextBtn").addEventListener("click", () => show(current + 1));
document.getElementById("prevBtn").addEventListener("click", () => show(current - 1));
document.getElementById("closeBtn").addEventListener("click", close);
document.addEventListener("keydown", (e) => {
  if (!lightbox.classList.contains("open")) return;
  if (e.key === "ArrowRight") show(current + 1);
  else if (e.key === "ArrowLeft") show(current - 1);
  else if (e.key === "Escape") close();
});
</script>
</body>
</html>
"#;
