//! Canonical data model for the crawl-and-resume engine.
//!
//! The ledger structs are the persisted wire format (`download_status.json`);
//! the crawler and the ledger module use them as the single source of truth.
//! `ExtractedPage` and `StoryMetadata` are transient and never persisted.

use serde::{Deserialize, Serialize};

/// One archived chapter page. Immutable once written to the ledger, except
/// that a later crawl may find the same `url` already present and skip it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterRecord {
    /// Canonical fetch URL; unique key within a story.
    pub url: String,
    /// Extracted display title (may be the "Unknown Title" placeholder).
    pub title: String,
    /// Relative path of the persisted chapter file within the story folder.
    pub filename: String,
    /// ISO-8601 UTC timestamp with trailing `Z`.
    #[serde(rename = "download_timestamp")]
    pub downloaded_at: String,
    /// The "next" link extracted from this page when it was fetched.
    /// `None` marks the natural end of the story.
    pub next_url_from_page: Option<String>,
    /// 1-based sequence index; equals the record's position in `chapters`.
    pub download_order: u32,
}

/// Per-story download progress, persisted as `download_status.json`.
///
/// `chapters` is append-only; insertion order is download order. When
/// `next_expected_chapter_url` is set it equals the `next_url_from_page`
/// of the last chapter (or the starting URL if `chapters` is empty).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressLedger {
    pub overview_url: Option<String>,
    pub story_title: Option<String>,
    pub author_name: Option<String>,
    pub last_downloaded_url: Option<String>,
    /// Resume cursor: where an interrupted crawl continues. Cleared to
    /// signal completion or an unrecoverable stop.
    pub next_expected_chapter_url: Option<String>,
    pub chapters: Vec<ChapterRecord>,
}

impl ProgressLedger {
    /// Fill the once-only metadata fields, preserving any value already set
    /// (e.g. human-curated or from an earlier overview fetch).
    pub fn seed_once(
        &mut self,
        overview_url: Option<&str>,
        story_title: Option<&str>,
        author_name: Option<&str>,
    ) {
        if self.overview_url.is_none() {
            self.overview_url = overview_url.map(String::from);
        }
        if self.story_title.is_none() {
            self.story_title = story_title.map(String::from);
        }
        if self.author_name.is_none() {
            self.author_name = author_name.map(String::from);
        }
    }

    /// Look up an already-downloaded chapter by its fetch URL.
    pub fn find_chapter(&self, url: &str) -> Option<&ChapterRecord> {
        self.chapters.iter().find(|c| c.url == url)
    }

    /// True when the last recorded chapter had no next link, i.e. the story
    /// was archived to its natural end on a previous run.
    pub fn is_complete(&self) -> bool {
        self.next_expected_chapter_url.is_none()
            && self
                .chapters
                .last()
                .map(|c| c.next_url_from_page.is_none())
                .unwrap_or(false)
    }
}

/// Structured result of extracting one chapter page. Produced fresh per
/// fetch; never cached or persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: String,
    /// Outer HTML of the main content container, or an explanatory
    /// placeholder fragment when no container matched.
    pub content_html: String,
    pub next_url: Option<String>,
}

/// Metadata bundle seeded from a story overview (table-of-contents) page.
#[derive(Debug, Clone)]
pub struct StoryMetadata {
    pub overview_url: String,
    pub story_title: String,
    pub author_name: String,
    /// Filesystem-safe identifier for output/metadata folder names.
    pub story_slug: String,
    pub first_chapter_url: String,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
    pub tags: Vec<String>,
    pub story_id: Option<String>,
}
