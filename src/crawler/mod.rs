//! Crawl orchestrator: walks the chapter-to-chapter link chain, persists
//! every chapter, and checkpoints the ledger so any interruption resumes
//! from the most recent chapter.
//!
//! Every per-chapter failure ends in an explicit outcome and a ledger save;
//! nothing escapes the crawl loop as an unhandled error.

mod client;
pub mod error;

pub use client::{Fetch, HttpFetcher, HttpFetcherBuilder, RawPage};
pub use error::{CrawlError, FetchError};

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::extract::{self, UNKNOWN_TITLE};
use crate::ledger::{self, LEDGER_FILE_NAME};
use crate::model::{ChapterRecord, StoryMetadata};

/// Sanitized title segment length limit in chapter filenames.
const MAX_TITLE_SEGMENT_CHARS: usize = 100;

/// Once-only metadata used to seed a new ledger, typically from an overview
/// page. Fields already present in the ledger are never overwritten.
#[derive(Debug, Clone, Default)]
pub struct StorySeed {
    pub overview_url: Option<String>,
    pub story_title: Option<String>,
    pub author_name: Option<String>,
    pub story_slug: Option<String>,
}

impl From<&StoryMetadata> for StorySeed {
    fn from(meta: &StoryMetadata) -> Self {
        Self {
            overview_url: Some(meta.overview_url.clone()),
            story_title: Some(meta.story_title.clone()),
            author_name: Some(meta.author_name.clone()),
            story_slug: Some(meta.story_slug.clone()),
        }
    }
}

/// Why a crawl stopped short of the natural end of the story.
#[derive(Debug)]
pub enum StopReason {
    /// Transport failure; the checkpoint points at the failing chapter.
    FetchFailed { url: String, source: FetchError },
    /// The response was not an HTML page. Structural, not transient: the
    /// resume cursor is cleared.
    NonHtmlContent { url: String, content_type: String },
    /// Chapter file could not be written; the checkpoint points here.
    FileWriteFailed {
        url: String,
        path: PathBuf,
        source: std::io::Error,
    },
    /// A page's next link pointed back at its own resolved URL.
    SelfReferentialNextLink { url: String },
    /// The run revisited a URL it had already advanced through, i.e. the
    /// recorded chain contains a cycle.
    RevisitedUrl { url: String },
}

impl StopReason {
    /// Whether re-running the crawl resumes at the failure point. Loop and
    /// non-HTML stops clear the cursor instead; re-running starts over.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            StopReason::FetchFailed { .. } | StopReason::FileWriteFailed { .. }
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::FetchFailed { source, .. } => write!(f, "{}", source),
            StopReason::NonHtmlContent { url, content_type } => write!(
                f,
                "Content from {} is not HTML (Content-Type: {})",
                url, content_type
            ),
            StopReason::FileWriteFailed { url, path, source } => write!(
                f,
                "Failed to write chapter file {} (from {}): {}",
                path.display(),
                url,
                source
            ),
            StopReason::SelfReferentialNextLink { url } => {
                write!(f, "Next chapter link at {} points back to itself", url)
            }
            StopReason::RevisitedUrl { url } => {
                write!(f, "Already visited {} during this run (link cycle)", url)
            }
        }
    }
}

/// Terminal state of a crawl. Both leave the ledger consistent on disk.
#[derive(Debug)]
pub enum CrawlOutcome {
    /// Natural end of the story; resume cursor cleared.
    Completed,
    /// Stopped early; see [`StopReason::is_resumable`].
    Stopped(StopReason),
}

/// Result of a crawl run. `story_dir` is handed to downstream consumers
/// (content cleaning, packaging); the ledger stays at `ledger_path`.
#[derive(Debug)]
pub struct CrawlReport {
    pub story_dir: PathBuf,
    pub ledger_path: PathBuf,
    /// Chapters fetched and written by this run (skipped duplicates not counted).
    pub new_chapters: u32,
    pub outcome: CrawlOutcome,
}

/// Replace filesystem-hostile characters and newlines with underscores.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '\n' | '\r' => '_',
            other => other,
        })
        .collect();
    let trimmed = replaced.trim();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Story slug from a chapter URL shaped like `/fiction/{id}/{slug}/chapter/...`.
pub fn story_slug_from_chapter_url(url: &str) -> Option<String> {
    let rest = url.split("/fiction/").nth(1)?;
    let mut segments = rest.split('/');
    let _id = segments.next()?;
    let slug = segments.next()?;
    if slug.is_empty() || slug == "chapter" {
        return None;
    }
    Some(sanitize_filename(slug))
}

fn resolve_story_slug(first_chapter_url: &str, seed: Option<&StorySeed>) -> String {
    if let Some(slug) = seed.and_then(|s| s.story_slug.as_deref()) {
        return sanitize_filename(slug);
    }
    if let Some(slug) = story_slug_from_chapter_url(first_chapter_url) {
        return slug;
    }
    if let Some(title) = seed.and_then(|s| s.story_title.as_deref()) {
        return sanitize_filename(title);
    }
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let slug = format!("story_{}", ts);
    log::warn!(
        "Could not determine story slug from {}; using generic folder name {}",
        first_chapter_url,
        slug
    );
    slug
}

/// Display title of a chapter whose page yielded no usable heading. For the
/// first chapter a slug like "my-story" becomes "My Story - Chapter 1".
fn fallback_title(order: u32, slug_seed: Option<&str>) -> String {
    match slug_seed {
        Some(slug) if order == 1 => {
            let words: Vec<String> = slug
                .split(['-', '_', ' '])
                .filter(|w| !w.is_empty())
                .map(|w| {
                    let mut chars = w.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                        None => String::new(),
                    }
                })
                .collect();
            format!("{} - Chapter {}", words.join(" "), order)
        }
        _ => format!("Chapter {}", order),
    }
}

fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Minimal standalone HTML document wrapping an extracted content fragment.
fn chapter_document(title: &str, content_html: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n  <meta charset=\"UTF-8\">\n  <title>{title}</title>\n  <style>\n    body {{ font-family: sans-serif; margin: 20px; line-height: 1.6; }}\n    .chapter-content {{ max-width: 800px; margin: 0 auto; padding: 1em; }}\n    h1 {{ font-size: 1.8em; margin-bottom: 1em; }}\n    p {{ margin-bottom: 1em; }}\n  </style>\n</head>\n<body>\n<h1>{title}</h1>\n{content_html}\n</body>\n</html>"
    )
}

fn is_html_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|c| c.contains("text/html"))
        .unwrap_or(false)
}

/// Crawl a story chapter by chapter, starting fresh from
/// `first_chapter_url` or resuming from the ledger's cursor.
///
/// Chapter files go to `{output_root}/{slug}/`; the ledger lives at
/// `{metadata_root}/{slug}/download_status.json`. The ledger is saved after
/// every chapter and after every terminal condition, so killing the process
/// at any point loses at most the chapter in flight.
pub fn crawl_story(
    fetcher: &mut dyn Fetch,
    first_chapter_url: &str,
    output_root: &Path,
    metadata_root: &Path,
    seed: Option<&StorySeed>,
) -> Result<CrawlReport, CrawlError> {
    let slug = resolve_story_slug(first_chapter_url, seed);
    let story_dir = output_root.join(&slug);
    std::fs::create_dir_all(&story_dir).map_err(|e| CrawlError::CreateOutputDir {
        path: story_dir.clone(),
        source: e,
    })?;
    let ledger_path = metadata_root.join(&slug).join(LEDGER_FILE_NAME);
    log::info!("Ledger path: {}", ledger_path.display());

    let mut ledger = ledger::load(&ledger_path);
    if let Some(seed) = seed {
        ledger.seed_once(
            seed.overview_url.as_deref(),
            seed.story_title.as_deref(),
            seed.author_name.as_deref(),
        );
        ledger::save_or_log(&ledger_path, &ledger);
    }

    let mut current_url = match ledger
        .next_expected_chapter_url
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        Some(cursor) => {
            log::info!("Resuming download from: {}", cursor);
            cursor.to_string()
        }
        None => {
            if ledger.is_complete() {
                // Replaying the recorded chain confirms completion without
                // a single fetch.
                log::info!("Ledger records a completed story; verifying from the start.");
            } else if !ledger.chapters.is_empty() {
                log::warn!(
                    "Ledger has {} chapter(s) but no resume cursor; discarding the stale partial state.",
                    ledger.chapters.len()
                );
                ledger.chapters.clear();
            }
            log::info!("Starting download from: {}", first_chapter_url);
            first_chapter_url.to_string()
        }
    };

    let mut new_chapters = 0u32;
    let mut visited: HashSet<String> = HashSet::new();
    let slug_seed = seed.and_then(|s| s.story_slug.as_deref());

    let finish = |ledger_path: &Path, new_chapters: u32, outcome: CrawlOutcome| CrawlReport {
        story_dir: story_dir.clone(),
        ledger_path: ledger_path.to_path_buf(),
        new_chapters,
        outcome,
    };

    loop {
        if !visited.insert(current_url.clone()) {
            log::warn!(
                "Already visited {} during this run. Stopping to avoid a loop.",
                current_url
            );
            ledger.next_expected_chapter_url = None;
            ledger::save_or_log(&ledger_path, &ledger);
            return Ok(finish(
                &ledger_path,
                new_chapters,
                CrawlOutcome::Stopped(StopReason::RevisitedUrl { url: current_url }),
            ));
        }

        // Duplicate check: advance through already-archived chapters without
        // fetching them again.
        if let Some(existing) = ledger.find_chapter(&current_url) {
            log::info!("Chapter already downloaded: {}. Skipping.", existing.filename);
            match existing.next_url_from_page.clone() {
                Some(next) => {
                    current_url = next;
                    continue;
                }
                None => {
                    log::info!("Last recorded chapter has no next link. Story fully archived.");
                    ledger.next_expected_chapter_url = None;
                    ledger::save_or_log(&ledger_path, &ledger);
                    return Ok(finish(&ledger_path, new_chapters, CrawlOutcome::Completed));
                }
            }
        }

        let order = ledger.chapters.len() as u32 + 1;
        log::info!("Processing chapter {} ({})", order, current_url);

        let page = match fetcher.fetch(&current_url) {
            Ok(page) => page,
            Err(e) => {
                log::error!("Failed to download chapter {}: {}", order, e);
                log::info!("Re-run to resume from this chapter.");
                ledger.next_expected_chapter_url = Some(current_url.clone());
                ledger::save_or_log(&ledger_path, &ledger);
                return Ok(finish(
                    &ledger_path,
                    new_chapters,
                    CrawlOutcome::Stopped(StopReason::FetchFailed {
                        url: current_url,
                        source: e,
                    }),
                ));
            }
        };

        if !is_html_content_type(page.content_type.as_deref()) {
            let content_type = page.content_type.clone().unwrap_or_default();
            log::warn!(
                "Content from {} is not HTML (Content-Type: {}). Stopping.",
                current_url,
                content_type
            );
            ledger.next_expected_chapter_url = None;
            ledger::save_or_log(&ledger_path, &ledger);
            return Ok(finish(
                &ledger_path,
                new_chapters,
                CrawlOutcome::Stopped(StopReason::NonHtmlContent {
                    url: current_url,
                    content_type,
                }),
            ));
        }

        let extracted = extract::extract(&page.body, &current_url);
        let display_title = if extracted.title == UNKNOWN_TITLE {
            fallback_title(order, slug_seed)
        } else {
            extracted.title.clone()
        };
        log::info!("Chapter title: {}", display_title);

        let safe_segment: String = sanitize_filename(&display_title)
            .chars()
            .take(MAX_TITLE_SEGMENT_CHARS)
            .collect();
        let filename = format!("chapter_{:03}_{}.html", order, safe_segment);
        let filepath = story_dir.join(&filename);

        let document = chapter_document(&display_title, &extracted.content_html);
        if let Err(e) = std::fs::write(&filepath, document) {
            log::error!(
                "Failed to save {}: {}. Re-run to resume from this chapter.",
                filepath.display(),
                e
            );
            ledger.next_expected_chapter_url = Some(current_url.clone());
            ledger::save_or_log(&ledger_path, &ledger);
            return Ok(finish(
                &ledger_path,
                new_chapters,
                CrawlOutcome::Stopped(StopReason::FileWriteFailed {
                    url: current_url,
                    path: filepath,
                    source: e,
                }),
            ));
        }
        log::info!("Saved to: {}", filepath.display());

        ledger.chapters.push(ChapterRecord {
            url: current_url.clone(),
            title: extracted.title.clone(),
            filename,
            downloaded_at: now_timestamp(),
            next_url_from_page: extracted.next_url.clone(),
            download_order: order,
        });
        ledger.last_downloaded_url = Some(current_url.clone());
        ledger.next_expected_chapter_url = extracted.next_url.clone();
        ledger::save_or_log(&ledger_path, &ledger);
        new_chapters += 1;

        match extracted.next_url {
            // Compare against the resolved response URL, not the requested
            // one, so redirect-induced self-loops are caught too.
            Some(next) if next == page.resolved_url => {
                log::warn!(
                    "Next chapter URL ({}) is the same as the current page. Stopping to avoid a loop.",
                    next
                );
                ledger.next_expected_chapter_url = None;
                ledger::save_or_log(&ledger_path, &ledger);
                return Ok(finish(
                    &ledger_path,
                    new_chapters,
                    CrawlOutcome::Stopped(StopReason::SelfReferentialNextLink { url: next }),
                ));
            }
            Some(next) => {
                current_url = next;
            }
            None => {
                log::info!("End of story reached (no next chapter link).");
                return Ok(finish(&ledger_path, new_chapters, CrawlOutcome::Completed));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProgressLedger;
    use std::collections::HashMap;

    const C1: &str = "https://example.com/fiction/9/tale/chapter/1/one";
    const C2: &str = "https://example.com/fiction/9/tale/chapter/2/two";
    const C3: &str = "https://example.com/fiction/9/tale/chapter/3/three";

    enum MockResponse {
        Page(RawPage),
        Timeout,
    }

    struct MockFetcher {
        pages: HashMap<String, MockResponse>,
        fetch_log: Vec<String>,
    }

    impl MockFetcher {
        fn new() -> Self {
            Self {
                pages: HashMap::new(),
                fetch_log: Vec::new(),
            }
        }

        fn with_chapter(mut self, url: &str, title: &str, next: Option<&str>) -> Self {
            self.pages.insert(
                url.to_string(),
                MockResponse::Page(RawPage {
                    body: chapter_html(title, next),
                    resolved_url: url.to_string(),
                    content_type: Some("text/html; charset=utf-8".to_string()),
                }),
            );
            self
        }

        fn with_timeout(mut self, url: &str) -> Self {
            self.pages.insert(url.to_string(), MockResponse::Timeout);
            self
        }

        fn with_raw(mut self, url: &str, page: RawPage) -> Self {
            self.pages.insert(url.to_string(), MockResponse::Page(page));
            self
        }
    }

    impl Fetch for MockFetcher {
        fn fetch(&mut self, url: &str) -> Result<RawPage, FetchError> {
            self.fetch_log.push(url.to_string());
            match self.pages.get(url) {
                Some(MockResponse::Page(p)) => Ok(p.clone()),
                Some(MockResponse::Timeout) => Err(FetchError::Timeout {
                    url: url.to_string(),
                    limit_secs: 15,
                }),
                None => Err(FetchError::HttpStatus {
                    status: 404,
                    url: url.to_string(),
                }),
            }
        }
    }

    fn chapter_html(title: &str, next: Option<&str>) -> String {
        let next_link = next
            .map(|n| format!("<link rel=\"next\" href=\"{}\">", n))
            .unwrap_or_default();
        format!(
            "<html><head><title>{title} | Site</title>{next_link}</head>\
             <body><h1>{title}</h1>\
             <div class=\"chapter-content\"><p>Body of {title}.</p></div>\
             </body></html>"
        )
    }

    fn three_chapter_fetcher() -> MockFetcher {
        MockFetcher::new()
            .with_chapter(C1, "One", Some(C2))
            .with_chapter(C2, "Two", Some(C3))
            .with_chapter(C3, "Three", None)
    }

    fn run(
        fetcher: &mut MockFetcher,
        dir: &Path,
    ) -> CrawlReport {
        crawl_story(
            fetcher,
            C1,
            &dir.join("out"),
            &dir.join("meta"),
            None,
        )
        .expect("crawl setup should not fail")
    }

    #[test]
    fn full_run_archives_all_chapters_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = three_chapter_fetcher();
        let report = run(&mut fetcher, dir.path());

        assert!(matches!(report.outcome, CrawlOutcome::Completed));
        assert_eq!(report.new_chapters, 3);
        assert_eq!(fetcher.fetch_log, vec![C1, C2, C3]);

        let ledger = ledger::load(&report.ledger_path);
        assert_eq!(ledger.chapters.len(), 3);
        for (i, ch) in ledger.chapters.iter().enumerate() {
            assert_eq!(ch.download_order as usize, i + 1);
        }
        assert_eq!(ledger.last_downloaded_url.as_deref(), Some(C3));
        assert!(ledger.next_expected_chapter_url.is_none());

        assert!(report.story_dir.join("chapter_001_One.html").exists());
        assert!(report.story_dir.join("chapter_002_Two.html").exists());
        assert!(report.story_dir.join("chapter_003_Three.html").exists());
    }

    #[test]
    fn chapter_files_are_standalone_html_documents() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = three_chapter_fetcher();
        let report = run(&mut fetcher, dir.path());

        let text =
            std::fs::read_to_string(report.story_dir.join("chapter_001_One.html")).unwrap();
        assert!(text.starts_with("<!DOCTYPE html>"));
        assert!(text.contains("<title>One</title>"));
        assert!(text.contains("<h1>One</h1>"));
        assert!(text.contains("Body of One."));
        assert!(text.contains("<style>"));
    }

    #[test]
    fn second_run_performs_zero_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = three_chapter_fetcher();
        let first = run(&mut fetcher, dir.path());
        let ledger_before = std::fs::read_to_string(&first.ledger_path).unwrap();

        let mut fetcher = three_chapter_fetcher();
        let second = run(&mut fetcher, dir.path());

        assert!(matches!(second.outcome, CrawlOutcome::Completed));
        assert_eq!(second.new_chapters, 0);
        assert!(fetcher.fetch_log.is_empty(), "no re-fetching on replay");
        assert_eq!(
            std::fs::read_to_string(&second.ledger_path).unwrap(),
            ledger_before
        );
    }

    #[test]
    fn resumes_from_checkpoint_without_refetching_prefix() {
        let dir = tempfile::tempdir().unwrap();

        // First run fails on chapter 2.
        let mut fetcher = MockFetcher::new()
            .with_chapter(C1, "One", Some(C2))
            .with_timeout(C2);
        let report = run(&mut fetcher, dir.path());
        match &report.outcome {
            CrawlOutcome::Stopped(reason @ StopReason::FetchFailed { url, .. }) => {
                assert_eq!(url, C2);
                assert!(reason.is_resumable());
            }
            other => panic!("expected FetchFailed, got {:?}", other),
        }
        let ledger = ledger::load(&report.ledger_path);
        assert_eq!(ledger.chapters.len(), 1, "chapter 1 stays recorded");
        assert_eq!(ledger.next_expected_chapter_url.as_deref(), Some(C2));

        // Second run fetches only the tail.
        let mut fetcher = three_chapter_fetcher();
        let report = run(&mut fetcher, dir.path());
        assert!(matches!(report.outcome, CrawlOutcome::Completed));
        assert_eq!(fetcher.fetch_log, vec![C2, C3]);

        let ledger = ledger::load(&report.ledger_path);
        assert_eq!(ledger.chapters.len(), 3);
        let urls: HashSet<_> = ledger.chapters.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls.len(), 3, "no duplicate chapter records");
    }

    #[test]
    fn self_referential_next_link_stops_after_one_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = MockFetcher::new().with_chapter(C1, "One", Some(C1));
        let report = run(&mut fetcher, dir.path());

        assert_eq!(fetcher.fetch_log.len(), 1);
        match &report.outcome {
            CrawlOutcome::Stopped(reason @ StopReason::SelfReferentialNextLink { url }) => {
                assert_eq!(url, C1);
                assert!(!reason.is_resumable());
            }
            other => panic!("expected SelfReferentialNextLink, got {:?}", other),
        }
        let ledger = ledger::load(&report.ledger_path);
        assert!(ledger.next_expected_chapter_url.is_none());
        assert_eq!(ledger.chapters.len(), 1, "the page itself is still archived");
    }

    #[test]
    fn redirect_induced_loop_is_detected_against_resolved_url() {
        let dir = tempfile::tempdir().unwrap();
        // Request C1, land on C2 after a redirect; the page links to C2.
        let mut fetcher = MockFetcher::new().with_raw(
            C1,
            RawPage {
                body: chapter_html("One", Some(C2)),
                resolved_url: C2.to_string(),
                content_type: Some("text/html".to_string()),
            },
        );
        let report = run(&mut fetcher, dir.path());
        assert_eq!(fetcher.fetch_log.len(), 1);
        assert!(matches!(
            report.outcome,
            CrawlOutcome::Stopped(StopReason::SelfReferentialNextLink { .. })
        ));
    }

    #[test]
    fn non_html_payload_stops_and_clears_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = MockFetcher::new().with_raw(
            C1,
            RawPage {
                body: String::new(),
                resolved_url: C1.to_string(),
                content_type: Some("image/png".to_string()),
            },
        );
        let report = run(&mut fetcher, dir.path());
        match &report.outcome {
            CrawlOutcome::Stopped(reason @ StopReason::NonHtmlContent { content_type, .. }) => {
                assert_eq!(content_type, "image/png");
                assert!(!reason.is_resumable());
            }
            other => panic!("expected NonHtmlContent, got {:?}", other),
        }
        let ledger = ledger::load(&report.ledger_path);
        assert!(ledger.chapters.is_empty());
        assert!(ledger.next_expected_chapter_url.is_none());
    }

    #[test]
    fn missing_content_type_is_treated_as_non_html() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = MockFetcher::new().with_raw(
            C1,
            RawPage {
                body: chapter_html("One", None),
                resolved_url: C1.to_string(),
                content_type: None,
            },
        );
        let report = run(&mut fetcher, dir.path());
        assert!(matches!(
            report.outcome,
            CrawlOutcome::Stopped(StopReason::NonHtmlContent { .. })
        ));
    }

    #[test]
    fn file_write_failure_checkpoints_current_url() {
        let dir = tempfile::tempdir().unwrap();
        // A directory already occupying the chapter file path makes the
        // write fail.
        std::fs::create_dir_all(
            dir.path()
                .join("out")
                .join("tale")
                .join("chapter_001_One.html"),
        )
        .unwrap();

        let mut fetcher = three_chapter_fetcher();
        let report = run(&mut fetcher, dir.path());
        assert_eq!(fetcher.fetch_log, vec![C1]);
        match &report.outcome {
            CrawlOutcome::Stopped(reason @ StopReason::FileWriteFailed { url, path, .. }) => {
                assert_eq!(url, C1);
                assert!(path.ends_with("chapter_001_One.html"));
                assert!(reason.is_resumable());
            }
            other => panic!("expected FileWriteFailed, got {:?}", other),
        }

        let ledger = ledger::load(&report.ledger_path);
        assert!(ledger.chapters.is_empty(), "failed chapter is not recorded");
        assert_eq!(ledger.next_expected_chapter_url.as_deref(), Some(C1));
    }

    #[test]
    fn cycle_in_recorded_chain_stops_instead_of_spinning() {
        let dir = tempfile::tempdir().unwrap();
        // Hand-build a ledger whose records point at each other.
        let ledger_path = dir
            .path()
            .join("meta")
            .join("tale")
            .join(LEDGER_FILE_NAME);
        let mut bad = ProgressLedger::default();
        for (order, (url, next)) in [(C1, Some(C2)), (C2, Some(C1))].iter().enumerate() {
            bad.chapters.push(ChapterRecord {
                url: url.to_string(),
                title: format!("Chapter {}", order + 1),
                filename: format!("chapter_{:03}_x.html", order + 1),
                downloaded_at: now_timestamp(),
                next_url_from_page: next.map(|n| n.to_string()),
                download_order: order as u32 + 1,
            });
        }
        bad.next_expected_chapter_url = Some(C1.to_string());
        ledger::save(&ledger_path, &bad).unwrap();

        let mut fetcher = three_chapter_fetcher();
        let report = run(&mut fetcher, dir.path());
        assert!(fetcher.fetch_log.is_empty());
        assert!(matches!(
            report.outcome,
            CrawlOutcome::Stopped(StopReason::RevisitedUrl { .. })
        ));
        let ledger = ledger::load(&report.ledger_path);
        assert!(ledger.next_expected_chapter_url.is_none());
    }

    #[test]
    fn stale_partial_ledger_without_cursor_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let ledger_path = dir
            .path()
            .join("meta")
            .join("tale")
            .join(LEDGER_FILE_NAME);
        let mut stale = ProgressLedger::default();
        stale.chapters.push(ChapterRecord {
            url: C1.to_string(),
            title: "One".to_string(),
            filename: "chapter_001_One.html".to_string(),
            downloaded_at: now_timestamp(),
            // Non-null next but no cursor: inconsistent partial state.
            next_url_from_page: Some(C2.to_string()),
            download_order: 1,
        });
        ledger::save(&ledger_path, &stale).unwrap();

        let mut fetcher = three_chapter_fetcher();
        let report = run(&mut fetcher, dir.path());
        assert!(matches!(report.outcome, CrawlOutcome::Completed));
        assert_eq!(fetcher.fetch_log, vec![C1, C2, C3], "stale state discarded");
        let ledger = ledger::load(&report.ledger_path);
        assert_eq!(ledger.chapters.len(), 3);
    }

    #[test]
    fn seed_populates_once_only_ledger_fields() {
        let dir = tempfile::tempdir().unwrap();
        let seed = StorySeed {
            overview_url: Some("https://example.com/fiction/9/tale".to_string()),
            story_title: Some("Tale".to_string()),
            author_name: Some("Author".to_string()),
            story_slug: Some("tale".to_string()),
        };
        let mut fetcher = three_chapter_fetcher();
        let report = crawl_story(
            &mut fetcher,
            C1,
            &dir.path().join("out"),
            &dir.path().join("meta"),
            Some(&seed),
        )
        .unwrap();
        let ledger = ledger::load(&report.ledger_path);
        assert_eq!(ledger.story_title.as_deref(), Some("Tale"));
        assert_eq!(ledger.author_name.as_deref(), Some("Author"));

        // A later run with a different seed does not overwrite.
        let other = StorySeed {
            story_title: Some("Renamed".to_string()),
            story_slug: Some("tale".to_string()),
            ..StorySeed::default()
        };
        let mut fetcher = three_chapter_fetcher();
        let report = crawl_story(
            &mut fetcher,
            C1,
            &dir.path().join("out"),
            &dir.path().join("meta"),
            Some(&other),
        )
        .unwrap();
        let ledger = ledger::load(&report.ledger_path);
        assert_eq!(ledger.story_title.as_deref(), Some("Tale"));
    }

    #[test]
    fn unknown_title_falls_back_to_chapter_number_or_slug() {
        assert_eq!(fallback_title(2, None), "Chapter 2");
        assert_eq!(fallback_title(2, Some("my-story")), "Chapter 2");
        assert_eq!(
            fallback_title(1, Some("my-story")),
            "My Story - Chapter 1"
        );
    }

    #[test]
    fn titleless_page_gets_numbered_filename() {
        let dir = tempfile::tempdir().unwrap();
        let bare = "<html><body><div class=\"chapter-content\"><p>x</p></div></body></html>";
        let mut fetcher = MockFetcher::new().with_raw(
            C1,
            RawPage {
                body: bare.to_string(),
                resolved_url: C1.to_string(),
                content_type: Some("text/html".to_string()),
            },
        );
        let report = run(&mut fetcher, dir.path());
        assert!(report.story_dir.join("chapter_001_Chapter 1.html").exists());
        let ledger = ledger::load(&report.ledger_path);
        // The ledger keeps the raw extracted title, not the display fallback.
        assert_eq!(ledger.chapters[0].title, UNKNOWN_TITLE);
    }

    #[test]
    fn sanitize_filename_replaces_hostile_characters() {
        assert_eq!(sanitize_filename("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_filename("line\nbreak"), "line_break");
        assert_eq!(sanitize_filename("   "), "untitled");
        assert_eq!(sanitize_filename("Plain Title"), "Plain Title");
    }

    #[test]
    fn long_titles_are_truncated_in_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let long_title = "T".repeat(300);
        let mut fetcher = MockFetcher::new().with_chapter(C1, &long_title, None);
        let report = run(&mut fetcher, dir.path());
        let ledger = ledger::load(&report.ledger_path);
        let expected = format!("chapter_001_{}.html", "T".repeat(MAX_TITLE_SEGMENT_CHARS));
        assert_eq!(ledger.chapters[0].filename, expected);
        assert!(report.story_dir.join(&expected).exists());
    }

    #[test]
    fn story_slug_from_chapter_url_cases() {
        assert_eq!(
            story_slug_from_chapter_url(C1).as_deref(),
            Some("tale")
        );
        assert_eq!(
            story_slug_from_chapter_url("https://e/fiction/1/chapter/2/x"),
            None,
            "missing slug segment"
        );
        assert_eq!(story_slug_from_chapter_url("https://e/read/1/2"), None);
    }
}
