//! storyfetch: resumable crawler for chapter-linked web fiction, archiving
//! each chapter as a standalone local HTML file with a per-story ledger.

pub mod cli;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod ledger;
pub mod model;
pub mod overview;

// Re-exports for CLI and consumers.
pub use crawler::{
    crawl_story, sanitize_filename, CrawlError, CrawlOutcome, CrawlReport, Fetch, FetchError,
    HttpFetcher, HttpFetcherBuilder, RawPage, StopReason, StorySeed,
};
pub use extract::extract;
pub use model::{ChapterRecord, ExtractedPage, ProgressLedger, StoryMetadata};
pub use overview::fetch_story_metadata;
