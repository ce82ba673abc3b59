//! Error types for fetching and crawling. Every fetch failure is typed so
//! the orchestrator can decide between a resumable checkpoint and a hard stop.

use std::path::PathBuf;
use thiserror::Error;

/// Transport-level failure for a single GET. Always terminal for the current
/// run; the orchestrator leaves a resumable checkpoint behind it.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Connection error: could not reach {url}: {source}")]
    Connection { url: String, source: reqwest::Error },

    #[error("Timed out fetching {url} (limit {limit_secs}s)")]
    Timeout { url: String, limit_secs: u64 },

    #[error("Request failed: {url}: {source}")]
    Other { url: String, source: reqwest::Error },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead { url: String, source: reqwest::Error },
}

/// Errors that can escape the crawl entry points. The per-chapter failure
/// modes (fetch, non-HTML payload, file write, loop) never surface here:
/// they end in a saved checkpoint and a [`StopReason`](crate::crawler::StopReason).
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Could not find the first chapter link on overview page: {url}")]
    MissingFirstChapter { url: String },

    #[error("Cannot create output folder {path}: {source}")]
    CreateOutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
}
