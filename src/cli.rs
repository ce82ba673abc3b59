//! CLI parsing and orchestration. Parses args, seeds from an overview page
//! when given one, runs the crawl, and maps outcomes to exit codes.

use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

use crate::config;
use crate::crawler::{
    crawl_story, CrawlError, CrawlOutcome, HttpFetcher, StorySeed,
};
use crate::overview::fetch_story_metadata;

const DEFAULT_OUTPUT_DIR: &str = "downloaded_stories";
const DEFAULT_METADATA_DIR: &str = "metadata_store";

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Crawl stopped: {message}{resume_hint}", resume_hint = if *.resumable { ". Re-run the same command to resume from the checkpoint." } else { ". The checkpoint was cleared; re-running starts this story over." })]
    Stopped { message: String, resumable: bool },

    #[error("{0}")]
    Crawl(#[from] CrawlError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Stopped { .. } => 2,
            CliRunError::Crawl(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "storyfetch")]
#[command(about = "Archive a chapter-linked story into local HTML files, resumable across runs")]
#[command(
    after_help = "Config file keys (output_dir, metadata_dir, user_agent, timeout_secs, delay_min_ms, delay_max_ms) are read from ./storyfetch.toml or the XDG config dir. CLI flags override config."
)]
pub struct Args {
    /// Story overview (table-of-contents) page URL or a direct chapter URL.
    pub url: String,

    /// Base folder for downloaded chapter files (a per-story subfolder is created).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Base folder for per-story download ledgers.
    #[arg(long)]
    pub metadata_dir: Option<PathBuf>,

    /// Start crawling from this chapter URL instead of the first chapter.
    #[arg(long)]
    pub start_chapter_url: Option<String>,

    /// Override the story slug used for folder names.
    #[arg(long)]
    pub slug: Option<String>,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Request timeout in seconds (overrides config; default 15).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Minimum politeness delay between requests in milliseconds (default 1500).
    #[arg(long)]
    pub delay_min_ms: Option<u64>,

    /// Maximum politeness delay between requests in milliseconds (default 3500).
    #[arg(long)]
    pub delay_max_ms: Option<u64>,

    /// Warnings and errors only.
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug-level output, including every fetch and parse decision.
    #[arg(long)]
    pub verbose: bool,
}

/// Initialize env_logger. RUST_LOG still overrides the flag-derived level.
pub fn init_logging(quiet: bool, verbose: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

/// Overview pages live under /fiction/ without a /chapter/ segment.
fn is_overview_url(url: &str) -> bool {
    !url.contains("/chapter/") && url.contains("/fiction/")
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;

    let output_root = args
        .output
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.output_dir.clone()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    let metadata_root = args
        .metadata_dir
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.metadata_dir.clone()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_METADATA_DIR));

    let mut builder = HttpFetcher::builder();
    if let Some(ua) = args
        .user_agent
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.user_agent.clone()))
    {
        builder = builder.user_agent(ua);
    }
    if let Some(secs) = args
        .timeout
        .or_else(|| config.as_ref().and_then(|c| c.timeout_secs))
    {
        builder = builder.timeout_secs(secs);
    }
    let delay_min = args
        .delay_min_ms
        .or_else(|| config.as_ref().and_then(|c| c.delay_min_ms));
    let delay_max = args
        .delay_max_ms
        .or_else(|| config.as_ref().and_then(|c| c.delay_max_ms));
    if let (Some(min), Some(max)) = (delay_min, delay_max) {
        builder = builder.delay_range_ms(min, max);
    } else if let Some(min) = delay_min {
        builder = builder.delay_range_ms(min, min.max(3500));
    } else if let Some(max) = delay_max {
        builder = builder.delay_range_ms(1500.min(max), max);
    }
    let mut fetcher = builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

    // Seed from the overview page when given one; otherwise the URL itself
    // is the crawl entry point.
    let (entry_url, mut seed) = if is_overview_url(&args.url) {
        log::info!("Story URL detected as overview page. Fetching metadata...");
        let meta = fetch_story_metadata(&mut fetcher, &args.url)?;
        log::info!(
            "Story: {} by {} (slug: {})",
            meta.story_title,
            meta.author_name,
            meta.story_slug
        );
        let entry = args
            .start_chapter_url
            .clone()
            .unwrap_or_else(|| meta.first_chapter_url.clone());
        (entry, StorySeed::from(&meta))
    } else {
        log::info!("Story URL detected as a chapter page.");
        let entry = args.start_chapter_url.clone().unwrap_or_else(|| args.url.clone());
        (entry, StorySeed::default())
    };
    if let Some(slug) = args.slug.clone() {
        seed.story_slug = Some(slug);
    }

    if !entry_url.contains("/chapter/") {
        return Err(CliRunError::InvalidInput(format!(
            "Invalid crawl entry point: '{}'. Must be a chapter URL.",
            entry_url
        )));
    }

    let report = crawl_story(
        &mut fetcher,
        &entry_url,
        &output_root,
        &metadata_root,
        Some(&seed),
    )?;

    match report.outcome {
        CrawlOutcome::Completed => {
            log::info!(
                "Chapter download completed ({} new). Chapters in: {}",
                report.new_chapters,
                report.story_dir.display()
            );
            Ok(())
        }
        CrawlOutcome::Stopped(reason) => Err(CliRunError::Stopped {
            message: reason.to_string(),
            resumable: reason.is_resumable(),
        }),
    }
}
