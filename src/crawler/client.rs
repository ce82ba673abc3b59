//! Blocking HTTP fetcher with a randomized politeness delay between requests.
//!
//! One GET per call, no retry logic: a failed fetch is terminal for the
//! current run and the orchestrator checkpoints and stops.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::crawler::error::FetchError;

/// Browser-like identity to avoid trivial bot blocks.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const DEFAULT_TIMEOUT_SECS: u64 = 15;
/// Politeness delay bounds between consecutive requests.
const DEFAULT_DELAY_MIN_MS: u64 = 1500;
const DEFAULT_DELAY_MAX_MS: u64 = 3500;
const MAX_REDIRECTS: usize = 10;

/// A fetched page: body text, the final URL after redirects, and the
/// declared content type (lowercased), if any.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub body: String,
    pub resolved_url: String,
    pub content_type: Option<String>,
}

/// Seam between the orchestrator and the network. Tests substitute an
/// in-memory implementation; production uses [`HttpFetcher`].
pub trait Fetch {
    fn fetch(&mut self, url: &str) -> Result<RawPage, FetchError>;
}

/// Blocking HTTP fetcher that sleeps a randomized interval between requests.
#[derive(Debug)]
pub struct HttpFetcher {
    inner: reqwest::blocking::Client,
    delay_min: Duration,
    delay_max: Duration,
    timeout_secs: u64,
    last_request: Option<Instant>,
}

impl HttpFetcher {
    /// Build a fetcher with the default User-Agent, timeout, and delay range.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    /// Builder for custom User-Agent, timeout, and/or delay range.
    pub fn builder() -> HttpFetcherBuilder {
        HttpFetcherBuilder::default()
    }

    fn wait_delay(&mut self) {
        if let Some(last) = self.last_request {
            let delay = if self.delay_max > self.delay_min {
                rand::thread_rng().gen_range(self.delay_min..=self.delay_max)
            } else {
                self.delay_min
            };
            let elapsed = last.elapsed();
            if elapsed < delay {
                std::thread::sleep(delay - elapsed);
            }
        }
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&mut self, url: &str) -> Result<RawPage, FetchError> {
        self.wait_delay();
        log::debug!("Fetching: {}", url);
        let response = self.inner.get(url).send().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    limit_secs: self.timeout_secs,
                }
            } else if e.is_connect() {
                FetchError::Connection {
                    url: url.to_string(),
                    source: e,
                }
            } else {
                FetchError::Other {
                    url: url.to_string(),
                    source: e,
                }
            }
        })?;
        self.last_request = Some(Instant::now());

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let resolved_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase());
        let body = response.text().map_err(|e| FetchError::BodyRead {
            url: url.to_string(),
            source: e,
        })?;

        Ok(RawPage {
            body,
            resolved_url,
            content_type,
        })
    }
}

/// Builder for [`HttpFetcher`].
#[derive(Debug)]
pub struct HttpFetcherBuilder {
    user_agent: Option<String>,
    timeout_secs: u64,
    delay_min_ms: u64,
    delay_max_ms: u64,
}

impl Default for HttpFetcherBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            delay_min_ms: DEFAULT_DELAY_MIN_MS,
            delay_max_ms: DEFAULT_DELAY_MAX_MS,
        }
    }
}

impl HttpFetcherBuilder {
    /// Set a custom User-Agent. If not set, a browser-like default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set the per-request timeout in seconds. Default 15.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the politeness delay range in milliseconds. Default 1500-3500.
    /// If max < min, max is raised to min.
    pub fn delay_range_ms(mut self, min: u64, max: u64) -> Self {
        self.delay_min_ms = min;
        self.delay_max_ms = max.max(min);
        self
    }

    /// Build the blocking client and fetcher wrapper.
    pub fn build(self) -> Result<HttpFetcher, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(HttpFetcher {
            inner,
            delay_min: Duration::from_millis(self.delay_min_ms),
            delay_max: Duration::from_millis(self.delay_max_ms),
            timeout_secs: self.timeout_secs,
            last_request: None,
        })
    }
}
