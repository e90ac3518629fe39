use std::time::{Duration, Instant};

use anyhow::Result;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use crate::settings::Settings;
use crate::sources::Source;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status(code) => Some(*code),
            FetchError::Transport(e) => e.status().map(|s| s.as_u16()),
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status(code) => *code == 429 || *code >= 500,
            FetchError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        }
    }
}

/// A successfully fetched page plus the response facts kept for diagnostics.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub source: Source,
    pub html: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: usize,
    pub latency_ms: i64,
}

pub struct Fetcher {
    client: reqwest::Client,
    max_retries: u32,
    backoff: Duration,
}

impl Fetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            max_retries: settings.max_retries,
            backoff: Duration::from_millis(settings.backoff_ms),
        })
    }

    /// Fetch with exponential backoff on rate limits, server errors and timeouts.
    pub async fn fetch(&self, source: &Source) -> Result<FetchedPage, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(source).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let backoff = backoff_delay(self.backoff, attempt);
                    warn!(
                        url = %source.url,
                        error = %e,
                        "Fetch failed (attempt {}/{}), backing off {:.1}s",
                        attempt + 1,
                        self.max_retries,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, source: &Source) -> Result<FetchedPage, FetchError> {
        let start = Instant::now();
        let response = self.client.get(&source.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let html = response.text().await?;
        let latency_ms = start.elapsed().as_millis() as i64;

        debug!(url = %source.url, status = status.as_u16(), bytes = html.len(), latency_ms, "Fetched");

        Ok(FetchedPage {
            source: source.clone(),
            bytes: html.len(),
            html,
            final_url,
            status: status.as_u16(),
            content_type,
            latency_ms,
        })
    }
}

/// `base * 2^attempt`, saturating instead of overflowing for large retry counts.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}
