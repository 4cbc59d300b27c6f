use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ConfigError, FetchError};
use crate::retry::Backoff;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// A fetched page and the URL it was finally served from.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub html: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Retrieves target pages over one shared connection pool.
pub struct FetchClient {
    client: reqwest::Client,
    backoff: Backoff,
}

impl FetchClient {
    pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            client,
            backoff: Backoff::default(),
        })
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let resp = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await
            .map_err(classify)?;

        let status = resp.status();
        if status.as_u16() >= 300 {
            return Err(FetchError::Terminal(format!("HTTP {status}")));
        }

        let final_url = resp.url().to_string();
        let html = resp.text().await.map_err(classify)?;
        Ok(FetchedPage { final_url, html })
    }
}

#[async_trait]
impl PageFetcher for FetchClient {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.backoff
            .retry(&format!("fetch {url}"), || self.fetch_once(url))
            .await
    }
}

/// Transport problems are transient; malformed requests are not.
fn classify(e: reqwest::Error) -> FetchError {
    if e.is_builder() || e.is_redirect() {
        FetchError::Terminal(e.to_string())
    } else {
        FetchError::Transient(e.to_string())
    }
}
