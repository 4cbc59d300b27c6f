use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SearchError};
use crate::pipeline::Shutdown;
use crate::retry::Backoff;

const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";

#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    #[serde(rename = "q")]
    pub query: String,
    pub page: u32,
    #[serde(rename = "num")]
    pub results: u32,
    #[serde(rename = "tbs", skip_serializing_if = "Option::is_none")]
    pub time_window: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub link: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub date: Option<String>,
}

/// Ranked links for one search page.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, SearchError>;
}

/// Serper.dev search API client.
pub struct SerperClient {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperHit>,
}

#[derive(Debug, Deserialize)]
struct SerperHit {
    link: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    date: Option<String>,
}

impl SerperClient {
    pub fn new(api_key: String) -> Result<Self, ConfigError> {
        Self::with_endpoint(api_key, SERPER_ENDPOINT)
    }

    pub fn with_endpoint(api_key: String, endpoint: &str) -> Result<Self, ConfigError> {
        if api_key.trim().is_empty() {
            return Err(ConfigError::Invalid("search API key is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            api_key,
            endpoint: endpoint.to_string(),
            client,
        })
    }
}

#[async_trait]
impl SearchProvider for SerperClient {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, SearchError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(request)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(SearchError::Status(resp.status().as_u16()));
        }

        let body: SerperResponse = resp
            .json()
            .await
            .map_err(|e| SearchError::Body(e.to_string()))?;

        Ok(body
            .organic
            .into_iter()
            .filter_map(|hit| {
                let link = hit.link.filter(|l| !l.trim().is_empty())?;
                Some(SearchHit {
                    link,
                    title: hit.title,
                    snippet: hit.snippet,
                    date: hit.date,
                })
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub remote_terms: Vec<String>,
    pub excluded_terms: Vec<String>,
    pub domains: Vec<String>,
    pub results_per_page: u32,
    pub time_window: Option<String>,
    pub location: Option<String>,
    /// Safety bound on pages per keyword; pagination otherwise ends on the
    /// first empty page.
    pub max_pages: Option<u32>,
}

/// Turns job-title keywords into candidate posting URLs.
pub struct DiscoveryClient {
    provider: Arc<dyn SearchProvider>,
    settings: DiscoverySettings,
    backoff: Backoff,
}

impl DiscoveryClient {
    pub fn new(provider: Arc<dyn SearchProvider>, settings: DiscoverySettings) -> Self {
        Self {
            provider,
            settings,
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn build_query(&self, keyword: &str) -> String {
        let mut parts = vec![quote(keyword)];

        if !self.settings.remote_terms.is_empty() {
            parts.push(or_group(self.settings.remote_terms.iter().map(|t| quote(t))));
        }
        for term in &self.settings.excluded_terms {
            parts.push(format!("-{}", quote(term)));
        }
        if !self.settings.domains.is_empty() {
            parts.push(or_group(self.settings.domains.iter().map(|d| format!("site:{d}"))));
        }

        parts.join(" ")
    }

    /// Discover every keyword concurrently and union the results. A failed
    /// keyword contributes nothing; on shutdown, settled keywords still count.
    pub async fn discover(&self, keywords: &[String], shutdown: &Shutdown) -> HashSet<String> {
        let mut tasks: FuturesUnordered<_> = keywords
            .iter()
            .map(|keyword| self.discover_keyword(keyword))
            .collect();

        let mut urls = HashSet::new();
        let mut shutdown = shutdown.clone();
        loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    tracing::warn!("Discovery interrupted, keeping {} settled URLs", urls.len());
                    break;
                }
                next = tasks.next() => match next {
                    Some(found) => urls.extend(found),
                    None => break,
                },
            }
        }

        tracing::info!(
            "Discovery complete: {} unique URLs from {} keywords",
            urls.len(),
            keywords.len()
        );
        urls
    }

    async fn discover_keyword(&self, keyword: &str) -> HashSet<String> {
        let query = self.build_query(keyword);
        let mut urls = HashSet::new();
        let mut page = 1;

        loop {
            if let Some(cap) = self.settings.max_pages
                && page > cap
            {
                tracing::debug!("'{keyword}': page cap {cap} reached");
                break;
            }

            let request = SearchRequest {
                query: query.clone(),
                page,
                results: self.settings.results_per_page,
                time_window: self.settings.time_window.clone(),
                location: self.settings.location.clone(),
            };

            let what = format!("search '{keyword}' page {page}");
            let hits = match self
                .backoff
                .retry(&what, || self.provider.search(&request))
                .await
            {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::warn!("Discovery for '{keyword}' failed on page {page}: {e}");
                    return HashSet::new();
                }
            };

            if hits.is_empty() {
                break;
            }
            tracing::debug!("'{keyword}' page {page}: {} results", hits.len());
            for hit in hits {
                tracing::trace!(
                    "  {} | {} | {} | {}",
                    hit.link,
                    hit.title,
                    hit.date.as_deref().unwrap_or("-"),
                    hit.snippet
                );
                urls.insert(hit.link);
            }
            page += 1;
        }

        tracing::info!("'{keyword}': {} URLs", urls.len());
        urls
    }
}

fn quote(term: &str) -> String {
    format!("\"{}\"", term.replace('"', ""))
}

fn or_group(items: impl Iterator<Item = String>) -> String {
    format!("({})", items.collect::<Vec<_>>().join(" OR "))
}
