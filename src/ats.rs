use std::sync::Arc;

use serde::Deserialize;

/// How a platform's pages are expected to carry their job data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingStrategy {
    #[serde(alias = "json_ld")]
    StructuredMetadata,
    #[serde(alias = "remix")]
    EmbeddedState,
    #[serde(alias = "css")]
    Selectors,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldSelectors {
    pub title: Option<String>,
    pub description: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AtsConfig {
    #[serde(skip)]
    pub name: String,
    pub domain: String,
    pub parsing_strategy: ParsingStrategy,
    #[serde(default)]
    pub selectors: FieldSelectors,
}

impl AtsConfig {
    /// Reject entries that could never produce a record.
    pub fn validate(&self) -> Result<(), String> {
        if self.domain.trim().is_empty() {
            return Err("empty domain".to_string());
        }
        if self.parsing_strategy == ParsingStrategy::Selectors
            && (self.selectors.title.is_none() || self.selectors.description.is_none())
        {
            return Err("selectors strategy needs title and description selectors".to_string());
        }
        Ok(())
    }
}

/// Read-only set of known ATS platforms, shared across extraction tasks.
#[derive(Debug, Clone)]
pub struct AtsCatalog {
    entries: Arc<[AtsConfig]>,
}

impl AtsCatalog {
    pub fn new(entries: Vec<AtsConfig>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    pub fn entries(&self) -> &[AtsConfig] {
        &self.entries
    }

    /// Domains used to scope search queries, longest first and deduplicated.
    pub fn domains(&self) -> Vec<&str> {
        let mut domains: Vec<&str> = self.entries.iter().map(|e| e.domain.as_str()).collect();
        domains.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        domains.dedup();
        domains
    }

    /// Pick the entry whose domain occurs in `url`, preferring the longest
    /// domain so tenant-scoped hosts win over the vendor's generic host.
    pub fn match_url(&self, url: &str) -> Option<&AtsConfig> {
        self.entries
            .iter()
            .filter(|entry| url.contains(entry.domain.as_str()))
            .max_by_key(|entry| entry.domain.len())
    }
}
