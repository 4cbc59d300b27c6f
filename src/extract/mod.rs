// Page extraction: three strategies tried in a fixed order per platform.

pub mod embedded;
pub mod selectors;
pub mod structured;
pub mod text;

use scraper::Html;
use url::Url;

use crate::ats::{AtsConfig, ParsingStrategy};
use crate::error::ExtractError;
use crate::normalize::LocationRaw;

/// Fields a strategy managed to locate; not yet validated.
#[derive(Debug, Default)]
pub struct JobFields {
    pub title: Option<String>,
    pub company: Option<String>,
    pub description: Option<String>,
    pub location: LocationRaw,
    pub employment_type: Option<String>,
    pub date_posted: Option<String>,
}

/// A validated extraction result. Only constructible through [`RawJob::build`].
#[derive(Debug, Clone)]
pub struct RawJob {
    title: String,
    company: Option<String>,
    description: String,
    source_url: String,
    ats_platform: String,
    location_raw: LocationRaw,
    employment_type: Option<String>,
    date_posted_raw: Option<String>,
}

impl RawJob {
    pub fn build(fields: JobFields, source_url: &str, ats_platform: &str) -> Result<Self, ExtractError> {
        let url = Url::parse(source_url)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .ok_or_else(|| ExtractError::InvalidUrl(source_url.to_string()))?;

        let title = fields
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or(ExtractError::MissingField("title"))?;
        let description = fields
            .description
            .filter(|d| !d.trim().is_empty())
            .ok_or(ExtractError::MissingField("description"))?;

        let company = fields.company.or_else(|| company_from_url(&url));

        Ok(Self {
            title,
            company,
            description,
            source_url: source_url.to_string(),
            ats_platform: ats_platform.to_string(),
            location_raw: fields.location,
            employment_type: fields.employment_type,
            date_posted_raw: fields.date_posted,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn company(&self) -> Option<&str> {
        self.company.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn ats_platform(&self) -> &str {
        &self.ats_platform
    }

    pub fn location_raw(&self) -> &LocationRaw {
        &self.location_raw
    }

    pub fn employment_type(&self) -> Option<&str> {
        self.employment_type.as_deref()
    }

    pub fn date_posted_raw(&self) -> Option<&str> {
        self.date_posted_raw.as_deref()
    }
}

/// States of the per-page extraction state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    StructuredMetadata,
    EmbeddedState,
    SelectorsFallback,
    Failed,
}

impl ExtractionState {
    pub fn entry(strategy: ParsingStrategy) -> Self {
        match strategy {
            ParsingStrategy::StructuredMetadata => ExtractionState::StructuredMetadata,
            ParsingStrategy::EmbeddedState => ExtractionState::EmbeddedState,
            ParsingStrategy::Selectors => ExtractionState::SelectorsFallback,
        }
    }

    /// Where to go when the current strategy yields nothing.
    pub fn next(self) -> Self {
        match self {
            ExtractionState::StructuredMetadata | ExtractionState::EmbeddedState => {
                ExtractionState::SelectorsFallback
            }
            ExtractionState::SelectorsFallback | ExtractionState::Failed => ExtractionState::Failed,
        }
    }
}

#[derive(Debug)]
pub struct Extraction {
    pub record: Option<RawJob>,
    /// Every state visited, in order, ending in the one that produced the
    /// record or in `Failed`.
    pub trail: Vec<ExtractionState>,
}

/// Run the strategy state machine over one fetched page.
pub fn extract_page(html: &str, source_url: &str, ats: &AtsConfig) -> Extraction {
    let document = Html::parse_document(html);
    let mut state = ExtractionState::entry(ats.parsing_strategy);
    let mut trail = vec![state];

    loop {
        let fields = match state {
            ExtractionState::StructuredMetadata => structured::extract(&document),
            ExtractionState::EmbeddedState => embedded::extract(html),
            ExtractionState::SelectorsFallback => selectors::extract(&document, &ats.selectors),
            ExtractionState::Failed => {
                tracing::debug!("No strategy produced a record for {source_url}");
                return Extraction { record: None, trail };
            }
        };

        match fields {
            Some(fields) => {
                return match RawJob::build(fields, source_url, &ats.name) {
                    Ok(record) => Extraction {
                        record: Some(record),
                        trail,
                    },
                    Err(e) => {
                        tracing::warn!("Discarding {source_url}: {e}");
                        trail.push(ExtractionState::Failed);
                        Extraction { record: None, trail }
                    }
                };
            }
            None => {
                state = state.next();
                trail.push(state);
            }
        }
    }
}

/// Derive a company name from the tenant slug in well-known ATS URLs.
fn company_from_url(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let first_segment = url
        .path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|s| !s.is_empty());

    let slug = if host.ends_with(".myworkdayjobs.com") {
        host.split('.').next()
    } else if host == "apply.workable.com" {
        first_segment
    } else if host.ends_with(".workable.com") {
        host.split('.').next()
    } else if host.ends_with("greenhouse.io")
        || host == "jobs.ashbyhq.com"
        || host == "jobs.lever.co"
    {
        first_segment
    } else {
        None
    }?;

    let words: Vec<String> = slug
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ats::FieldSelectors;

    fn ats(strategy: ParsingStrategy, selectors: FieldSelectors) -> AtsConfig {
        AtsConfig {
            name: "test-ats".to_string(),
            domain: "example.com".to_string(),
            parsing_strategy: strategy,
            selectors,
        }
    }

    fn title_body_selectors() -> FieldSelectors {
        FieldSelectors {
            title: Some("h1".to_string()),
            description: Some(".body".to_string()),
            ..FieldSelectors::default()
        }
    }

    const URL: &str = "https://jobs.example.com/acme/123";

    #[test]
    fn structured_metadata_succeeds_without_fallback() {
        let html = r#"<script type="application/ld+json">{"@type":"JobPosting","title":"Engineer","description":"Do things"}</script>"#;
        let out = extract_page(html, URL, &ats(ParsingStrategy::StructuredMetadata, FieldSelectors::default()));
        assert_eq!(out.trail, vec![ExtractionState::StructuredMetadata]);
        let record = out.record.unwrap();
        assert_eq!(record.title(), "Engineer");
        assert_eq!(record.ats_platform(), "test-ats");
    }

    #[test]
    fn missing_metadata_and_selectors_ends_failed() {
        let html = "<html><body><p>Nothing structured here</p></body></html>";
        let out = extract_page(html, URL, &ats(ParsingStrategy::StructuredMetadata, title_body_selectors()));
        assert!(out.record.is_none());
        assert_eq!(
            out.trail,
            vec![
                ExtractionState::StructuredMetadata,
                ExtractionState::SelectorsFallback,
                ExtractionState::Failed
            ]
        );
    }

    #[test]
    fn embedded_state_falls_back_to_selectors() {
        let html = r#"<h1>Platform Engineer</h1><div class="body"><p>Kubernetes</p></div>"#;
        let out = extract_page(html, URL, &ats(ParsingStrategy::EmbeddedState, title_body_selectors()));
        assert_eq!(
            out.trail,
            vec![ExtractionState::EmbeddedState, ExtractionState::SelectorsFallback]
        );
        let record = out.record.unwrap();
        assert_eq!(record.title(), "Platform Engineer");
        assert_eq!(record.description(), "Kubernetes");
    }

    #[test]
    fn selectors_strategy_fails_directly() {
        let out = extract_page("<p>empty</p>", URL, &ats(ParsingStrategy::Selectors, title_body_selectors()));
        assert_eq!(
            out.trail,
            vec![ExtractionState::SelectorsFallback, ExtractionState::Failed]
        );
    }

    #[test]
    fn record_without_description_is_discarded() {
        let html = r#"<script type="application/ld+json">{"@type":"JobPosting","title":"Engineer"}</script>"#;
        let out = extract_page(html, URL, &ats(ParsingStrategy::StructuredMetadata, FieldSelectors::default()));
        assert!(out.record.is_none());
        assert_eq!(out.trail.last(), Some(&ExtractionState::Failed));
    }

    #[test]
    fn build_rejects_bad_urls() {
        let fields = || JobFields {
            title: Some("Engineer".to_string()),
            description: Some("Body".to_string()),
            ..JobFields::default()
        };
        assert_eq!(
            RawJob::build(fields(), "not a url", "x").unwrap_err(),
            ExtractError::InvalidUrl("not a url".to_string())
        );
        assert!(RawJob::build(fields(), "ftp://files.example.com/job", "x").is_err());
        assert!(RawJob::build(fields(), URL, "x").is_ok());
    }

    #[test]
    fn company_falls_back_to_url_slug() {
        let cases = [
            ("https://job-boards.greenhouse.io/acme-corp/jobs/123", Some("Acme Corp")),
            ("https://initech.wd5.myworkdayjobs.com/en-US/careers/job/1", Some("Initech")),
            ("https://apply.workable.com/hooli/j/ABC123/", Some("Hooli")),
            ("https://jobs.lever.co/globex/abc-def", Some("Globex")),
            ("https://jobs.ashbyhq.com/umbrella_co/123/application", Some("Umbrella Co")),
            ("https://careers.example.org/jobs/1", None),
        ];
        for (url, expected) in cases {
            let parsed = Url::parse(url).unwrap();
            assert_eq!(company_from_url(&parsed).as_deref(), expected, "{url}");
        }
    }
}
