use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;

use crate::ats::AtsCatalog;
use crate::discovery::DiscoveryClient;
use crate::extract::{RawJob, extract_page};
use crate::fetch::PageFetcher;
use crate::models::job::NormalizedJob;
use crate::store::{JobStore, SyncSummary, sync};

/// Cooperative stop signal shared by the fan-out phases.
#[derive(Debug, Clone)]
pub struct Shutdown(watch::Receiver<bool>);

impl Shutdown {
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self(rx))
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (tx, shutdown) = Self::new();
        // Dropping the sender leaves the value at false forever.
        drop(tx);
        shutdown
    }

    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the signal fires; pends forever if it never can.
    pub async fn triggered(&mut self) {
        if self.0.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// End-of-run counts reported to the operator.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub discovered: usize,
    pub unmatched: usize,
    pub fetched: usize,
    pub fetch_failed: usize,
    pub extracted: usize,
    pub inserted: usize,
    pub updated: usize,
    pub errors: usize,
    pub cancelled: bool,
}

impl RunSummary {
    fn absorb(&mut self, synced: SyncSummary) {
        self.inserted = synced.inserted;
        self.updated = synced.updated;
        self.errors = synced.errors;
    }
}

enum UrlOutcome {
    Unmatched,
    FetchFailed,
    Fetched(Option<RawJob>),
}

/// Discovery -> concurrent fetch + extract -> serialized sync.
pub struct Pipeline {
    keywords: Vec<String>,
    discovery: DiscoveryClient,
    catalog: AtsCatalog,
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn JobStore>,
    concurrency: usize,
}

impl Pipeline {
    pub fn new(
        keywords: Vec<String>,
        discovery: DiscoveryClient,
        catalog: AtsCatalog,
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn JobStore>,
        concurrency: usize,
    ) -> Self {
        Self {
            keywords,
            discovery,
            catalog,
            fetcher,
            store,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(&self, shutdown: &Shutdown) -> RunSummary {
        let mut summary = RunSummary::default();

        let urls = self.discovery.discover(&self.keywords, shutdown).await;
        summary.discovered = urls.len();

        let records = if shutdown.is_triggered() {
            Vec::new()
        } else {
            self.extract_all(urls, shutdown, &mut summary).await
        };
        summary.extracted = records.len();
        tracing::info!(
            "Extraction complete: {} fetched, {} failed, {} unmatched, {} records",
            summary.fetched,
            summary.fetch_failed,
            summary.unmatched,
            summary.extracted
        );

        let normalized: Vec<NormalizedJob> = dedupe_by_link(records.iter().map(NormalizedJob::from));
        summary.absorb(sync(self.store.as_ref(), &normalized).await);
        summary.cancelled = shutdown.is_triggered();

        tracing::info!(
            "Run summary: discovered={} fetched={} extracted={} inserted={} updated={} errors={}{}",
            summary.discovered,
            summary.fetched,
            summary.extracted,
            summary.inserted,
            summary.updated,
            summary.errors,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
        summary
    }

    async fn extract_all(
        &self,
        urls: HashSet<String>,
        shutdown: &Shutdown,
        summary: &mut RunSummary,
    ) -> Vec<RawJob> {
        let mut tasks = futures::stream::iter(urls)
            .map(|url| async move { self.process_url(&url).await })
            .buffer_unordered(self.concurrency);

        let mut records = Vec::new();
        let mut shutdown = shutdown.clone();
        loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    tracing::warn!("Extraction interrupted, keeping {} settled records", records.len());
                    break;
                }
                next = tasks.next() => match next {
                    Some(UrlOutcome::Unmatched) => summary.unmatched += 1,
                    Some(UrlOutcome::FetchFailed) => summary.fetch_failed += 1,
                    Some(UrlOutcome::Fetched(record)) => {
                        summary.fetched += 1;
                        records.extend(record);
                    }
                    None => break,
                },
            }
        }
        records
    }

    async fn process_url(&self, url: &str) -> UrlOutcome {
        let page = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Fetch failed for {url}: {e}");
                return UrlOutcome::FetchFailed;
            }
        };

        // Search hits may redirect onto (or away from) an ATS host.
        let Some(ats) = self.catalog.match_url(&page.final_url) else {
            tracing::debug!("Skipping {url}: no ATS match for {}", page.final_url);
            return UrlOutcome::Unmatched;
        };

        let extraction = extract_page(&page.html, &page.final_url, ats);
        match &extraction.record {
            Some(record) => tracing::debug!(
                "Extracted '{}' from {url} via {} ({:?})",
                record.title(),
                record.ats_platform(),
                extraction.trail.last()
            ),
            None => tracing::debug!("No record from {url} (states: {:?})", extraction.trail),
        }
        UrlOutcome::Fetched(extraction.record)
    }
}

/// Redirects can map distinct discovered URLs onto one posting; keep the last.
fn dedupe_by_link(jobs: impl Iterator<Item = NormalizedJob>) -> Vec<NormalizedJob> {
    let mut out: Vec<NormalizedJob> = Vec::new();
    for job in jobs {
        match out.iter_mut().find(|existing| existing.link == job.link) {
            Some(existing) => *existing = job,
            None => out.push(job),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::ats::{AtsConfig, FieldSelectors, ParsingStrategy};
    use crate::discovery::{DiscoverySettings, SearchHit, SearchProvider, SearchRequest};
    use crate::error::{FetchError, SearchError};
    use crate::fetch::FetchedPage;
    use crate::retry::Backoff;
    use crate::store::memory::MemoryJobStore;

    struct FixedSearch(Vec<&'static str>);

    #[async_trait]
    impl SearchProvider for FixedSearch {
        async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, SearchError> {
            if request.page > 1 {
                return Ok(Vec::new());
            }
            Ok(self
                .0
                .iter()
                .map(|link| SearchHit {
                    link: link.to_string(),
                    title: String::new(),
                    snippet: String::new(),
                    date: None,
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeFetcher {
        pages: HashMap<&'static str, Result<&'static str, u16>>,
        redirects: HashMap<&'static str, &'static str>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            let final_url = self.redirects.get(url).copied().unwrap_or(url);
            match self.pages.get(final_url) {
                Some(Ok(html)) => Ok(FetchedPage {
                    final_url: final_url.to_string(),
                    html: html.to_string(),
                }),
                Some(Err(status)) => Err(FetchError::Terminal(format!("HTTP {status}"))),
                None => Err(FetchError::Transient("connection reset".to_string())),
            }
        }
    }

    fn catalog() -> AtsCatalog {
        AtsCatalog::new(vec![
            AtsConfig {
                name: "lever".to_string(),
                domain: "jobs.lever.co".to_string(),
                parsing_strategy: ParsingStrategy::StructuredMetadata,
                selectors: FieldSelectors {
                    title: Some("h2".to_string()),
                    description: Some(".content".to_string()),
                    ..FieldSelectors::default()
                },
            },
            AtsConfig {
                name: "greenhouse".to_string(),
                domain: "job-boards.greenhouse.io".to_string(),
                parsing_strategy: ParsingStrategy::EmbeddedState,
                selectors: FieldSelectors::default(),
            },
        ])
    }

    fn discovery(links: Vec<&'static str>) -> DiscoveryClient {
        DiscoveryClient::new(
            Arc::new(FixedSearch(links)),
            DiscoverySettings {
                remote_terms: vec!["remote".to_string()],
                excluded_terms: vec![],
                domains: vec!["jobs.lever.co".to_string()],
                results_per_page: 20,
                time_window: None,
                location: None,
                max_pages: None,
            },
        )
        .with_backoff(Backoff {
            max_attempts: 1,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(1),
        })
    }

    const LEVER_JSON_LD: &str = r#"<html><head><script type="application/ld+json">
        {"@type": "JobPosting", "title": "Backend Engineer", "description": "<p>APIs</p>",
         "hiringOrganization": {"name": "Acme"}, "datePosted": "2025-07-12"}
    </script></head><body></body></html>"#;

    const LEVER_SELECTORS: &str =
        r#"<html><body><h2>Frontend Engineer</h2><div class="content">React</div></body></html>"#;

    const GREENHOUSE_STATE: &str = r#"<html><body><script>window.__remixContext = {"state":{"loaderData":{"routes/job":{"jobPost":{"title":"Data Engineer","content":"&lt;p&gt;SQL&lt;/p&gt;","company_name":"Initech"}}}}};</script></body></html>"#;

    const UNSUPPORTED: &str = "<html><body><p>Apply via email</p></body></html>";

    #[tokio::test]
    async fn end_to_end_counts_and_persists() {
        let urls = vec![
            "https://jobs.lever.co/acme/1",
            "https://jobs.lever.co/acme/2",
            "https://jobs.lever.co/acme/3",
            "https://jobs.lever.co/acme/404",
            "https://job-boards.greenhouse.io/initech/jobs/7",
            "https://example.com/careers/1",
        ];
        let mut fetcher = FakeFetcher::default();
        fetcher.pages.insert("https://jobs.lever.co/acme/1", Ok(LEVER_JSON_LD));
        fetcher.pages.insert("https://jobs.lever.co/acme/2", Ok(LEVER_SELECTORS));
        fetcher.pages.insert("https://jobs.lever.co/acme/3", Ok(UNSUPPORTED));
        fetcher.pages.insert("https://jobs.lever.co/acme/404", Err(404));
        fetcher
            .pages
            .insert("https://job-boards.greenhouse.io/initech/jobs/7", Ok(GREENHOUSE_STATE));
        fetcher.pages.insert("https://example.com/careers/1", Ok(LEVER_JSON_LD));
        let fetcher = Arc::new(fetcher);
        let store = Arc::new(MemoryJobStore::default());

        let pipeline = Pipeline::new(
            vec!["Engineer".to_string(), "Developer".to_string()],
            discovery(urls),
            catalog(),
            fetcher.clone(),
            store.clone(),
            4,
        );
        let summary = pipeline.run(&Shutdown::never()).await;

        assert_eq!(
            summary,
            RunSummary {
                discovered: 6,
                unmatched: 1,
                fetched: 4,
                fetch_failed: 1,
                extracted: 3,
                inserted: 3,
                updated: 0,
                errors: 0,
                cancelled: false,
            }
        );

        assert_eq!(fetcher.requested.lock().unwrap().len(), 6);
        assert!(store.get("https://example.com/careers/1").is_none());

        let lever = store.get("https://jobs.lever.co/acme/1").unwrap();
        assert_eq!(lever.company_name.as_deref(), Some("Acme"));
        assert_eq!(lever.description, "APIs");
        assert_eq!(lever.date_posted, chrono::NaiveDate::from_ymd_opt(2025, 7, 12));

        let selectors = store.get("https://jobs.lever.co/acme/2").unwrap();
        assert_eq!(selectors.title, "Frontend Engineer");

        let greenhouse = store
            .get("https://job-boards.greenhouse.io/initech/jobs/7")
            .unwrap();
        assert_eq!(greenhouse.description, "SQL");
        assert!(store.get("https://jobs.lever.co/acme/3").is_none());
    }

    #[tokio::test]
    async fn matches_ats_on_the_redirect_target() {
        let mut fetcher = FakeFetcher::default();
        fetcher
            .redirects
            .insert("https://go.example.net/r/abc", "https://jobs.lever.co/acme/1");
        fetcher.pages.insert("https://jobs.lever.co/acme/1", Ok(LEVER_JSON_LD));
        let store = Arc::new(MemoryJobStore::default());

        let pipeline = Pipeline::new(
            vec!["Engineer".to_string()],
            discovery(vec!["https://go.example.net/r/abc"]),
            catalog(),
            Arc::new(fetcher),
            store.clone(),
            2,
        );
        let summary = pipeline.run(&Shutdown::never()).await;

        assert_eq!((summary.unmatched, summary.fetched, summary.inserted), (0, 1, 1));
        let job = store.get("https://jobs.lever.co/acme/1").unwrap();
        assert_eq!(job.title, "Backend Engineer");
    }

    #[tokio::test]
    async fn second_run_updates_instead_of_inserting() {
        let mut fetcher = FakeFetcher::default();
        fetcher.pages.insert("https://jobs.lever.co/acme/1", Ok(LEVER_JSON_LD));
        let fetcher = Arc::new(fetcher);
        let store = Arc::new(MemoryJobStore::default());

        let pipeline = Pipeline::new(
            vec!["Engineer".to_string()],
            discovery(vec!["https://jobs.lever.co/acme/1"]),
            catalog(),
            fetcher,
            store.clone(),
            2,
        );
        let first = pipeline.run(&Shutdown::never()).await;
        let second = pipeline.run(&Shutdown::never()).await;

        assert_eq!((first.inserted, first.updated), (1, 0));
        assert_eq!((second.inserted, second.updated), (0, 1));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_extraction_still_syncs_nothing_and_reports() {
        let (tx, shutdown) = Shutdown::new();
        tx.send(true).unwrap();

        let fetcher = Arc::new(FakeFetcher::default());
        let pipeline = Pipeline::new(
            vec!["Engineer".to_string()],
            discovery(vec!["https://jobs.lever.co/acme/1"]),
            catalog(),
            fetcher.clone(),
            Arc::new(MemoryJobStore::default()),
            2,
        );
        let summary = pipeline.run(&shutdown).await;

        assert!(summary.cancelled);
        assert_eq!(summary.extracted, 0);
        assert!(fetcher.requested.lock().unwrap().is_empty());
    }

    #[test]
    fn dedupe_keeps_last_record_per_link() {
        let job = |link: &str, title: &str| NormalizedJob {
            title: title.to_string(),
            link: link.to_string(),
            company_name: None,
            location: None,
            description: "d".to_string(),
            employment_type: None,
            date_posted: None,
        };
        let out = dedupe_by_link(
            vec![job("https://a/1", "first"), job("https://a/2", "x"), job("https://a/1", "second")]
                .into_iter(),
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "second");
    }

    #[tokio::test]
    async fn shutdown_never_does_not_fire() {
        let mut shutdown = Shutdown::never();
        assert!(!shutdown.is_triggered());
        let fired = tokio::time::timeout(Duration::from_millis(20), shutdown.triggered()).await;
        assert!(fired.is_err());
    }
}
