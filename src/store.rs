use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::models::job::NormalizedJob;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Destination of the sync phase. Each call is its own unit of work.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn upsert(&self, job: &NormalizedJob) -> Result<UpsertOutcome, StoreError>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub inserted: usize,
    pub updated: usize,
    pub errors: usize,
}

/// Persist records in the order given; one bad record never blocks the rest.
pub async fn sync(store: &dyn JobStore, records: &[NormalizedJob]) -> SyncSummary {
    let mut summary = SyncSummary::default();

    for job in records {
        if let Err(e) = job.validate() {
            tracing::warn!("Skipping {}: {e}", job.link);
            summary.errors += 1;
            continue;
        }

        match store.upsert(job).await {
            Ok(UpsertOutcome::Inserted) => summary.inserted += 1,
            Ok(UpsertOutcome::Updated) => summary.updated += 1,
            Err(e) => {
                tracing::warn!("Failed to upsert {}: {e}", job.link);
                summary.errors += 1;
            }
        }
    }

    tracing::info!(
        "Sync complete: {} inserted, {} updated, {} errors",
        summary.inserted,
        summary.updated,
        summary.errors
    );
    summary
}

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    /// The existence check only feeds the inserted/updated statistics; the
    /// `ON CONFLICT` clause alone guarantees one row per link.
    async fn upsert(&self, job: &NormalizedJob) -> Result<UpsertOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM jobs WHERE link = $1)")
            .bind(&job.link)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO jobs (title, link, company_name, location, description, employment_type, date_posted)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (link) DO UPDATE SET
                 title = EXCLUDED.title,
                 company_name = EXCLUDED.company_name,
                 location = EXCLUDED.location,
                 description = EXCLUDED.description,
                 employment_type = EXCLUDED.employment_type,
                 date_posted = EXCLUDED.date_posted,
                 updated_at = NOW()",
        )
        .bind(&job.title)
        .bind(&job.link)
        .bind(&job.company_name)
        .bind(&job.location)
        .bind(&job.description)
        .bind(&job.employment_type)
        .bind(job.date_posted)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(if exists {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryJobStore;
    use super::*;

    fn job(link: &str, title: &str) -> NormalizedJob {
        NormalizedJob {
            title: title.to_string(),
            link: link.to_string(),
            company_name: Some("Acme".to_string()),
            location: None,
            description: "Build things".to_string(),
            employment_type: None,
            date_posted: None,
        }
    }

    #[tokio::test]
    async fn same_link_overwrites_instead_of_duplicating() {
        let store = MemoryJobStore::default();
        let link = "https://jobs.lever.co/acme/1";

        let first = sync(&store, &[job(link, "Engineer")]).await;
        let second = sync(&store, &[job(link, "Senior Engineer")]).await;

        assert_eq!(first, SyncSummary { inserted: 1, updated: 0, errors: 0 });
        assert_eq!(second, SyncSummary { inserted: 0, updated: 1, errors: 0 });
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(link).unwrap().title, "Senior Engineer");
    }

    #[tokio::test]
    async fn bad_record_does_not_block_the_batch() {
        let store = MemoryJobStore::default();
        let records = vec![
            job("https://a.example/1", "Engineer"),
            job("https://a.example/2", &"x".repeat(300)),
            job("https://a.example/3", "Designer"),
        ];

        let summary = sync(&store, &records).await;

        assert_eq!(summary, SyncSummary { inserted: 2, updated: 0, errors: 1 });
        assert!(store.get("https://a.example/1").is_some());
        assert!(store.get("https://a.example/2").is_none());
        assert!(store.get("https://a.example/3").is_some());
    }

    #[tokio::test]
    async fn memory_store_rejects_values_postgres_would() {
        use crate::models::job::{MAX_COMPANY_LEN, MAX_EMPLOYMENT_TYPE_LEN};

        let store = MemoryJobStore::default();

        let mut long_company = job("https://a.example/1", "Engineer");
        long_company.company_name = Some("c".repeat(MAX_COMPANY_LEN + 1));
        assert!(matches!(
            store.upsert(&long_company).await,
            Err(StoreError::Validation(_))
        ));

        let mut long_kind = job("https://a.example/2", "Engineer");
        long_kind.employment_type = Some("k".repeat(MAX_EMPLOYMENT_TYPE_LEN + 1));
        assert!(matches!(
            store.upsert(&long_kind).await,
            Err(StoreError::Validation(_))
        ));

        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn store_failures_are_counted() {
        struct FailingStore;

        #[async_trait]
        impl JobStore for FailingStore {
            async fn upsert(&self, _job: &NormalizedJob) -> Result<UpsertOutcome, StoreError> {
                Err(StoreError::Database(sqlx::Error::PoolTimedOut))
            }
        }

        let summary = sync(&FailingStore, &[job("https://a.example/1", "Engineer")]).await;
        assert_eq!(summary, SyncSummary { inserted: 0, updated: 0, errors: 1 });
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn postgres_upsert_is_idempotent() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = crate::db::create_pool(&url, 1).await.unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        let store = PgJobStore::new(pool.clone());

        let link = format!("https://jobs.lever.co/acme/{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default());
        let first = store.upsert(&job(&link, "Engineer")).await.unwrap();
        let second = store.upsert(&job(&link, "Staff Engineer")).await.unwrap();
        assert_eq!(first, UpsertOutcome::Inserted);
        assert_eq!(second, UpsertOutcome::Updated);

        let (count, title): (i64, String) =
            sqlx::query_as("SELECT COUNT(*) OVER (), title FROM jobs WHERE link = $1")
                .bind(&link)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
        assert_eq!(title, "Staff Engineer");
    }
}
