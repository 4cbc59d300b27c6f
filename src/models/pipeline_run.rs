use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::pipeline::RunSummary;

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PipelineRun {
    pub id: i32,
    pub status: String,
    pub discovered: Option<i32>,
    pub fetched: Option<i32>,
    pub extracted: Option<i32>,
    pub inserted: Option<i32>,
    pub updated: Option<i32>,
    pub errors: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Record the start of a run.
    pub async fn start(pool: &PgPool) -> Result<PipelineRun, sqlx::Error> {
        sqlx::query_as::<_, PipelineRun>(
            "INSERT INTO pipeline_runs (status) VALUES ('running') RETURNING *",
        )
        .fetch_one(pool)
        .await
    }

    /// Record the final counts of a run.
    pub async fn finish(
        pool: &PgPool,
        id: i32,
        summary: &RunSummary,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE pipeline_runs SET status = $2, discovered = $3, fetched = $4, extracted = $5, inserted = $6, updated = $7, errors = $8, finished_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(if summary.cancelled { "cancelled" } else { "succeeded" })
        .bind(count(summary.discovered))
        .bind(count(summary.fetched))
        .bind(count(summary.extracted))
        .bind(count(summary.inserted))
        .bind(count(summary.updated))
        .bind(count(summary.errors))
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<PipelineRun>, sqlx::Error> {
        sqlx::query_as::<_, PipelineRun>(
            "SELECT * FROM pipeline_runs ORDER BY started_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
