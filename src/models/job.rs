use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::{AppError, StoreError};
use crate::extract::RawJob;
use crate::normalize::parse_date;

pub const MAX_TITLE_LEN: usize = 255;
pub const MAX_COMPANY_LEN: usize = 255;
pub const MAX_EMPLOYMENT_TYPE_LEN: usize = 50;

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Job {
    pub id: i32,
    pub title: String,
    pub link: String,
    pub company_name: Option<String>,
    pub location: Option<String>,
    pub description: String,
    pub employment_type: Option<String>,
    pub date_posted: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A record ready for persistence; `link` is its natural key.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedJob {
    pub title: String,
    pub link: String,
    pub company_name: Option<String>,
    pub location: Option<String>,
    pub description: String,
    pub employment_type: Option<String>,
    pub date_posted: Option<NaiveDate>,
}

impl From<&RawJob> for NormalizedJob {
    fn from(raw: &RawJob) -> Self {
        Self {
            title: raw.title().to_string(),
            link: raw.source_url().to_string(),
            company_name: raw.company().map(String::from),
            location: raw.location_raw().display(),
            description: raw.description().to_string(),
            employment_type: raw.employment_type().map(String::from),
            date_posted: raw.date_posted_raw().and_then(parse_date),
        }
    }
}

impl NormalizedJob {
    /// Check the column limits the store enforces.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.link.trim().is_empty() {
            return Err(StoreError::Validation("link is empty".to_string()));
        }
        if self.title.trim().is_empty() {
            return Err(StoreError::Validation("title is empty".to_string()));
        }
        if self.description.trim().is_empty() {
            return Err(StoreError::Validation("description is empty".to_string()));
        }
        self.check_column_limits()
    }

    /// The `VARCHAR` limits of the `jobs` table, counted in characters.
    pub fn check_column_limits(&self) -> Result<(), StoreError> {
        check_len("title", Some(&self.title), MAX_TITLE_LEN)?;
        check_len("company_name", self.company_name.as_deref(), MAX_COMPANY_LEN)?;
        check_len(
            "employment_type",
            self.employment_type.as_deref(),
            MAX_EMPLOYMENT_TYPE_LEN,
        )
    }
}

fn check_len(field: &str, value: Option<&str>, max: usize) -> Result<(), StoreError> {
    match value {
        Some(v) if v.chars().count() > max => Err(StoreError::Validation(format!(
            "{field} is {} characters, limit is {max}",
            v.chars().count()
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize)]
pub struct JobFilters {
    pub search: Option<String>,
    pub company: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Job {
    pub async fn list(pool: &PgPool, filters: &JobFilters) -> Result<Vec<Job>, AppError> {
        let per_page = filters.per_page.unwrap_or(50).clamp(1, 100);
        let offset = page_offset(filters.page, per_page);

        let jobs = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE ($1::text IS NULL OR title ILIKE '%' || $1 || '%') AND ($2::text IS NULL OR company_name ILIKE $2) ORDER BY date_posted DESC NULLS LAST, updated_at DESC LIMIT $3 OFFSET $4",
        )
        .bind(&filters.search)
        .bind(&filters.company)
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await?;
        Ok(jobs)
    }

    pub async fn get(pool: &PgPool, id: i32) -> Result<Job, AppError> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))
    }
}

fn page_offset(page: Option<i64>, per_page: i64) -> i64 {
    page.unwrap_or(1)
        .saturating_sub(1)
        .max(0)
        .saturating_mul(per_page)
}
