use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::pipeline_run::PipelineRun;

#[derive(Debug, Deserialize)]
pub struct RunFilters {
    pub limit: Option<i64>,
}

/// GET /api/v1/runs
pub async fn list(
    State(pool): State<PgPool>,
    Query(filters): Query<RunFilters>,
) -> Result<Json<Vec<PipelineRun>>, AppError> {
    let runs = PipelineRun::recent(&pool, filters.limit.unwrap_or(20).clamp(1, 100)).await?;
    Ok(Json(runs))
}
