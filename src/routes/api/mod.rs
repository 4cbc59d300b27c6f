pub mod jobs;
pub mod runs;

use axum::Router;
use axum::routing::get;
use sqlx::PgPool;

pub fn router(pool: PgPool) -> Router {
    let api = Router::new()
        .route("/jobs", get(jobs::list))
        .route("/jobs/{id}", get(jobs::get))
        .route("/runs", get(runs::list))
        .with_state(pool);

    Router::new().nest("/api/v1", api)
}
