mod ats;
mod config;
mod db;
mod discovery;
mod error;
mod extract;
mod fetch;
mod models;
mod normalize;
mod pipeline;
mod retry;
mod routes;
mod store;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use clap::Parser;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::{Command, Config, HarvestConfig, RunArgs};
use crate::discovery::{DiscoveryClient, DiscoverySettings, SerperClient};
use crate::fetch::FetchClient;
use crate::models::pipeline_run::PipelineRun;
use crate::pipeline::{Pipeline, Shutdown};
use crate::store::PgJobStore;

const PAGE_TIMEOUT: Duration = Duration::from_secs(15);

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(pool: PgPool) -> impl IntoResponse {
    let result: Result<(i32,), _> = sqlx::query_as("SELECT 1").fetch_one(&pool).await;
    match result {
        Ok(_) => (StatusCode::OK, "ready"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("jobharvest=info,tower_http=info")),
        )
        .init();

    let config = Config::parse();

    match config.resolved_command() {
        Command::Serve { listen_addr } => serve(&config, &listen_addr).await,
        Command::Run(args) => run(&config, &args).await,
    }
}

async fn serve(config: &Config, listen_addr: &str) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url, 5).await?;
    migrate(config, &pool).await?;

    let readyz_pool = pool.clone();
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(move || readyz(readyz_pool.clone())))
        .merge(routes::api::router(pool))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("Listening on {listen_addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn run(config: &Config, args: &RunArgs) -> anyhow::Result<()> {
    // Everything that can be misconfigured is checked before any network use.
    let harvest = HarvestConfig::load(&args.config_path)?;
    let search = SerperClient::new(args.serper_api_key.clone())?;
    let fetcher = FetchClient::new(PAGE_TIMEOUT)?;
    tracing::info!(
        "Loaded {} keywords and {} ATS platforms from {}",
        harvest.keywords.len(),
        harvest.ats.entries().len(),
        args.config_path.display()
    );

    // The sync phase writes through a single connection.
    let pool = db::create_pool(&config.database_url, 1).await?;
    migrate(config, &pool).await?;

    let discovery = DiscoveryClient::new(
        Arc::new(search),
        DiscoverySettings {
            remote_terms: harvest.remote_terms.clone(),
            excluded_terms: harvest.excluded_terms.clone(),
            domains: harvest.ats.domains().into_iter().map(String::from).collect(),
            results_per_page: args.results_per_page,
            time_window: Some(args.time_window.clone()).filter(|w| !w.is_empty()),
            location: harvest.location.clone(),
            max_pages: Some(args.max_pages).filter(|&n| n > 0),
        },
    );

    let pipeline = Pipeline::new(
        harvest.keywords.clone(),
        discovery,
        harvest.ats.clone(),
        Arc::new(fetcher),
        Arc::new(PgJobStore::new(pool.clone())),
        args.concurrency,
    );

    let shutdown = install_shutdown(args.max_runtime);

    let run = match PipelineRun::start(&pool).await {
        Ok(run) => Some(run),
        Err(e) => {
            tracing::warn!("Failed to record run start: {e}");
            None
        }
    };

    let summary = pipeline.run(&shutdown).await;

    if let Some(run) = run
        && let Err(e) = PipelineRun::finish(&pool, run.id, &summary).await
    {
        tracing::warn!("Failed to record run {}: {e}", run.id);
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn migrate(config: &Config, pool: &PgPool) -> anyhow::Result<()> {
    if config.run_migrations {
        tracing::info!("Running database migrations...");
        db::run_migrations(pool).await?;
        tracing::info!("Migrations complete");
    }
    Ok(())
}

/// Ctrl-C or the optional wall-clock guard stop the fan-out phases.
fn install_shutdown(max_runtime: Option<u64>) -> Shutdown {
    let (tx, shutdown) = Shutdown::new();
    let tx = Arc::new(tx);

    let on_signal = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, finishing with settled results");
            let _ = on_signal.send(true);
        }
    });

    if let Some(secs) = max_runtime {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            tracing::warn!("Run exceeded {secs}s, finishing with settled results");
            let _ = tx.send(true);
        });
    }

    shutdown
}
