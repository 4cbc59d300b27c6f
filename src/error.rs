use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors surfaced by the read API.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = axum::Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

/// Problems that abort a run before any network activity.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Failure of a single search page request.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Search provider returned {0}")]
    Status(u16),

    #[error("Malformed search response: {0}")]
    Body(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Timeouts, resets, DNS failures; worth another attempt.
    #[error("Transient fetch failure: {0}")]
    Transient(String),

    /// The resource is gone, redirected away or otherwise not scrapeable.
    #[error("Terminal fetch failure: {0}")]
    Terminal(String),
}

/// A candidate record that failed construction-time validation.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ExtractError {
    #[error("Invalid source URL '{0}'")]
    InvalidUrl(String),

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record rejected: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Whether an error is worth retrying with backoff.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for SearchError {
    // Every failure mode of a search page is treated as transient.
    fn is_transient(&self) -> bool {
        true
    }
}

impl Retryable for FetchError {
    fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}
