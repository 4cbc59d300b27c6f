use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::ats::{AtsCatalog, AtsConfig};
use crate::error::ConfigError;

#[derive(Parser, Debug, Clone)]
#[command(name = "jobharvest", about = "ATS job posting discovery and sync")]
pub struct Config {
    /// Database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Run database migrations on startup
    #[arg(long, env = "RUN_MIGRATIONS", default_value = "true")]
    pub run_migrations: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the read API over stored jobs (default when no subcommand given)
    Serve {
        /// Listen address
        #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
        listen_addr: String,
    },
    /// Run one discovery -> extraction -> sync pass
    Run(RunArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Search provider API key
    #[arg(long, env = "SERPER_API_KEY", hide_env_values = true)]
    pub serper_api_key: String,

    /// Harvest file with keywords, search terms and ATS definitions
    #[arg(long = "config", env = "HARVEST_CONFIG", default_value = "config/harvest.json")]
    pub config_path: PathBuf,

    /// Safety cap on result pages requested per keyword
    #[arg(long, env = "MAX_PAGES", default_value = "10")]
    pub max_pages: u32,

    /// Results requested per search page
    #[arg(long, default_value = "20")]
    pub results_per_page: u32,

    /// Provider time-window filter (qdr:d, qdr:w, qdr:m)
    #[arg(long, default_value = "qdr:w")]
    pub time_window: String,

    /// Maximum page fetches in flight
    #[arg(long, env = "FETCH_CONCURRENCY", default_value = "16")]
    pub concurrency: usize,

    /// Overall wall-clock guard in seconds
    #[arg(long, env = "MAX_RUNTIME")]
    pub max_runtime: Option<u64>,
}

impl Config {
    /// Resolve the command, defaulting to Serve if none specified.
    pub fn resolved_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve {
            listen_addr: std::env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }
}

/// Immutable per-run configuration loaded from the harvest file.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub keywords: Vec<String>,
    pub remote_terms: Vec<String>,
    pub excluded_terms: Vec<String>,
    /// Geographic bias passed to the search provider.
    pub location: Option<String>,
    pub ats: AtsCatalog,
}

#[derive(Debug, Deserialize)]
struct HarvestFile {
    keywords: Vec<String>,
    #[serde(default)]
    remote_terms: Vec<String>,
    #[serde(default)]
    excluded_terms: Vec<String>,
    #[serde(default)]
    location: Option<String>,
    ats: BTreeMap<String, serde_json::Value>,
}

impl HarvestConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let file: HarvestFile = serde_json::from_str(raw)?;

        let keywords: Vec<String> = clean_terms(file.keywords);
        if keywords.is_empty() {
            return Err(ConfigError::Invalid("no job-title keywords configured".to_string()));
        }

        let mut entries = Vec::with_capacity(file.ats.len());
        for (name, value) in file.ats {
            match serde_json::from_value::<AtsConfig>(value) {
                Ok(mut entry) => {
                    entry.name = name.clone();
                    match entry.validate() {
                        Ok(()) => entries.push(entry),
                        Err(reason) => {
                            tracing::warn!("Excluding ATS '{name}': {reason}");
                        }
                    }
                }
                Err(e) => tracing::warn!("Excluding malformed ATS entry '{name}': {e}"),
            }
        }

        if entries.is_empty() {
            return Err(ConfigError::Invalid("no usable ATS entries configured".to_string()));
        }

        Ok(Self {
            keywords,
            remote_terms: clean_terms(file.remote_terms),
            excluded_terms: clean_terms(file.excluded_terms),
            location: file
                .location
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty()),
            ats: AtsCatalog::new(entries),
        })
    }
}

fn clean_terms(terms: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(terms.len());
    for term in terms {
        let term = term.trim();
        if !term.is_empty() && !out.iter().any(|t| t == term) {
            out.push(term.to_string());
        }
    }
    out
}
