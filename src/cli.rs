//! Command-line entry point (spec §11's `libfed-cli`): loads the YAML
//! registry and environment settings, builds the adapter registry, runs
//! one ISBN search, and prints the unified [`SearchResult`] as JSON.
//!
//! Stands in for the HTTP-server collaborator spec.md describes out of
//! scope for this workspace -- a short-lived process is the idiomatic
//! shape for exercising the coordinator end to end without standing up a
//! full Axum server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use libfed_adapters::AdapterRegistry;
use libfed_cache::{HealthTracker, MetricsCollector, SearchCache};
use libfed_config::{ConfigError, Settings};
use libfed_coordinator::{CoordinatorError, SearchCoordinator};
use libfed_domain::SearchResult;

use crate::exit_codes::ExitCode;
use crate::logging;

/// Federated library-availability search: look up an ISBN across every
/// configured catalog and print a deduplicated, unified result as JSON.
#[derive(Parser, Debug)]
#[command(name = "libfed")]
#[command(about = "Search every configured library catalog for one ISBN and print the unified result")]
pub struct Args {
    /// ISBN-10 or ISBN-13 to search for, with or without hyphens.
    pub isbn: String,

    /// Directory containing one YAML document per library system.
    #[arg(long, env = "LIBFED_REGISTRY_DIR", default_value = "registry")]
    pub registry_dir: PathBuf,

    /// Optional on-disk file to persist the search cache across runs.
    #[arg(long, env = "LIBFED_CACHE_FILE")]
    pub cache_file: Option<PathBuf>,
}

/// Top-level entry point: `main.rs` only maps the returned [`ExitCode`] to
/// `std::process::exit`.
pub async fn run() -> Result<(), ExitCode> {
    logging::init();
    let args = Args::parse();
    run_with_args(args).await
}

async fn run_with_args(args: Args) -> Result<(), ExitCode> {
    let cache_file = args.cache_file.clone();

    match execute(args).await {
        Ok((result, cache)) => {
            let json = serde_json::to_string_pretty(&result).expect("SearchResult always serializes");
            println!("{json}");

            if let Some(path) = &cache_file {
                if let Err(e) = cache.save_to_file(path) {
                    tracing::warn!(error = %e, path = %path.display(), "failed to persist search cache");
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", libfed_redaction::redact_user_string(&format!("{e:#}")));
            Err(classify(&e))
        }
    }
}

/// Does everything `run_with_args` needs except printing, so the error
/// path can be classified in one place rather than at each call site.
async fn execute(args: Args) -> Result<(SearchResult, Arc<SearchCache>)> {
    let registry_dir = Utf8PathBuf::from_path_buf(args.registry_dir)
        .map_err(|path| anyhow::anyhow!("registry directory path is not valid UTF-8: {}", path.display()))?;

    let systems = libfed_config::discover(&registry_dir).context("failed to load library registry")?;
    let settings = Settings::from_env();

    let client = libfed_adapters::http::build_client().context("failed to build HTTP client")?;
    let registry = Arc::new(AdapterRegistry::build(&client, &systems));

    let cache = match &args.cache_file {
        Some(path) => SearchCache::load_from_file(path, settings.cache_ttl()),
        None => SearchCache::new(settings.cache_ttl()),
    };
    let cache = Arc::new(cache);

    let health = Arc::new(HealthTracker::new());
    let metrics = Arc::new(MetricsCollector::new());
    let coordinator = SearchCoordinator::new(registry, Arc::clone(&cache), health, metrics, settings);

    let result = coordinator.search(&args.isbn).await.context("search failed")?;
    Ok((result, cache))
}

/// Maps an error's root cause to an exit code (spec §11: `0` success, `2`
/// invalid ISBN / bad config, `1` other).
fn classify(err: &anyhow::Error) -> ExitCode {
    for cause in err.chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return ExitCode::CLI_ARGS;
        }
        if matches!(cause.downcast_ref::<CoordinatorError>(), Some(CoordinatorError::InvalidIsbn(_))) {
            return ExitCode::CLI_ARGS;
        }
    }
    if err.to_string().contains("not valid UTF-8") {
        return ExitCode::CLI_ARGS;
    }
    ExitCode::INTERNAL
}
