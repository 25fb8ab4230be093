//! postcache daemon - serves cached origin payloads over HTTP
//!
//! Wires configuration, the cache tiers, the rate limiter and the origin
//! client together, then either serves HTTP or resolves a single identifier.

use anyhow::{anyhow, Result};
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use postcache::cache::{LocalTier, MemoryTier, RedisTier, SharedTier, TieredCache};
use postcache::config::Config;
use postcache::server::{self, AppState};
use postcache::upstream::{HttpFetcher, SharedDataExtractor};
use postcache::{FetchOrchestrator, RateLimiter, ResolveSettings};

/// How often cache counters are written to the log
const METRICS_INTERVAL: Duration = Duration::from_secs(60);

/// CLI command
#[derive(Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Resolve one identifier and print the payload
    Resolve { id: String },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"postcache - rate-limited fetch-through cache

USAGE:
    postcache                  # Run HTTP server (default)
    postcache serve
    postcache resolve <id>
    postcache help

COMMANDS:
    serve    Serve GET /instagram/p/<id> and GET /health
    resolve  Resolve a single identifier through the cache and print it
    help     Show this help message

ENVIRONMENT:
    CONFIG_PATH   JSON config file (default ./config.json)
    REDIS_URL     Shared tier, e.g. redis://localhost:6379/0
    LISTEN_ADDR   HTTP listen address (default 0.0.0.0:8080)
    RUST_LOG      Log filter (trace, debug, info, warn, error)
"#
    );
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Serve);
    }

    match args[1].as_str() {
        "serve" => Ok(Command::Serve),
        "resolve" => {
            let id = args
                .get(2)
                .ok_or_else(|| anyhow!("Usage: postcache resolve <id>"))?;
            Ok(Command::Resolve { id: id.clone() })
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            Ok(Command::Help)
        }
    }
}

/// Build the shared tier named by the config
fn shared_tier(config: &Config) -> Result<Arc<dyn SharedTier>> {
    match &config.redis {
        Some(redis) => Ok(Arc::new(RedisTier::open(&redis.url, config.shared_op_timeout())?)),
        None => {
            warn!("No Redis configured, shared tier is local to this process");
            Ok(Arc::new(MemoryTier::new()))
        }
    }
}

fn build_orchestrator(config: &Config) -> Result<FetchOrchestrator> {
    let local = LocalTier::with_limits(config.cache.local_capacity, config.local_retention());
    let cache = Arc::new(TieredCache::new(
        local,
        shared_tier(config)?,
        config.shared_ttl(),
    ));

    let limiter = RateLimiter::new(config.limiter_interval(), config.limiter_burst())?;
    let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout())?);

    FetchOrchestrator::new(
        limiter,
        cache,
        fetcher,
        Arc::new(SharedDataExtractor::new()),
        ResolveSettings::from(config),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command
    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    if let Command::Help = command {
        print_help();
        return Ok(());
    }

    let config = Config::load()?;
    let orchestrator = Arc::new(build_orchestrator(&config)?);

    match command {
        Command::Serve => {
            info!(listen = %config.server.listen, "Starting postcache");

            let metrics_source = Arc::clone(&orchestrator);
            let metrics_task = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(METRICS_INTERVAL);
                loop {
                    ticker.tick().await;
                    metrics_source.cache().log_metrics();
                }
            });

            let state = Arc::new(AppState {
                orchestrator,
                permit_wait_timeout: config.permit_wait_timeout(),
                start_time: Instant::now(),
            });

            let result = server::serve(&config.server.listen, server::build_router(state)).await;
            metrics_task.abort();
            if let Err(e) = &result {
                error!(error = %e, "Server stopped with error");
            }
            info!("Shutdown complete.");
            result
        }
        Command::Resolve { id } => match orchestrator.resolve(&id).await {
            Ok(payload) => {
                println!("{}", payload);
                Ok(())
            }
            Err(e) => {
                error!(id = %id, error = %e, "Resolve failed");
                Err(e.into())
            }
        },
        Command::Help => Ok(()),
    }
}
