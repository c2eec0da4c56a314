//! Burgas Sensor Map - caching proxy server for sensor feeds
//!
//! Loads configuration from the environment (a `.env` file is honored),
//! validates that every upstream URL is present, warms the cache for all
//! targets concurrently, and only then binds the HTTP listener.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sensormap::config::Config;
use sensormap::fetch::HttpFetcher;
use sensormap::server;
use sensormap::service::AggregationService;

/// Caching proxy for Burgas air quality and traffic sensor feeds
#[derive(Parser)]
#[command(name = "sensormap")]
struct Cli {
    /// Override the listening port from the environment
    #[arg(long)]
    port: Option<u16>,

    /// Override the cache directory from the environment
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Validate configuration and exit without serving
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("configuration error: {err}");
            std::process::exit(1);
        }
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(cache_dir) = cli.cache_dir {
        config.cache_dir = cache_dir;
    }

    // A missing upstream URL is a deployment error: exit before binding
    if let Err(err) = config.validate() {
        error!("CRITICAL: {err}");
        std::process::exit(1);
    }

    if cli.check_config {
        info!("configuration OK");
        return;
    }

    if let Err(err) = run(config).await {
        error!("server error: {err}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let app_url = config.app_url.clone();
    let port = config.port;

    let fetcher = HttpFetcher::new(config.upstream_timeout)?;
    let service = Arc::new(AggregationService::new(config, fetcher)?);

    // Warm every target before accepting traffic. Partial failure is fine;
    // even a total failure only logs, since artifacts already on disk may
    // still satisfy requests.
    if let Err(err) = service.warm_up().await {
        error!("{err}");
    }

    let router = server::router(service);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running at {app_url}:{port}");
    axum::serve(listener, router).await?;

    Ok(())
}
