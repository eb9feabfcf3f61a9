//! Web Vitals Logger - Collection Daemon
//!
//! Issues page-render identities, accepts metric submissions over HTTP,
//! persists them in SQLite, and serves the aggregate averages report.

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use wvld::http_api::{AppState, create_router};
use wvld::metrics;
use wvld::storage::Storage;

#[derive(Parser)]
#[command(name = "wvld")]
#[command(author, version, about = "Web vitals collection daemon")]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8787")]
    listen: SocketAddr,

    /// Path to the SQLite database (in-memory when omitted)
    #[arg(short, long)]
    db: Option<PathBuf>,

    /// Collection endpoint URL advertised in page-load configs
    /// (defaults to http://<listen>/collect)
    #[arg(long)]
    collect_url: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("Starting web vitals collection daemon...");

    metrics::register_metrics().context("failed to register metrics")?;

    let storage = match &cli.db {
        Some(path) => {
            info!("Opening database at {:?}", path);
            Storage::open(path).with_context(|| format!("failed to open database {:?}", path))?
        }
        None => {
            info!("No --db given, submissions are stored in memory only");
            Storage::open_in_memory().context("failed to open in-memory database")?
        }
    };

    let collect_url = cli
        .collect_url
        .unwrap_or_else(|| format!("http://{}/collect", cli.listen));
    info!("Advertising collection endpoint {}", collect_url);

    let state = AppState {
        storage: Arc::new(storage),
        collect_url,
        version: env!("CARGO_PKG_VERSION"),
        started_at: Instant::now(),
        pid: std::process::id(),
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("failed to bind {}", cli.listen))?;
    info!("Listening on {}", cli.listen);

    axum::serve(listener, router).await?;

    Ok(())
}
