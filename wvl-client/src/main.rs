//! Trace-replay CLI for the web vitals collection pipeline.
#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use wvl_client::pipeline::{PageView, PipelineConfig, run_page_view};
use wvl_client::report::{ReportError, Reporter, Transport};
use wvl_client::trace::PageTrace;
use wvl_common::{PageConfig, SchemaVersion, UserClassification};

#[derive(Parser)]
#[command(name = "wvl-client", about = "Web vitals collection pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded page trace through the pipeline
    Replay {
        /// Path to the JSON page trace
        #[arg(long)]
        trace: PathBuf,

        /// Collection endpoint URL (or use --acquire)
        #[arg(long)]
        endpoint: Option<String>,

        /// Anti-forgery nonce issued with the page
        #[arg(long, default_value = "")]
        nonce: String,

        /// Page-render correlation token to echo back
        #[arg(long)]
        page_render_uuid: Option<String>,

        /// Acquire the page-load configuration from a correlator endpoint
        /// (overrides --endpoint, --nonce and --page-render-uuid)
        #[arg(long)]
        acquire: Option<String>,

        /// Page URL to attribute the metrics to
        #[arg(long, default_value = "http://localhost/")]
        url: String,

        /// Classify the visitor as logged in
        #[arg(long)]
        logged_in: bool,

        /// Flush delay in milliseconds, before speed scaling
        #[arg(long, default_value_t = 5000)]
        flush_ms: u64,

        /// Replay speed multiplier (2.0 = twice as fast)
        #[arg(long, default_value_t = 1.0)]
        speed: f64,

        /// Wire schema version
        #[arg(long, value_enum, default_value_t = SchemaArg::V4)]
        schema: SchemaArg,

        /// Print the payload instead of sending it
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(ValueEnum, Clone, Copy)]
enum SchemaArg {
    /// TTFB-only legacy schema
    V1,
    /// Four-metric schema
    V2,
    /// Five-metric schema
    V3,
    /// Correlated five-metric schema
    V4,
}

impl From<SchemaArg> for SchemaVersion {
    fn from(arg: SchemaArg) -> Self {
        match arg {
            SchemaArg::V1 => SchemaVersion::TtfbOnly,
            SchemaArg::V2 => SchemaVersion::FourMetric,
            SchemaArg::V3 => SchemaVersion::FiveMetric,
            SchemaArg::V4 => SchemaVersion::Correlated,
        }
    }
}

/// Transport that prints the would-be request and reports success.
struct DryRunTransport;

impl Transport for DryRunTransport {
    fn post_form(
        &self,
        url: &str,
        fields: &[(&'static str, String)],
    ) -> Result<String, ReportError> {
        println!("POST {url}");
        for (name, value) in fields {
            println!("  {name}={value}");
        }
        Ok(r#"{"success":true,"data":"dry run"}"#.to_string())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Replay {
            trace,
            endpoint,
            nonce,
            page_render_uuid,
            acquire,
            url,
            logged_in,
            flush_ms,
            speed,
            schema,
            dry_run,
        } => {
            let trace_json = std::fs::read_to_string(&trace)
                .with_context(|| format!("failed to read trace {}", trace.display()))?;
            let trace = PageTrace::from_json(&trace_json).context("invalid page trace")?;

            let config = match acquire {
                Some(acquire_url) => acquire_page_config(&acquire_url, &url).await?,
                None => PageConfig {
                    collect_url: endpoint
                        .context("either --endpoint or --acquire is required")?,
                    nonce,
                    page_render_uuid,
                },
            };

            let speed = if speed > 0.0 { speed } else { 1.0 };
            let pipeline_config = PipelineConfig {
                flush_delay: Duration::from_millis(flush_ms).div_f64(speed),
                schema: schema.into(),
            };
            let view = PageView {
                config,
                url,
                user: UserClassification::from_logged_in(logged_in),
                navigation: trace.navigation,
                entries: Some(trace.replay(speed)),
            };

            let reporter = if dry_run {
                Reporter::with_transport(Arc::new(DryRunTransport))
            } else {
                Reporter::new()
            };

            match run_page_view(view, pipeline_config, &reporter).await {
                Some(outcome) => {
                    println!("{}", serde_json::to_string_pretty(&outcome.snapshot)?);
                    match outcome.response {
                        Ok(body) if body.success => println!("accepted: {}", body.data),
                        Ok(body) => println!("rejected: {}", body.data),
                        Err(e) => println!("failed: {e}"),
                    }
                }
                None => println!("no submission: performance observation unavailable"),
            }
        }
    }

    Ok(())
}

/// Fetch the page-load configuration from the correlator endpoint, the
/// way a server-rendered page would have it injected.
async fn acquire_page_config(acquire_url: &str, page_url: &str) -> Result<PageConfig> {
    let acquire_url = acquire_url.to_string();
    let page_url = page_url.to_string();
    let body = tokio::task::spawn_blocking(move || -> Result<String> {
        let mut response = ureq::post(&acquire_url)
            .query("path", &page_url)
            .send_empty()
            .with_context(|| format!("correlator request to {acquire_url} failed"))?;
        Ok(response.body_mut().read_to_string()?)
    })
    .await??;
    serde_json::from_str(&body).context("invalid page-load configuration")
}
