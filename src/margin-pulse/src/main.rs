//! Margin Pulse — daily revenue attribution and margin computation for a
//! bot portfolio.
//!
//! Runs either as a one-shot compute over a JSON fixture or as an HTTP
//! service exposing compute triggers and report reads.

use chrono::NaiveDate;
use clap::Parser;
use margin_api::ApiServer;
use margin_core::config::AppConfig;
use margin_engine::MarginPipeline;
use margin_store::snapshots::MemorySnapshotStore;
use margin_store::source::{SourceFixture, StaticDataSource};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "margin-pulse")]
#[command(about = "Revenue attribution and margin computation for a bot portfolio")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "MARGIN_PULSE__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "MARGIN_PULSE__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Metrics port (overrides config)
    #[arg(long, env = "MARGIN_PULSE__METRICS__PORT")]
    metrics_port: Option<u16>,

    /// JSON fixture file backing the data source
    #[arg(long)]
    input: Option<PathBuf>,

    /// Compute a single date (YYYY-MM-DD) and print the summary
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Range start for a backfill (requires --end)
    #[arg(long, requires = "end")]
    start: Option<NaiveDate>,

    /// Range end for a backfill (requires --start)
    #[arg(long, requires = "start")]
    end: Option<NaiveDate>,

    /// Keep serving HTTP after any one-shot compute
    #[arg(long, default_value_t = false)]
    serve: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "margin_pulse=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Margin Pulse starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        utc_offset_hours = config.engine.utc_offset_hours,
        "Configuration loaded"
    );

    // Initialize the data source
    let source = match &cli.input {
        Some(path) => {
            info!(path = %path.display(), "Loading source fixture");
            Arc::new(StaticDataSource::from_json_file(path)?)
        }
        None => Arc::new(StaticDataSource::new(SourceFixture::default())),
    };

    let store = Arc::new(MemorySnapshotStore::new());
    let pipeline = Arc::new(MarginPipeline::new(source, store, config.engine.clone()));

    // One-shot compute modes
    if let Some(date) = cli.date {
        let set = pipeline.compute_for_date(date).await?;
        println!("{}", serde_json::to_string_pretty(&set.summary)?);
        if !cli.serve {
            return Ok(());
        }
    }

    if let (Some(start), Some(end)) = (cli.start, cli.end) {
        let outcome = pipeline.compute_for_range(start, end).await?;
        info!(
            computed = outcome.computed.len(),
            failed = outcome.failed.len(),
            "Backfill finished"
        );
        for (date, e) in &outcome.failed {
            error!(%date, error = %e, "Date failed");
        }
        if !cli.serve {
            return Ok(());
        }
    }

    // Serve mode
    let api_server = ApiServer::new(config, pipeline);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Margin Pulse is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
