//! HTTP server assembly: REST routes, middleware, and the Prometheus
//! exporter on its own port.

use crate::rest::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use margin_core::config::AppConfig;
use margin_engine::MarginPipeline;
use margin_reports::{DailyBriefBuilder, WeeklyReportBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct ApiServer {
    config: AppConfig,
    pipeline: Arc<MarginPipeline>,
}

impl ApiServer {
    pub fn new(config: AppConfig, pipeline: Arc<MarginPipeline>) -> Self {
        Self { config, pipeline }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let store = self.pipeline.store();
        let state = AppState {
            pipeline: self.pipeline.clone(),
            daily_briefs: Arc::new(DailyBriefBuilder::new(
                store.clone(),
                self.config.engine.clone(),
            )),
            weekly_reports: Arc::new(WeeklyReportBuilder::new(
                store,
                self.config.engine.clone(),
            )),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        };

        let app = Router::new()
            // Compute triggers
            .route("/v1/compute", post(rest::compute_range))
            .route("/v1/compute/:date", post(rest::compute_date))
            // Snapshot and report reads
            .route("/v1/snapshots/:date", get(rest::read_snapshot))
            .route("/v1/reports/daily/:date", get(rest::daily_report))
            .route("/v1/reports/weekly/:date", get(rest::weekly_report))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let addr = SocketAddr::new(
            self.config.api.host.parse()?,
            self.config.api.http_port,
        );

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        let handle = builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install_recorder()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");

        // Keep the handle alive
        std::mem::forget(handle);
        Ok(())
    }
}
