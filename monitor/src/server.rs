//! Read-only HTTP surface for the dashboard UI

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::aggregator::PollStats;
use crate::fetch::SourceHealth;
use crate::{StatusAggregator, Result, SYSTEM_NAME, VERSION};

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub system: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
    pub polls: PollStats,
    pub sources: Vec<SourceHealth>,
}

/// Routes served by the monitor
pub fn router(aggregator: Arc<StatusAggregator>) -> Router {
    Router::new()
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/metrics", get(get_metrics))
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http())
        .with_state(aggregator)
}

/// Serve until `shutdown` is cancelled
pub async fn serve(
    listener: TcpListener,
    aggregator: Arc<StatusAggregator>,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "Dashboard API listening");

    axum::serve(listener, router(aggregator))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Dashboard API stopped");
    Ok(())
}

async fn get_dashboard(State(aggregator): State<Arc<StatusAggregator>>) -> impl IntoResponse {
    Json(aggregator.latest())
}

async fn get_metrics(State(aggregator): State<Arc<StatusAggregator>>) -> impl IntoResponse {
    Json(aggregator.latest_metrics())
}

async fn get_health(State(aggregator): State<Arc<StatusAggregator>>) -> impl IntoResponse {
    Json(HealthReport {
        status: "ok",
        system: SYSTEM_NAME,
        version: VERSION,
        timestamp: Utc::now(),
        polls: aggregator.stats(),
        sources: aggregator.source_health(),
    })
}
