// ABOUTME: HTTP liveness server for the hosting platform's health probes
// ABOUTME: Serves a static alive page, a JSON health summary, and Prometheus metrics

use anyhow::{Context, Result};
use anonchat_core::config::HealthConfig;
use anonchat_core::traits::{PlatformConnectionState, RelayTransport, SharedConnectionState};
use anonchat_core::{RelayOrchestrator, RelaySnapshot};
use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub const ALIVE_TEXT: &str = "Bot is alive ✅";

/// Live view of the bot for the health endpoint
#[async_trait]
pub trait StatusProvider: Send + Sync {
    async fn relay_snapshot(&self) -> RelaySnapshot;
    fn connection_state(&self) -> PlatformConnectionState;
}

/// Status backed by the running orchestrator and platform poller
pub struct BotStatus<T: RelayTransport> {
    orchestrator: Arc<RelayOrchestrator<T>>,
    connection: SharedConnectionState,
}

impl<T: RelayTransport> BotStatus<T> {
    pub fn new(orchestrator: Arc<RelayOrchestrator<T>>, connection: SharedConnectionState) -> Self {
        Self {
            orchestrator,
            connection,
        }
    }
}

#[async_trait]
impl<T: RelayTransport> StatusProvider for BotStatus<T> {
    async fn relay_snapshot(&self) -> RelaySnapshot {
        self.orchestrator.snapshot().await
    }

    fn connection_state(&self) -> PlatformConnectionState {
        self.connection
            .lock()
            .map(|s| s.clone())
            .unwrap_or(PlatformConnectionState::Connecting)
    }
}

#[derive(Clone)]
pub struct ServerState {
    status: Arc<dyn StatusProvider>,
    metrics: Option<PrometheusHandle>,
    started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(status: Arc<dyn StatusProvider>, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            status,
            metrics,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub platform: &'static str,
    pub waiting: usize,
    pub pairs: usize,
    pub seen: usize,
    pub uptime_secs: i64,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(alive))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process exits
pub async fn start_server(config: &HealthConfig, state: ServerState) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind liveness server on {}", addr))?;
    tracing::info!(addr = %addr, "Starting liveness server");

    axum::serve(listener, router(state))
        .await
        .context("Liveness server failed")?;
    Ok(())
}

async fn alive() -> &'static str {
    ALIVE_TEXT
}

async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    let snapshot = state.status.relay_snapshot().await;
    let connection = state.status.connection_state();
    let status = match connection {
        PlatformConnectionState::Connected => "ok",
        _ => "degraded",
    };

    Json(HealthResponse {
        status,
        platform: connection.label(),
        waiting: snapshot.waiting,
        pairs: snapshot.pairs,
        seen: snapshot.seen,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

async fn metrics_handler(State(state): State<ServerState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}
