//! Application state and HTTP/WebSocket surface
//!
//! `AppState` wires the engine, the session gateway, and the provider
//! aggregator together and owns the single axum server that carries the
//! monitoring endpoints, catalog search, the Spotify auth broker, and the
//! `/ws` upgrade.

use crate::config::AppConfig;
use crate::error::Result;
use crate::gateway::{SessionGateway, WsBroadcaster};
use crate::metrics::MetricsCollector;
use crate::playback::PlaybackEngine;
use crate::providers::{SearchAggregator, SearchOutcome, SpotifyOauth};
use crate::service::health::{HealthReport, HealthStatus, ServiceStats};
use crate::types::TrackSource;
use anyhow::Context;
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shared service state behind every handler
pub struct AppState {
    config: AppConfig,
    engine: Arc<PlaybackEngine>,
    gateway: Arc<SessionGateway>,
    aggregator: Arc<SearchAggregator>,
    oauth: Arc<SpotifyOauth>,
    metrics: Arc<MetricsCollector>,
    shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Arc<Self>> {
        let metrics = Arc::new(MetricsCollector::new()?);
        let broadcaster = Arc::new(WsBroadcaster::new());

        let engine = Arc::new(PlaybackEngine::new(
            broadcaster.clone(),
            config.playback.clone(),
            metrics.clone(),
        ));
        let gateway = Arc::new(SessionGateway::new(
            engine.clone(),
            broadcaster,
            metrics.clone(),
        ));
        let aggregator = Arc::new(SearchAggregator::from_config(
            &config.providers,
            metrics.clone(),
        )?);

        let http_client = reqwest::Client::builder()
            .timeout(config.provider_timeout())
            .build()?;
        let oauth = Arc::new(SpotifyOauth::new(
            http_client,
            config.providers.spotify_client_id.clone(),
            config.providers.spotify_client_secret.clone(),
            config.providers.spotify_redirect_uri.clone(),
        ));

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Arc::new(Self {
            config,
            engine,
            gateway,
            aggregator,
            oauth,
            metrics,
            shutdown_tx,
        }))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn engine(&self) -> Arc<PlaybackEngine> {
        self.engine.clone()
    }

    /// The full route table; split out so tests can drive it in-process.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/search", get(search_handler))
            .route("/auth/login", get(auth_login_handler))
            .route("/auth/callback", get(auth_callback_handler))
            .route("/auth/refresh", get(auth_refresh_handler))
            .route("/ws", get(ws_handler))
            .with_state(self.clone())
    }

    /// Bind and serve until a shutdown signal arrives.
    pub async fn serve(self: &Arc<Self>) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.service.http_port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        info!("Listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Server shutdown signal received");
            })
            .await?;

        info!("Server stopped");
        Ok(())
    }

    /// Ask the server to drain and stop.
    pub fn shutdown(&self) {
        if self.shutdown_tx.send(()).is_err() {
            warn!("No server task listening for shutdown");
        }
    }

    /// Live health snapshot; also backs the CLI health-check mode.
    pub fn health_report(&self) -> HealthReport {
        HealthReport::from_stats(
            &self.config.service.name,
            ServiceStats {
                active_lobbies: self.engine.active_lobbies(),
                connected_clients: self.metrics.connected_clients.get().max(0) as usize,
                armed_timers: self.engine.armed_timers(),
                configured_providers: self.aggregator.configured_count(),
                uptime_seconds: self.metrics.uptime_seconds(),
            },
        )
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
    source: Option<TrackSource>,
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

async fn root_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "service": state.config.service.name,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/health", "/metrics", "/search", "/auth/login", "/ws"]
    }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.health_report();
    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report))
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let families = state.metrics.registry().gather();
    let encoder = TextEncoder::new();

    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", encoder.format_type().to_string())],
            body,
        )
            .into_response(),
        Err(err) => {
            error!("Failed to encode metrics: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}

/// Catalog search. Always 200: provider failures surface as warnings inside
/// the body, not as an HTTP error.
async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Json<SearchOutcome> {
    debug!("Search '{}' (source: {:?})", params.q, params.source);
    Json(state.aggregator.search(&params.q, params.source).await)
}

async fn auth_login_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.oauth.login_url(&Uuid::new_v4().to_string()) {
        Ok(url) => Redirect::temporary(&url).into_response(),
        Err(err) => {
            warn!("Auth login unavailable: {:#}", err);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": "spotify auth not configured"})),
            )
                .into_response()
        }
    }
}

async fn auth_callback_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(error) = params.error {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("authorization denied: {}", error)})),
        )
            .into_response();
    }
    let Some(code) = params.code else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "missing authorization code"})),
        )
            .into_response();
    };

    match state.oauth.exchange_code(&code).await {
        Ok(grant) => Json(grant).into_response(),
        Err(err) => {
            warn!("Code exchange failed: {:#}", err);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": "token exchange failed"})),
            )
                .into_response()
        }
    }
}

async fn auth_refresh_handler(
    State(state): State<Arc<AppState>>,
    Query(request): Query<RefreshRequest>,
) -> Response {
    match state.oauth.refresh(&request.refresh_token).await {
        Ok(grant) => Json(grant).into_response(),
        Err(err) => {
            warn!("Token refresh failed: {:#}", err);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": "token refresh failed"})),
            )
                .into_response()
        }
    }
}

async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    let gateway = state.gateway.clone();
    ws.on_upgrade(move |socket| gateway.handle_socket(socket))
}
