//! HTTP surface: match fetching plus health and Prometheus endpoints
//!
//! `POST /v1/backend/matches:fetch` answers with newline-delimited JSON.
//! Errors found before any match is produced become a plain JSON error with a
//! matching status code; errors after streaming started are appended as a
//! final `{"error": ...}` line.

use crate::context::FetchContext;
use crate::error::{ErrorCode, FetchError, SendError};
use crate::fetch::MatchSender;
use crate::service::app::AppState;
use crate::service::health::{HealthCheck, HealthStatus};
use crate::types::{FetchRequest, Match};
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{debug, error, info, warn};

pub const FETCH_PATH: &str = "/v1/backend/matches:fetch";

/// Optional per-request deadline in milliseconds
pub const TIMEOUT_HEADER: &str = "x-fetch-timeout-ms";

const NDJSON: &str = "application/x-ndjson";

/// Lines buffered between the streamer and the response body
const STREAM_BUFFER: usize = 16;

/// One line of the fetch response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResponseLine {
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub proposal: Option<Match>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl FetchResponseLine {
    pub fn proposal(proposal: Match) -> Self {
        Self {
            proposal: Some(proposal),
            error: None,
        }
    }

    pub fn error(err: &FetchError) -> Self {
        Self {
            proposal: None,
            error: Some(ErrorBody::from(err)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&FetchError> for ErrorBody {
    fn from(err: &FetchError) -> Self {
        Self {
            code: err.code().as_str().to_string(),
            message: err.to_string(),
        }
    }
}

/// Adapts the response body channel to [`MatchSender`]
struct LineSender {
    tx: mpsc::Sender<FetchResponseLine>,
}

#[async_trait]
impl MatchSender for LineSender {
    async fn send(&self, proposal: Match) -> Result<(), SendError> {
        self.tx
            .send(FetchResponseLine::proposal(proposal))
            .await
            .map_err(|_| SendError::new("client disconnected"))
    }
}

pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        // Client closed request
        ErrorCode::Cancelled => {
            StatusCode::from_u16(499).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
        }
        ErrorCode::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &FetchError) -> Response {
    (status_for(err.code()), Json(ErrorBody::from(err))).into_response()
}

fn encode_line(line: FetchResponseLine) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(&line)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn request_context(state: &AppState, headers: &HeaderMap) -> Result<FetchContext, FetchError> {
    let ctx = FetchContext::from_token(state.shutdown_token().child_token());

    match headers.get(TIMEOUT_HEADER) {
        None => Ok(ctx),
        Some(value) => {
            let millis = value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .ok_or_else(|| {
                    FetchError::invalid_argument(format!(
                        "{} must be a whole number of milliseconds",
                        TIMEOUT_HEADER
                    ))
                })?;
            Ok(ctx.with_timeout(Duration::from_millis(millis)))
        }
    }
}

/// Build the service router around shared state
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(FETCH_PATH, post(fetch_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn fetch_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<FetchRequest>,
) -> Response {
    let ctx = match request_context(&state, &headers) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(&e),
    };

    // Waits while max_concurrent_fetches requests are fetching or streaming
    let permits = state.fetch_permits().clone();
    let permit = match ctx
        .run(async move {
            permits
                .acquire_owned()
                .await
                .map_err(|_| FetchError::internal("fetch limiter closed"))
        })
        .await
    {
        Ok(permit) => permit,
        Err(e) => return error_response(&e),
    };

    // Cancels the fetch if the client goes away before proposals are ready
    let guard = ctx.token().clone().drop_guard();
    let matches = match state.backend().fetch_proposals(&ctx, &request).await {
        Ok(matches) => matches,
        Err(e) => return error_response(&e),
    };
    guard.disarm();

    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let backend = state.backend().clone();
    tokio::spawn(async move {
        let _permit = permit;
        let sender = LineSender { tx };
        if let Err(e) = backend.stream_matches(&ctx, matches, &sender).await {
            if !matches!(e, FetchError::Send(_)) {
                let _ = sender.tx.send(FetchResponseLine::error(&e)).await;
            }
        }
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(encode_line));
    (StatusCode::OK, [(header::CONTENT_TYPE, NDJSON)], body).into_response()
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Health check requested");

    match HealthCheck::check(state).await {
        Ok(health) => {
            let status = match health.status {
                HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::OK,
            };
            (status, Json(json!(health)))
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "error": e.to_string() })),
            )
        }
    }
}

async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Readiness check requested");

    match HealthCheck::readiness_check(state).await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "Ready"),
        Ok(HealthStatus::Degraded) => (StatusCode::OK, "Degraded but ready"),
        Ok(HealthStatus::Unhealthy) => (StatusCode::SERVICE_UNAVAILABLE, "Not ready"),
        Err(e) => {
            error!("Readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
        }
    }
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    debug!("Metrics endpoint requested");

    let metric_families = state.metrics().registry().gather();
    let encoder = TextEncoder::new();

    match encoder.encode_to_string(&metric_families) {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            output,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
                .into_response()
        }
    }
}

/// HTTP server with broadcast-driven graceful shutdown
pub struct HttpServer {
    state: Arc<AppState>,
    shutdown_tx: broadcast::Sender<()>,
}

impl HttpServer {
    pub fn new(state: Arc<AppState>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { state, shutdown_tx }
    }

    pub fn address(&self) -> Result<SocketAddr> {
        let service = &self.state.config().service;
        format!("{}:{}", service.http_host, service.http_port)
            .parse()
            .context("Invalid HTTP server address")
    }

    /// Bind the configured address and serve until [`HttpServer::stop`]
    pub async fn start(&self) -> Result<()> {
        let addr = self.address()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        let app = router(self.state.clone());
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!("HTTP server listening on http://{}", addr);
        self.state.set_running(true).await;

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("HTTP server shutdown signal received");
            })
            .await;

        self.state.set_running(false).await;
        result?;

        info!("HTTP server stopped");
        Ok(())
    }

    pub fn stop(&self) {
        info!("Stopping HTTP server...");
        self.state.begin_shutdown();

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to HTTP server: {}", e);
        }
    }
}
