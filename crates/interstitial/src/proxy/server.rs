//! HTTP front for the framing proxy
//!
//! Routes:
//! - `POST /v1/chat/completions`: frame the request and stream the upstream answer
//! - `GET /v1/models`: synthetic listing from a probe request
//! - `GET /`, `GET /health`: static JSON
//! - `GET /favicon.ico`: static file

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{Response, StatusCode, header},
    response::IntoResponse,
    routing::{get, get_service, post},
};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{InterstitialError, Result};

use super::error::ProxyError;
use super::models::{ModelListing, ModelResolver};
use super::relay::{ClientStream, StreamRelay};
use super::rewrite::rewrite;
use super::upstream::UpstreamClient;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Full configuration
    pub config: Config,
    /// Client bound to the upstream chat endpoint
    pub upstream: UpstreamClient,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let upstream = UpstreamClient::new(&config.upstream)?;
        Ok(Self { config, upstream })
    }
}

/// The main proxy server
pub struct ProxyServer {
    config: Config,
}

impl ProxyServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Start the proxy server and listen for requests
    pub async fn serve(&self) -> Result<()> {
        let addr = self.config.server.socket_addr()?;
        let state = Arc::new(AppState::new(self.config.clone())?);

        tracing::info!("Starting proxy server on {addr}");
        tracing::info!("Upstream endpoint: {}", state.upstream.endpoint());

        let app = create_router(state);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| InterstitialError::Proxy(format!("Failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| InterstitialError::Proxy(format!("Server error: {e}")))?;

        tracing::info!("Proxy server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    let favicon = ServeFile::new(&state.config.server.favicon_path);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/favicon.ico", get_service(favicon))
        .route("/v1/models", get(models_handler))
        .route("/v1/chat/completions", post(chat_completions_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn root_handler() -> Json<Value> {
    Json(serde_json::json!({"message": "Welcome to the API"}))
}

/// Health check endpoint - returns JSON status
async fn health_handler() -> Json<Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn models_handler(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<ModelListing>, ProxyError> {
    let resolver = ModelResolver::new(
        &state.upstream,
        state.config.upstream.probe_timeout(),
        &state.config.models.owned_by,
    );

    let listing = resolver.resolve_model_listing().await?;
    Ok(Json(listing))
}

/// Frame the chat request and relay the upstream answer as it arrives
///
/// Errors before streaming starts become JSON `{"error": ...}` bodies.
/// Once the stream response is returned, failures only end the stream.
async fn chat_completions_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Response<Body> {
    let span = tracing::info_span!("chat", request_id = %Uuid::new_v4());

    async move {
        match relay_chat(&state, &body).await {
            Ok(stream) => streaming_response(stream),
            Err(e) => e.into_response(),
        }
    }
    .instrument(span)
    .await
}

async fn relay_chat(
    state: &AppState,
    body: &[u8],
) -> std::result::Result<ClientStream, ProxyError> {
    let request: Value = serde_json::from_slice(body)
        .map_err(|e| ProxyError::Request(format!("Invalid JSON: {e}")))?;

    if !request.is_object() {
        return Err(ProxyError::Request("expected a JSON object".to_string()));
    }

    let framed = rewrite(request, &state.config.framing);
    tracing::debug!(payload = %framed, "Sending request to upstream");

    let relay =
        StreamRelay::connect(&state.upstream, &framed, state.config.upstream.timeout()).await?;

    Ok(relay.client_stream)
}

fn streaming_response(stream: ClientStream) -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
