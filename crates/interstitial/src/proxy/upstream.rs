//! Client for the single upstream inference server
//!
//! Two call shapes share one endpoint:
//! - Buffered: waits for the whole body and parses it as JSON (model probe)
//! - Streamed: returns once headers arrive, body is read lazily (chat)
//!
//! Every call carries a whole-request timeout covering connect and the full
//! body transfer.

use bytes::Bytes;
use futures::stream::Stream;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::{InterstitialError, Result};

/// Errors raised while talking to the upstream
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// The whole-request timeout elapsed
    #[error("The request timed out.")]
    Timeout,

    /// Connection refused, DNS failure, or the transfer broke off
    #[error("{0}")]
    Unreachable(String),

    /// The upstream answered with a non-2xx status
    #[error("Upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The buffered body was not valid JSON
    #[error("Invalid upstream response: {0}")]
    InvalidBody(String),
}

impl UpstreamError {
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else if e.is_connect() {
            UpstreamError::Unreachable(format!("Failed to connect to upstream: {e}"))
        } else {
            UpstreamError::Unreachable(format!("Request failed: {e}"))
        }
    }

    /// Category name for structured logging
    pub fn category(&self) -> &'static str {
        match self {
            UpstreamError::Timeout => "timeout",
            UpstreamError::Unreachable(_) => "unreachable",
            UpstreamError::Status { .. } => "status",
            UpstreamError::InvalidBody(_) => "invalid_body",
        }
    }
}

/// An upstream response whose headers have arrived but whose body has not
/// been read yet.
///
/// Dropping it, at any point of consumption, releases the connection.
#[derive(Debug)]
pub struct UpstreamStream {
    response: reqwest::Response,
}

impl UpstreamStream {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// Consume the response as a lazy, single-pass sequence of fragments
    pub fn into_fragments(self) -> impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static {
        self.response.bytes_stream()
    }

    /// Read the rest of the body as text (used for error diagnostics)
    pub async fn text(self) -> std::result::Result<String, UpstreamError> {
        self.response.text().await.map_err(UpstreamError::from_reqwest)
    }
}

/// HTTP client bound to the upstream chat completions endpoint
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl UpstreamClient {
    /// Build a client for the configured upstream
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let endpoint = config.endpoint()?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| InterstitialError::Proxy(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// POST the payload and wait for the complete JSON body
    pub async fn call_buffered(
        &self,
        payload: &Value,
        timeout: Duration,
    ) -> std::result::Result<Value, UpstreamError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        let status = response.status();
        tracing::debug!(status = %status, "Received buffered upstream response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }

        let body = response.bytes().await.map_err(UpstreamError::from_reqwest)?;

        serde_json::from_slice(&body).map_err(|e| UpstreamError::InvalidBody(e.to_string()))
    }

    /// POST the payload and return as soon as response headers arrive
    pub async fn call_streamed(
        &self,
        payload: &Value,
        timeout: Duration,
    ) -> std::result::Result<UpstreamStream, UpstreamError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        tracing::info!(status = %response.status(), "Received response from upstream");

        Ok(UpstreamStream { response })
    }
}
