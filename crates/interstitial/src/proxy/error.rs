//! Error-to-response mapping for the HTTP front
//!
//! Component errors are matched here and nowhere else. Every failure on the
//! chat path that happens before streaming starts becomes a JSON object with
//! a single `error` key.

use axum::{
    body::Body,
    http::{Response, StatusCode, header},
    response::IntoResponse,
};
use thiserror::Error;
use tracing::error;

use super::models::ResolverError;
use super::upstream::UpstreamError;

/// Errors surfaced to HTTP clients
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The client body was not a JSON object
    #[error("Invalid request: {0}")]
    Request(String),

    /// The upstream could not be reached or timed out
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The model listing could not be resolved
    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Request(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(UpstreamError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Resolver(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ProxyError::Request(_) => "request",
            ProxyError::Upstream(e) => e.category(),
            ProxyError::Resolver(_) => "resolver",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response<Body> {
        let status = self.status();
        error!(
            error_type = self.category(),
            status = %status,
            error_message = %self,
            "Request failed"
        );

        json_error_response(status, &self.to_string())
    }
}

/// Create a JSON `{"error": message}` response
pub fn json_error_response(status: StatusCode, message: &str) -> Response<Body> {
    let body = serde_json::json!({ "error": message });

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_timeout_maps_to_fixed_message() {
        let response = ProxyError::from(UpstreamError::Timeout).into_response();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let json = body_json(response).await;
        assert_eq!(json, serde_json::json!({"error": "The request timed out."}));
    }

    #[tokio::test]
    async fn test_unreachable_maps_to_bad_gateway() {
        let response = ProxyError::from(UpstreamError::Unreachable(
            "Failed to connect to upstream: refused".to_string(),
        ))
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Failed to connect to upstream: refused");
        assert_eq!(json.as_object().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolver_error_maps_to_internal_error() {
        let response = ProxyError::from(ResolverError::MissingModel).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Probe response has no model field");
    }

    #[tokio::test]
    async fn test_request_error_maps_to_bad_request() {
        let response = ProxyError::Request("expected a JSON object".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Invalid request: expected a JSON object");
    }

    #[test]
    fn test_categories() {
        assert_eq!(ProxyError::Request(String::new()).category(), "request");
        assert_eq!(ProxyError::from(UpstreamError::Timeout).category(), "timeout");
        assert_eq!(
            ProxyError::from(ResolverError::MissingModel).category(),
            "resolver"
        );
    }
}
