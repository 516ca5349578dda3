//! Synthetic `/v1/models` listing derived from a probe request
//!
//! The upstream exposes no model listing of its own, so the active model is
//! discovered by sending a one-token completion and reading the `model`
//! field of the answer.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use super::upstream::{UpstreamClient, UpstreamError};

const PROBE_CONTENT: &str = "confirm receipt";
const MODEL_CREATED: i64 = 1683758102;
const PERMISSION_CREATED: i64 = 1690866609;

/// Errors raised while resolving the model identity
#[derive(Error, Debug)]
pub enum ResolverError {
    /// The probe request itself failed
    #[error("Model probe failed: {0}")]
    Upstream(#[from] UpstreamError),

    /// The probe response carried no usable `model` field
    #[error("Probe response has no model field")]
    MissingModel,

    /// The `model` value reduced to an empty identifier
    #[error("Cannot derive a model id from '{0}'")]
    EmptyIdentifier(String),
}

/// OpenAI-style model listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelListing {
    pub object: String,
    pub data: Vec<ModelCard>,
}

/// A single model entry in the listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCard {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
    pub permission: Vec<ModelPermission>,
    pub root: String,
    pub parent: Option<String>,
}

/// Fixed permission record attached to every synthesized model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelPermission {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub allow_create_engine: bool,
    pub allow_sampling: bool,
    pub allow_logprobs: bool,
    pub allow_search_indices: bool,
    pub allow_view: bool,
    pub allow_fine_tuning: bool,
    pub organization: String,
    pub group: Option<String>,
    pub is_blocking: bool,
}

impl Default for ModelPermission {
    fn default() -> Self {
        Self {
            id: "modelperm".to_string(),
            object: "model_permission".to_string(),
            created: PERMISSION_CREATED,
            allow_create_engine: false,
            allow_sampling: true,
            allow_logprobs: true,
            allow_search_indices: false,
            allow_view: true,
            allow_fine_tuning: false,
            organization: "*".to_string(),
            group: None,
            is_blocking: false,
        }
    }
}

impl ModelListing {
    /// Wrap a single model id into a listing
    pub fn single(id: &str, owned_by: &str) -> Self {
        Self {
            object: "list".to_string(),
            data: vec![ModelCard {
                id: id.to_string(),
                object: "model".to_string(),
                created: MODEL_CREATED,
                owned_by: owned_by.to_string(),
                permission: vec![ModelPermission::default()],
                root: id.to_string(),
                parent: None,
            }],
        }
    }
}

/// Minimal completion request used to discover the upstream model
pub fn probe_payload() -> Value {
    serde_json::json!({
        "max_tokens": 1,
        "messages": [{"content": PROBE_CONTENT, "role": "user"}]
    })
}

/// Reduce an upstream model name to a short identifier.
///
/// Keeps the segment after the last `/` and drops everything from the
/// first `.` onwards: `org/name-v1.2.gguf` becomes `name-v1`.
pub fn derive_model_id(model: &str) -> Option<&str> {
    let last_segment = model.rsplit('/').next()?;
    let id = last_segment.split('.').next()?;
    if id.is_empty() { None } else { Some(id) }
}

/// Extract and derive the model id from a probe response
pub fn model_id_from_response(response: &Value) -> Result<String, ResolverError> {
    let model = response
        .get("model")
        .and_then(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .ok_or(ResolverError::MissingModel)?;

    derive_model_id(model)
        .map(str::to_string)
        .ok_or_else(|| ResolverError::EmptyIdentifier(model.to_string()))
}

/// Resolves the upstream's active model into a listing
pub struct ModelResolver<'a> {
    upstream: &'a UpstreamClient,
    timeout: Duration,
    owned_by: &'a str,
}

impl<'a> ModelResolver<'a> {
    pub fn new(upstream: &'a UpstreamClient, timeout: Duration, owned_by: &'a str) -> Self {
        Self {
            upstream,
            timeout,
            owned_by,
        }
    }

    /// Probe the upstream and build a fresh listing
    pub async fn resolve_model_listing(&self) -> Result<ModelListing, ResolverError> {
        let response = self
            .upstream
            .call_buffered(&probe_payload(), self.timeout)
            .await?;

        let id = model_id_from_response(&response)?;
        tracing::info!(model_id = %id, "Resolved upstream model");

        Ok(ModelListing::single(&id, self.owned_by))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_derive_model_id_path_and_extension() {
        assert_eq!(derive_model_id("org/name-v1.2.gguf"), Some("name-v1"));
    }

    #[test]
    fn test_derive_model_id_plain_name() {
        assert_eq!(derive_model_id("mistral-7b"), Some("mistral-7b"));
    }

    #[test]
    fn test_derive_model_id_absolute_path() {
        assert_eq!(
            derive_model_id("/models/llama/Llama-3-8B.Q4_K_M.gguf"),
            Some("Llama-3-8B")
        );
    }

    #[test]
    fn test_derive_model_id_empty_results() {
        assert_eq!(derive_model_id(""), None);
        assert_eq!(derive_model_id("models/"), None);
        assert_eq!(derive_model_id("models/.hidden"), None);
    }

    #[test]
    fn test_model_id_from_response() {
        let response = json!({"model": "org/name-v1.2.gguf", "choices": []});
        assert_eq!(model_id_from_response(&response).unwrap(), "name-v1");
    }

    #[test]
    fn test_model_id_missing_field() {
        let err = model_id_from_response(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, ResolverError::MissingModel));
    }

    #[test]
    fn test_model_id_empty_or_non_string() {
        assert!(matches!(
            model_id_from_response(&json!({"model": ""})).unwrap_err(),
            ResolverError::MissingModel
        ));
        assert!(matches!(
            model_id_from_response(&json!({"model": 42})).unwrap_err(),
            ResolverError::MissingModel
        ));
        assert!(matches!(
            model_id_from_response(&json!({"model": "dir/"})).unwrap_err(),
            ResolverError::EmptyIdentifier(_)
        ));
    }

    #[test]
    fn test_probe_payload_shape() {
        let payload = probe_payload();
        assert_eq!(payload["max_tokens"], 1);
        assert_eq!(
            payload["messages"],
            json!([{"content": "confirm receipt", "role": "user"}])
        );
    }

    #[test]
    fn test_listing_serialization() {
        let listing = ModelListing::single("name-v1", "interstitial");
        let value = serde_json::to_value(&listing).unwrap();

        assert_eq!(value["object"], "list");
        let card = &value["data"][0];
        assert_eq!(card["id"], "name-v1");
        assert_eq!(card["root"], "name-v1");
        assert_eq!(card["object"], "model");
        assert_eq!(card["created"], 1683758102);
        assert_eq!(card["owned_by"], "interstitial");
        assert!(card["parent"].is_null());

        let permission = &card["permission"][0];
        assert_eq!(permission["id"], "modelperm");
        assert_eq!(permission["object"], "model_permission");
        assert_eq!(permission["created"], 1690866609);
        assert_eq!(permission["allow_create_engine"], false);
        assert_eq!(permission["allow_sampling"], true);
        assert_eq!(permission["allow_logprobs"], true);
        assert_eq!(permission["allow_search_indices"], false);
        assert_eq!(permission["allow_view"], true);
        assert_eq!(permission["allow_fine_tuning"], false);
        assert_eq!(permission["organization"], "*");
        assert!(permission["group"].is_null());
        assert_eq!(permission["is_blocking"], false);
    }
}
