//! Framing Message Injection for OpenAI-format Requests
//!
//! Brackets the last user message of a chat request with two system
//! messages that steer the upstream model's output format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::FramingConfig;

/// A chat message as inserted by the rewriter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
    pub role: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role: "system".to_string(),
        }
    }
}

/// Index of the last message whose role is `user`.
///
/// Returns `None` when `messages` is missing, not an array, or holds no
/// user message.
pub fn last_user_index(request_body: &Value) -> Option<usize> {
    request_body
        .get("messages")?
        .as_array()?
        .iter()
        .rposition(|m| m.get("role").and_then(|r| r.as_str()) == Some("user"))
}

/// Insert the framing messages around the last user message.
///
/// With the last user message at `i`, the instructions message lands at `i`
/// and the response message at `i + 2`. Requests without a user message are
/// returned unchanged, as are all fields other than `messages`.
///
/// This is a single-pass transform: rewriting an already rewritten request
/// inserts a second pair around the same user message.
pub fn rewrite(mut request_body: Value, framing: &FramingConfig) -> Value {
    let Some(idx) = last_user_index(&request_body) else {
        return request_body;
    };

    if let Some(messages) = request_body
        .get_mut("messages")
        .and_then(|v| v.as_array_mut())
    {
        messages.insert(idx, framing_value(&framing.instructions));
        messages.insert(idx + 2, framing_value(&framing.response));
    }

    request_body
}

fn framing_value(content: &str) -> Value {
    serde_json::to_value(Message::system(content))
        .unwrap_or_else(|_| serde_json::json!({"content": content, "role": "system"}))
}
