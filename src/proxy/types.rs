//! Inbound request and streaming chunk types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound chat completion request (OpenAI-compatible shape).
///
/// The `model` field is informational only; routing always follows the
/// active configuration. Unknown fields are collected and ignored so
/// off-the-shelf clients can talk to us without negotiation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(flatten)]
    pub passthrough: serde_json::Map<String, Value>,
}

/// A chat message.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub role: String,
    pub content: MessageContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Set during forwarding when this message should be cached by
    /// providers that support prompt caching. Never on the wire.
    #[serde(skip)]
    pub cache_marked: bool,
}

impl Message {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: MessageContent::Text(content.to_string()),
            name: None,
            cache_marked: false,
        }
    }

    pub fn system(content: &str) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: &str) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::new("assistant", content)
    }
}

/// Message content: a plain string, an array of content parts, or null.
///
/// OpenAI-format clients send any of the three; all are accepted and
/// forwarded as received. Providers that only take plain strings flatten
/// with [`MessageContent::to_text`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
    Null,
}

/// One entry of a multi-part content array.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Non-text payloads (image urls etc.) pass through untouched.
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

impl MessageContent {
    /// Flatten to plain text. Parts without a text field contribute
    /// nothing; null content is empty.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join(""),
            Self::Null => String::new(),
        }
    }
}

/// One streaming chunk event (OpenAI chunk shape).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}
