//! Request, response, and stream value types

use crate::error::GatewayResult;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message (instructions)
    System,
    /// User message (human input)
    User,
    /// Assistant message (model response)
    Assistant,
}

/// A single message in a chat conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// An inbound chat completion request
///
/// `shadow_model` names an optional secondary model whose call is dispatched
/// fire-and-forget for comparison and never affects the primary response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ChatRequest {
    /// Create a request with a model and messages
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            shadow_model: None,
            messages,
            temperature: None,
            max_tokens: None,
            top_p: None,
            stop: None,
            stream: false,
            user: None,
        }
    }

    /// Derive a copy of this request targeting a different model
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        let mut derived = self.clone();
        derived.model = model.into();
        derived
    }

    /// Content of the most recent user message, if any
    pub fn latest_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
    }
}

/// Token accounting for a completed call
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A completed (non-streaming) chat response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub model: String,
    pub created: i64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Which backend served this response (set by the router)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Backend-specific extras (trace ids, experiment tags, ...)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ChatResponse {
    /// Create a response with a fresh id and current timestamp
    pub fn new(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: format!("resp-{}", uuid::Uuid::new_v4()),
            model: model.into(),
            created: chrono::Utc::now().timestamp(),
            content: content.into(),
            usage: None,
            finish_reason: None,
            route: None,
            latency_ms: None,
            metadata: HashMap::new(),
        }
    }
}

/// One fragment of a streamed response, of arbitrary size and boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Incremental content, if this fragment carries any
    pub content: Option<String>,
    /// Whether this is the terminal fragment
    pub is_final: bool,
    /// Finish reason (set on the terminal fragment, or on policy abort)
    pub finish_reason: Option<String>,
}

impl StreamChunk {
    /// Create a content-carrying chunk
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            is_final: false,
            finish_reason: None,
        }
    }

    /// Create a terminal chunk
    pub fn final_chunk(finish_reason: Option<String>) -> Self {
        Self {
            content: None,
            is_final: true,
            finish_reason,
        }
    }
}

/// Stream of response fragments as delivered by a backend
pub type TokenStream = Pin<Box<dyn Stream<Item = GatewayResult<StreamChunk>> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_user_content() {
        let request = ChatRequest::new(
            "gpt-4",
            vec![
                ChatMessage::system("be helpful"),
                ChatMessage::user("first"),
                ChatMessage::assistant("hi"),
                ChatMessage::user("second"),
            ],
        );
        assert_eq!(request.latest_user_content(), Some("second"));
    }

    #[test]
    fn test_with_model_preserves_everything_else() {
        let mut request = ChatRequest::new("gpt-4", vec![ChatMessage::user("hello")]);
        request.temperature = Some(0.2);
        request.user = Some("u-1".to_string());

        let derived = request.with_model("claude-3-opus");
        assert_eq!(derived.model, "claude-3-opus");
        assert_eq!(derived.temperature, Some(0.2));
        assert_eq!(derived.user.as_deref(), Some("u-1"));
        assert_eq!(request.model, "gpt-4");
    }
}
