use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use crate::transcript::{Content, Message, Role};
use crate::tools::ToolSchema;

/// A tool invocation requested by the reasoning engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: Content,
    pub tool_calls: Vec<ToolCall>,
    pub raw: Option<Value>,
}

impl LLMResponse {
    pub fn text(content: impl Into<Content>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            raw: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolSchema>>,
    pub temperature: Option<f64>,
    pub model: Option<String>,
}

#[derive(Clone, Debug, Error)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ProviderError {
    pub fn new(code: &str, message: &str, retryable: bool) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            retryable,
        }
    }
}

/// The reasoning engine boundary. Implementations block the calling thread.
pub trait ProviderAdapter: Send + Sync {
    fn complete(&self, request: CompletionRequest) -> Result<LLMResponse, ProviderError>;
}
