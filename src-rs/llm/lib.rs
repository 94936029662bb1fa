pub mod gemini_adapter;
pub mod rotation;
pub mod types;

pub use gemini_adapter::{GeminiAdapter, GeminiConfig};
pub use rotation::Rotator;
pub use types::{
    CompletionRequest, Content, LLMResponse, Message, ProviderAdapter, ProviderError, Role,
    ToolCall,
};
