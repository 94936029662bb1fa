use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The value returned for every question, successful or not.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    pub data: Vec<Value>,
    pub query_info: Option<Value>,
    pub record_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_steps: Option<Vec<String>>,
}

impl QueryResult {
    pub fn answered(answer: impl Into<String>, steps: Option<Vec<String>>) -> Self {
        Self {
            answer: answer.into(),
            data: Vec::new(),
            query_info: None,
            record_count: 0,
            agent_steps: steps,
        }
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::answered(format!("Error: {}", message), None)
    }

    pub fn is_error(&self) -> bool {
        self.answer.starts_with("Error: ")
    }
}
